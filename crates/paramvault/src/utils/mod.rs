//! Display helpers for snapshot listings.

/// Abbreviate large counts for display (e.g. parameter counts)
pub fn abbreviate(num: u64) -> String {
    if num < 1_000 {
        format!("{}", num)
    } else if num < 1_000_000 {
        format!("{:.1}K", num as f64 / 1_000.0)
    } else if num < 1_000_000_000 {
        format!("{:.1}M", num as f64 / 1_000_000.0)
    } else {
        format!("{:.1}B", num as f64 / 1_000_000_000.0)
    }
}

/// Format a byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Format the time elapsed between two Unix timestamps, e.g. `3h 12m ago`
pub fn format_age(created_at: u64, now: u64) -> String {
    let secs = now.saturating_sub(created_at);
    let d = secs / 86_400;
    let h = (secs % 86_400) / 3600;
    let m = (secs % 3600) / 60;

    if d > 0 {
        format!("{}d {}h ago", d, h)
    } else if h > 0 {
        format!("{}h {}m ago", h, m)
    } else if m > 0 {
        format!("{}m ago", m)
    } else {
        "just now".to_string()
    }
}
