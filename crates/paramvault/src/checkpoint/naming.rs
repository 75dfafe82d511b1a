//! Snapshot name templates.
//!
//! Templates reference [`StepContext`] fields with `{field}` placeholders:
//!
//! - `{epoch}` / `{step}`, optionally zero padded: `{epoch:04}` -> `0005`
//! - `{metric}`, optionally with a precision: `{metric:.3}` -> `0.912`
//! - any key added with [`StepContext::with_var`]
//!
//! `{{` and `}}` produce literal braces. A template without placeholders
//! names a single rolling checkpoint that every save overwrites.

use super::state::StepContext;
use crate::{Result, StoreError};

/// Longest accepted snapshot name.
pub const MAX_NAME_LEN: usize = 128;

/// Largest accepted `{metric:.N}` precision.
const MAX_PRECISION: usize = 32;

/// Name reserved for [`SnapshotRef::Latest`](super::SnapshotRef::Latest).
pub const RESERVED_LATEST: &str = "latest";

/// Render `template` against `context` and validate the result.
pub fn render_name(template: &str, context: &StepContext) -> Result<String> {
    let invalid = |reason: String| StoreError::InvalidName {
        name: template.to_string(),
        reason,
    };

    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => return Err(invalid("nested '{' in placeholder".into())),
                        Some(ch) => inner.push(ch),
                        None => return Err(invalid("unterminated placeholder".into())),
                    }
                }
                let (field, spec) = match inner.split_once(':') {
                    Some((field, spec)) => (field, Some(spec)),
                    None => (inner.as_str(), None),
                };
                out.push_str(&render_field(field, spec, context).map_err(invalid)?);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(invalid("unmatched '}'".into())),
            _ => out.push(c),
        }
    }

    validate_name(&out)?;
    Ok(out)
}

fn render_field(
    field: &str,
    spec: Option<&str>,
    context: &StepContext,
) -> std::result::Result<String, String> {
    match field {
        "epoch" => format_counter(context.epoch, spec),
        "step" => format_counter(context.step, spec),
        "metric" => {
            let metric = context
                .metric
                .ok_or_else(|| "template uses {metric} but no metric was provided".to_string())?;
            format_metric(metric, spec)
        }
        "" => Err("empty placeholder".to_string()),
        other => match context.vars.get(other) {
            Some(_) if spec.is_some() => {
                Err(format!("format spec not supported for variable '{}'", other))
            }
            Some(value) => Ok(value.clone()),
            None => Err(format!("unknown template field '{}'", other)),
        },
    }
}

fn format_counter(value: u64, spec: Option<&str>) -> std::result::Result<String, String> {
    match spec {
        None | Some("") => Ok(value.to_string()),
        Some(spec) => {
            let width = spec
                .strip_prefix('0')
                .and_then(|w| w.parse::<usize>().ok())
                .ok_or_else(|| format!("unsupported format spec ':{}' (use ':0N')", spec))?;
            if width > MAX_NAME_LEN {
                return Err(format!("padding width {} exceeds {}", width, MAX_NAME_LEN));
            }
            Ok(format!("{:0width$}", value, width = width))
        }
    }
}

fn format_metric(value: f64, spec: Option<&str>) -> std::result::Result<String, String> {
    match spec {
        None | Some("") => Ok(value.to_string()),
        Some(spec) => {
            let precision = spec
                .strip_prefix('.')
                .and_then(|p| p.parse::<usize>().ok())
                .ok_or_else(|| format!("unsupported format spec ':{}' (use ':.N')", spec))?;
            if precision > MAX_PRECISION {
                return Err(format!("precision {} exceeds {}", precision, MAX_PRECISION));
            }
            Ok(format!("{:.precision$}", value, precision = precision))
        }
    }
}

/// Check that `name` is safe to use as a snapshot name and file stem.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| StoreError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 128 characters"));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(invalid("name must not start with '.' or '-'"));
    }
    if name == RESERVED_LATEST {
        return Err(invalid("'latest' is reserved"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(invalid(&format!(
            "character {:?} is not allowed (use A-Z, a-z, 0-9, '.', '_', '-')",
            c
        )));
    }
    Ok(())
}
