//! Store configuration and retention policy.

use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Unit in which `save_interval` is measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    #[default]
    Epoch,
    Step,
}

/// Rules for which snapshots are kept and when automatic saves happen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Keep only the N most recently created snapshots (None = keep all)
    pub max_kept: Option<usize>,
    /// Minimum spacing between automatic saves (0 = every call is due)
    pub save_interval: u64,
    /// Whether `save_interval` counts epochs or steps
    pub interval_unit: IntervalUnit,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_kept: None,
            save_interval: 1,
            interval_unit: IntervalUnit::Epoch,
        }
    }
}

impl RetentionPolicy {
    /// Whether an automatic save is due at `counter`, given the counter of
    /// the last automatic save.
    pub fn is_due(&self, counter: u64, last_saved: Option<u64>) -> bool {
        match last_saved {
            None => true,
            Some(last) => counter.saturating_sub(last) >= self.save_interval,
        }
    }
}

/// Configuration for a checkpoint store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory that holds the index and blobs
    pub root: PathBuf,
    /// Retention and save-interval rules
    pub retention: RetentionPolicy,
    /// Upper bound on the size of one shard file
    pub max_shard_bytes: u64,
    /// fsync files and the directory before a write becomes visible
    pub sync: bool,
    /// Serialize writers across processes with an advisory lock
    pub locking: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("checkpoints"),
            retention: RetentionPolicy::default(),
            max_shard_bytes: 512 * 1024 * 1024,
            sync: true,
            locking: true,
        }
    }
}

impl StoreConfig {
    /// Create a new config rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| StoreError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the store cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.retention.max_kept == Some(0) {
            return Err(StoreError::InvalidConfig(
                "max_kept must be at least 1 (omit it to keep all snapshots)".to_string(),
            ));
        }
        if self.max_shard_bytes == 0 {
            return Err(StoreError::InvalidConfig(
                "max_shard_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Keep only the N most recent snapshots.
    pub fn max_kept(mut self, n: usize) -> Self {
        self.retention.max_kept = Some(n);
        self
    }

    /// Keep every snapshot.
    pub fn keep_all(mut self) -> Self {
        self.retention.max_kept = None;
        self
    }

    /// Set the minimum spacing between automatic saves.
    pub fn save_interval(mut self, interval: u64) -> Self {
        self.retention.save_interval = interval;
        self
    }

    /// Set the unit of the save interval.
    pub fn interval_unit(mut self, unit: IntervalUnit) -> Self {
        self.retention.interval_unit = unit;
        self
    }

    /// Set the shard size limit.
    pub fn max_shard_bytes(mut self, bytes: u64) -> Self {
        self.max_shard_bytes = bytes;
        self
    }

    /// Enable/disable fsync.
    pub fn sync(mut self, enabled: bool) -> Self {
        self.sync = enabled;
        self
    }

    /// Enable/disable the advisory directory lock.
    pub fn locking(mut self, enabled: bool) -> Self {
        self.locking = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_config_builder() {
        let config = StoreConfig::new("./test")
            .max_kept(3)
            .save_interval(5)
            .interval_unit(IntervalUnit::Step)
            .max_shard_bytes(1024)
            .sync(false)
            .locking(false);

        assert_eq!(config.root, PathBuf::from("./test"));
        assert_eq!(config.retention.max_kept, Some(3));
        assert_eq!(config.retention.save_interval, 5);
        assert_eq!(config.retention.interval_unit, IntervalUnit::Step);
        assert_eq!(config.max_shard_bytes, 1024);
        assert!(!config.sync);
        assert!(!config.locking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(StoreConfig::default().max_kept(0).validate().is_err());
        assert!(StoreConfig::default().max_shard_bytes(0).validate().is_err());
    }

    #[test]
    fn test_is_due_respects_interval() {
        let policy = RetentionPolicy {
            save_interval: 5,
            ..Default::default()
        };

        assert!(policy.is_due(0, None));
        assert!(!policy.is_due(3, Some(0)));
        assert!(policy.is_due(5, Some(0)));
        assert!(!policy.is_due(9, Some(5)));
        assert!(policy.is_due(12, Some(5)));
    }

    #[test]
    fn test_zero_interval_is_always_due() {
        let policy = RetentionPolicy {
            save_interval: 0,
            ..Default::default()
        };
        assert!(policy.is_due(7, Some(7)));
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(
            &path,
            r#"{ "root": "ckpts", "retention": { "max_kept": 2, "interval_unit": "step" } }"#,
        )
        .unwrap();

        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("ckpts"));
        assert_eq!(config.retention.max_kept, Some(2));
        assert_eq!(config.retention.save_interval, 1);
        assert_eq!(config.retention.interval_unit, IntervalUnit::Step);
        assert!(config.sync);
    }

    #[test]
    fn test_from_json_file_rejects_bad_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            StoreConfig::from_json_file(&path),
            Err(StoreError::InvalidConfig(_))
        ));

        fs::write(&path, r#"{ "retention": { "max_kept": 0 } }"#).unwrap();
        assert!(StoreConfig::from_json_file(&path).is_err());

        assert!(matches!(
            StoreConfig::from_json_file(dir.path().join("missing.json")),
            Err(StoreError::Io { .. })
        ));
    }
}
