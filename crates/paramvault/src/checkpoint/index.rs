//! The durable snapshot index (`index.json`).

use super::io::atomic_write;
use super::state::{Snapshot, SnapshotRef};
use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// File name of the index inside a store directory.
pub const INDEX_FILE: &str = "index.json";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Ordered record of the committed snapshots in one store directory.
///
/// Invariants, checked on load and kept by every mutation:
/// - entries are sorted by strictly increasing `sequence_index`
/// - names are unique
/// - `latest` names the entry with the highest sequence index, and is
///   `None` only when there are no entries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointIndex {
    format_version: u32,
    next_sequence: u64,
    latest: Option<String>,
    #[serde(default)]
    last_auto_save: Option<u64>,
    snapshots: Vec<Snapshot>,
}

impl Default for CheckpointIndex {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            next_sequence: 1,
            latest: None,
            last_auto_save: None,
            snapshots: Vec::new(),
        }
    }
}

impl CheckpointIndex {
    /// Read the index at `path`. A missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let index: Self = serde_json::from_str(&text).map_err(|e| StoreError::CorruptIndex {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        index.check().map_err(|reason| StoreError::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(index)
    }

    /// Atomically replace the index at `path`.
    pub(crate) fn store(&self, path: &Path, sync: bool) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| StoreError::CorruptIndex {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        atomic_write(path, &json, sync)
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            ));
        }

        let mut names = HashSet::new();
        let mut previous = 0u64;
        for snapshot in &self.snapshots {
            if snapshot.sequence_index <= previous {
                return Err(format!(
                    "sequence index {} of '{}' is out of order",
                    snapshot.sequence_index, snapshot.name
                ));
            }
            if !names.insert(snapshot.name.as_str()) {
                return Err(format!("duplicate snapshot name '{}'", snapshot.name));
            }
            previous = snapshot.sequence_index;
        }

        if self.next_sequence <= previous {
            return Err(format!(
                "next sequence {} is not above highest sequence {}",
                self.next_sequence, previous
            ));
        }

        let expected_latest = self.snapshots.last().map(|s| s.name.as_str());
        if self.latest.as_deref() != expected_latest {
            return Err(format!(
                "latest pointer {:?} does not match newest entry {:?}",
                self.latest, expected_latest
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Committed snapshots, oldest first.
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn get(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.name == name)
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn resolve(&self, reference: &SnapshotRef) -> Option<&Snapshot> {
        match reference {
            SnapshotRef::Name(name) => self.get(name),
            SnapshotRef::Latest => self.latest(),
        }
    }

    /// Interval counter of the last automatic save.
    pub fn last_auto_save(&self) -> Option<u64> {
        self.last_auto_save
    }

    pub(crate) fn set_last_auto_save(&mut self, counter: u64) {
        self.last_auto_save = Some(counter);
    }

    /// Next sequence index to hand out. Does not reserve it.
    pub(crate) fn peek_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Append a newly written snapshot, replacing any entry with the same
    /// name. Returns the replaced entry.
    pub(crate) fn insert(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        debug_assert!(snapshot.sequence_index >= self.next_sequence);
        let replaced = self.remove_entry(&snapshot.name);
        self.next_sequence = snapshot.sequence_index + 1;
        self.snapshots.push(snapshot);
        self.refresh_latest();
        replaced
    }

    /// Remove the entry called `name`.
    pub(crate) fn remove(&mut self, name: &str) -> Option<Snapshot> {
        let removed = self.remove_entry(name);
        self.refresh_latest();
        removed
    }

    /// Drop the oldest entries until at most `keep` remain.
    pub(crate) fn evict_beyond(&mut self, keep: usize) -> Vec<Snapshot> {
        let excess = self.snapshots.len().saturating_sub(keep);
        let evicted: Vec<Snapshot> = self.snapshots.drain(..excess).collect();
        self.refresh_latest();
        evicted
    }

    /// Every blob file referenced by a committed snapshot.
    pub fn referenced_files(&self) -> HashSet<&str> {
        self.snapshots
            .iter()
            .flat_map(|s| s.shards.iter().map(|shard| shard.file.as_str()))
            .collect()
    }

    fn remove_entry(&mut self, name: &str) -> Option<Snapshot> {
        let pos = self.snapshots.iter().position(|s| s.name == name)?;
        Some(self.snapshots.remove(pos))
    }

    fn refresh_latest(&mut self) {
        self.latest = self.snapshots.last().map(|s| s.name.clone());
    }
}
