//! Snapshot metadata and the model-facing trait.

use super::config::IntervalUnit;
use super::naming::RESERVED_LATEST;
use crate::params::{ArchitectureSignature, ParameterMap};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Trait for models whose parameters can be checkpointed.
///
/// Implement this for your model type to use
/// [`CheckpointStore::save_model`](super::CheckpointStore::save_model) and
/// [`CheckpointStore::restore`](super::CheckpointStore::restore).
///
/// # Example
///
/// ```ignore
/// impl Checkpointable for MyModel {
///     fn parameters(&self) -> ParameterMap {
///         let mut params = ParameterMap::new();
///         params.insert("dense.weight".into(), self.weight.clone().into_dyn());
///         params
///     }
///
///     fn set_parameters(&mut self, params: ParameterMap) -> Result<()> {
///         self.weight = params["dense.weight"].clone().into_dimensionality()?;
///         Ok(())
///     }
/// }
/// ```
pub trait Checkpointable {
    /// Current values of all trainable parameters.
    fn parameters(&self) -> ParameterMap;

    /// Replace all trainable parameters.
    ///
    /// Only called with a map whose signature equals [`Self::signature`].
    fn set_parameters(&mut self, params: ParameterMap) -> Result<()>;

    /// Parameter keys and shapes of this model.
    fn signature(&self) -> ArchitectureSignature {
        ArchitectureSignature::from_parameters(&self.parameters())
    }
}

/// Training position a save is made at.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepContext {
    pub epoch: u64,
    pub step: u64,
    /// Optional score recorded with the snapshot (e.g. validation accuracy)
    pub metric: Option<f64>,
    /// Extra template variables
    pub vars: BTreeMap<String, String>,
}

impl StepContext {
    pub fn new(epoch: u64, step: u64) -> Self {
        Self {
            epoch,
            step,
            ..Default::default()
        }
    }

    pub fn with_metric(mut self, metric: f64) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// The counter a save interval is measured against.
    pub fn counter(&self, unit: IntervalUnit) -> u64 {
        match unit {
            IntervalUnit::Epoch => self.epoch,
            IntervalUnit::Step => self.step,
        }
    }
}

/// Reference to a snapshot: by name, or the most recently created one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotRef {
    Name(String),
    Latest,
}

impl SnapshotRef {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Latest => f.write_str(RESERVED_LATEST),
        }
    }
}

impl From<&str> for SnapshotRef {
    fn from(s: &str) -> Self {
        if s == RESERVED_LATEST {
            Self::Latest
        } else {
            Self::Name(s.to_string())
        }
    }
}

impl From<String> for SnapshotRef {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl FromStr for SnapshotRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

/// One blob file belonging to a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// File name inside the store's blob directory
    pub file: String,
    /// Parameter keys stored in this shard
    pub tensors: Vec<String>,
    /// Length of the file in bytes
    pub bytes: u64,
    /// CRC32 of the file contents
    pub crc32: u32,
}

/// Metadata of a committed snapshot. Does not include parameter values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    /// Creation order; never reused within a store
    pub sequence_index: u64,
    /// Seconds since the Unix epoch
    pub created_at: u64,
    pub epoch: u64,
    pub step: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<f64>,
    pub signature: ArchitectureSignature,
    pub num_elements: u64,
    pub shards: Vec<ShardInfo>,
}

impl Snapshot {
    /// Total size of the snapshot's blob files.
    pub fn total_bytes(&self) -> u64 {
        self.shards.iter().map(|s| s.bytes).sum()
    }
}

/// Whether a higher or lower metric is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Objective {
    Maximize,
    Minimize,
}

/// Ordered snapshot metadata returned by
/// [`CheckpointStore::list`](super::CheckpointStore::list).
///
/// Ordered by `sequence_index` ascending. Iterate it as many times as
/// needed; each `iter()` starts from the oldest entry.
#[derive(Clone, Debug, Default)]
pub struct Snapshots {
    entries: Vec<Snapshot>,
}

impl Snapshots {
    pub(crate) fn new(entries: Vec<Snapshot>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + Clone {
        self.entries.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.last()
    }

    pub fn into_vec(self) -> Vec<Snapshot> {
        self.entries
    }
}

impl IntoIterator for Snapshots {
    type Item = Snapshot;
    type IntoIter = std::vec::IntoIter<Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshots {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Current time as seconds since the Unix epoch.
pub(crate) fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_context_builder() {
        let ctx = StepContext::new(4, 400).with_metric(0.5).with_var("run", "a");
        assert_eq!(ctx.epoch, 4);
        assert_eq!(ctx.step, 400);
        assert_eq!(ctx.metric, Some(0.5));
        assert_eq!(ctx.vars.get("run").map(String::as_str), Some("a"));
        assert_eq!(ctx.counter(IntervalUnit::Epoch), 4);
        assert_eq!(ctx.counter(IntervalUnit::Step), 400);
    }

    #[test]
    fn test_snapshot_ref_parsing() {
        assert_eq!(SnapshotRef::from("latest"), SnapshotRef::Latest);
        assert_eq!(SnapshotRef::from("epoch-0001"), SnapshotRef::name("epoch-0001"));
        assert_eq!(SnapshotRef::Latest.to_string(), "latest");
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = Snapshot {
            name: "cp".into(),
            sequence_index: 3,
            created_at: 1_700_000_000,
            epoch: 2,
            step: 20,
            metric: None,
            signature: ArchitectureSignature::from_shapes([("w", vec![2, 2])]),
            num_elements: 4,
            shards: vec![ShardInfo {
                file: "cp.00000003.000.safetensors".into(),
                tensors: vec!["w".into()],
                bytes: 96,
                crc32: 7,
            }],
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("metric"));
        let restored: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.total_bytes(), 96);
    }
}
