//! Checkpoint store: durable, versioned snapshots under one directory.

use super::config::StoreConfig;
use super::index::{CheckpointIndex, INDEX_FILE};
use super::io::{atomic_write, remove_if_exists, sync_dir, DirLock, IoResultExt, TMP_SUFFIX};
use super::naming::render_name;
use super::shard::{decode_shard, encode_shard, plan_shards, shard_file_name, SHARD_EXTENSION};
use super::state::{
    unix_timestamp, Checkpointable, Objective, ShardInfo, Snapshot, SnapshotRef, Snapshots,
    StepContext,
};
use crate::params::{self, signature, ArchitectureSignature, ParameterMap};
use crate::{Result, StoreError};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory (inside the store root) holding shard files.
pub const BLOB_DIR: &str = "blobs";

/// Manages the snapshot lifecycle for one store directory.
///
/// Handles saving, loading, retention, and "latest" resolution. Writers
/// (`save`, `maybe_save`, `delete`, `prune`) hold an exclusive advisory
/// lock on the directory and re-read the index under it, so several
/// processes can share one store. Readers hold a shared lock.
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig::new("./checkpoints")
///     .max_kept(3)
///     .save_interval(5);
///
/// let mut store = CheckpointStore::open(config)?;
///
/// // In training loop:
/// let ctx = StepContext::new(epoch, step);
/// if let Some(snapshot) = store.maybe_save(&model.parameters(), "cp-{epoch:04}", &ctx)? {
///     println!("Saved {}", snapshot.name);
/// }
///
/// // To resume:
/// let snapshot = store.restore(SnapshotRef::Latest, &mut model)?;
/// ```
#[derive(Debug)]
pub struct CheckpointStore {
    config: StoreConfig,
    blob_dir: PathBuf,
    index_path: PathBuf,
    #[cfg(test)]
    fail_before_commit: bool,
}

impl CheckpointStore {
    /// Open (or create) the store described by `config`.
    ///
    /// Removes temporary files and blob files that no committed snapshot
    /// references; these are left behind by interrupted saves.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let root = config.root.clone();
        let blob_dir = root.join(BLOB_DIR);
        fs::create_dir_all(&blob_dir).at(&blob_dir)?;

        let store = Self {
            index_path: root.join(INDEX_FILE),
            blob_dir,
            config,
            #[cfg(test)]
            fail_before_commit: false,
        };

        let _lock = DirLock::exclusive(store.root(), store.config.locking)?;
        let index = CheckpointIndex::load(&store.index_path)?;
        let swept = store.sweep_orphans(&index)?;

        tracing::info!(
            root = %store.root().display(),
            snapshots = index.len(),
            swept,
            "Opened checkpoint store"
        );
        Ok(store)
    }

    /// Shorthand for `open(StoreConfig::new(root))`.
    pub fn open_dir(root: impl Into<PathBuf>) -> Result<Self> {
        Self::open(StoreConfig::new(root))
    }

    /// Get the store directory path.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of a shard file referenced by a snapshot.
    pub fn blob_path(&self, shard: &ShardInfo) -> PathBuf {
        self.blob_dir.join(&shard.file)
    }

    /// Save `params` as a snapshot named by rendering `name_template`.
    ///
    /// An existing snapshot with the same name is replaced. When the
    /// retention policy sets `max_kept`, the oldest snapshots beyond the
    /// limit are evicted in the same index update.
    pub fn save(
        &mut self,
        params: &ParameterMap,
        name_template: &str,
        context: &StepContext,
    ) -> Result<Snapshot> {
        validate_input(params, context)?;
        let name = render_name(name_template, context)?;

        let _lock = DirLock::exclusive(self.root(), self.config.locking)?;
        let index = CheckpointIndex::load(&self.index_path)?;
        self.save_locked(index, params, name, context, None)
    }

    /// Save only if the retention policy's save interval has elapsed since
    /// the last automatic save.
    ///
    /// Returns `None` when no save was due.
    pub fn maybe_save(
        &mut self,
        params: &ParameterMap,
        name_template: &str,
        context: &StepContext,
    ) -> Result<Option<Snapshot>> {
        let policy = &self.config.retention;
        let counter = context.counter(policy.interval_unit);

        let _lock = DirLock::exclusive(self.root(), self.config.locking)?;
        let index = CheckpointIndex::load(&self.index_path)?;

        if !policy.is_due(counter, index.last_auto_save()) {
            tracing::trace!(counter, last = ?index.last_auto_save(), "Save not due");
            return Ok(None);
        }

        validate_input(params, context)?;
        let name = render_name(name_template, context)?;
        self.save_locked(index, params, name, context, Some(counter))
            .map(Some)
    }

    /// Save the parameters of `model`.
    pub fn save_model<M: Checkpointable>(
        &mut self,
        model: &M,
        name_template: &str,
        context: &StepContext,
    ) -> Result<Snapshot> {
        self.save(&model.parameters(), name_template, context)
    }

    fn save_locked(
        &self,
        mut index: CheckpointIndex,
        params: &ParameterMap,
        name: String,
        context: &StepContext,
        auto_counter: Option<u64>,
    ) -> Result<Snapshot> {
        let snapshot = self.write_blobs(index.peek_sequence(), params, name, context)?;

        #[cfg(test)]
        if self.fail_before_commit {
            return Err(StoreError::Io {
                path: self.index_path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Interrupted, "simulated crash"),
            });
        }

        let replaced = index.insert(snapshot.clone());
        let evicted = match self.config.retention.max_kept {
            Some(keep) => index.evict_beyond(keep),
            None => Vec::new(),
        };
        if let Some(counter) = auto_counter {
            index.set_last_auto_save(counter);
        }

        if let Err(e) = index.store(&self.index_path, self.config.sync) {
            self.remove_blobs(&snapshot);
            return Err(e);
        }

        tracing::info!(
            name = %snapshot.name,
            sequence = snapshot.sequence_index,
            epoch = snapshot.epoch,
            shards = snapshot.shards.len(),
            bytes = snapshot.total_bytes(),
            "Saved snapshot"
        );

        if let Some(old) = &replaced {
            tracing::debug!(name = %old.name, sequence = old.sequence_index, "Replaced snapshot");
            self.remove_blobs(old);
        }
        for old in &evicted {
            tracing::info!(name = %old.name, sequence = old.sequence_index, "Evicted snapshot");
            self.remove_blobs(old);
        }

        Ok(snapshot)
    }

    /// Write every shard to its final location. Nothing references the
    /// files until the index is committed.
    fn write_blobs(
        &self,
        sequence: u64,
        params: &ParameterMap,
        name: String,
        context: &StepContext,
    ) -> Result<Snapshot> {
        let plan = plan_shards(params, self.config.max_shard_bytes);
        let mut shards: Vec<ShardInfo> = Vec::with_capacity(plan.len());

        for (i, keys) in plan.iter().enumerate() {
            let file = shard_file_name(&name, sequence, i);
            let path = self.blob_dir.join(&file);

            let written = encode_shard(params, keys, &name, sequence)
                .and_then(|bytes| atomic_write(&path, &bytes, self.config.sync).map(|_| bytes));
            let bytes = match written {
                Ok(bytes) => bytes,
                Err(e) => {
                    for shard in &shards {
                        let _ = remove_if_exists(&self.blob_dir.join(&shard.file));
                    }
                    return Err(e);
                }
            };

            tracing::debug!(file = %file, tensors = keys.len(), bytes = bytes.len(), "Wrote shard");
            shards.push(ShardInfo {
                file,
                tensors: keys.iter().map(|k| k.to_string()).collect(),
                bytes: bytes.len() as u64,
                crc32: crc32fast::hash(&bytes),
            });
        }

        Ok(Snapshot {
            name,
            sequence_index: sequence,
            created_at: unix_timestamp(),
            epoch: context.epoch,
            step: context.step,
            metric: context.metric,
            signature: ArchitectureSignature::from_parameters(params),
            num_elements: params::num_elements(params),
            shards,
        })
    }

    /// Load the parameters of a snapshot.
    pub fn load(&self, reference: impl Into<SnapshotRef>) -> Result<ParameterMap> {
        let reference = reference.into();
        let _lock = DirLock::shared(self.root(), self.config.locking)?;
        let index = CheckpointIndex::load(&self.index_path)?;
        let snapshot = resolve(&index, &reference)?;
        let params = self.read_blobs(snapshot)?;

        tracing::info!(name = %snapshot.name, sequence = snapshot.sequence_index, "Loaded snapshot");
        Ok(params)
    }

    /// Load a snapshot, failing with `ArchitectureMismatch` unless its
    /// signature equals `expected`. No blob is read when the check fails.
    pub fn load_for(
        &self,
        reference: impl Into<SnapshotRef>,
        expected: &ArchitectureSignature,
    ) -> Result<ParameterMap> {
        self.load_checked(&reference.into(), expected)
            .map(|(_, params)| params)
    }

    /// Load a snapshot into `model`.
    ///
    /// The model is either fully updated or left untouched: the
    /// architecture check runs before `set_parameters` is called.
    pub fn restore<M: Checkpointable>(
        &self,
        reference: impl Into<SnapshotRef>,
        model: &mut M,
    ) -> Result<Snapshot> {
        let (snapshot, params) = self.load_checked(&reference.into(), &model.signature())?;
        model.set_parameters(params)?;

        tracing::info!(name = %snapshot.name, epoch = snapshot.epoch, "Restored model");
        Ok(snapshot)
    }

    fn load_checked(
        &self,
        reference: &SnapshotRef,
        expected: &ArchitectureSignature,
    ) -> Result<(Snapshot, ParameterMap)> {
        let _lock = DirLock::shared(self.root(), self.config.locking)?;
        let index = CheckpointIndex::load(&self.index_path)?;
        let snapshot = resolve(&index, reference)?;

        let mismatches = expected.diff(&snapshot.signature);
        if !mismatches.is_empty() {
            tracing::warn!(
                name = %snapshot.name,
                mismatches = mismatches.len(),
                "Refusing to load snapshot into mismatched architecture"
            );
            return Err(StoreError::ArchitectureMismatch {
                name: snapshot.name.clone(),
                mismatches,
            });
        }

        let params = self.read_blobs(snapshot)?;
        Ok((snapshot.clone(), params))
    }

    /// Read and check every shard of a snapshot.
    fn read_blobs(&self, snapshot: &Snapshot) -> Result<ParameterMap> {
        let corrupt = |reason: String| StoreError::CorruptSnapshot {
            name: snapshot.name.clone(),
            reason,
        };

        let mut params = ParameterMap::new();
        for shard in &snapshot.shards {
            let path = self.blob_dir.join(&shard.file);
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(corrupt(format!("shard {} is missing", shard.file)));
                }
                Err(source) => return Err(StoreError::Io { path, source }),
            };

            if bytes.len() as u64 != shard.bytes {
                return Err(corrupt(format!(
                    "shard {} is {} bytes, index records {}",
                    shard.file,
                    bytes.len(),
                    shard.bytes
                )));
            }
            let crc = crc32fast::hash(&bytes);
            if crc != shard.crc32 {
                return Err(corrupt(format!(
                    "shard {} checksum {:08x} does not match {:08x}",
                    shard.file, crc, shard.crc32
                )));
            }

            let decoded = decode_shard(&bytes, &snapshot.name)?;
            let found: BTreeSet<&str> = decoded.keys().map(String::as_str).collect();
            let listed: BTreeSet<&str> = shard.tensors.iter().map(String::as_str).collect();
            if found != listed {
                return Err(corrupt(format!(
                    "shard {} holds tensors {:?}, index lists {:?}",
                    shard.file, found, listed
                )));
            }
            params.extend(decoded);
        }

        let mismatches = snapshot
            .signature
            .diff(&ArchitectureSignature::from_parameters(&params));
        if !mismatches.is_empty() {
            return Err(corrupt(format!(
                "stored tensors disagree with recorded signature: {}",
                signature::describe(&mismatches)
            )));
        }

        Ok(params)
    }

    /// Check every shard of a snapshot without applying it.
    pub fn verify(&self, reference: impl Into<SnapshotRef>) -> Result<Snapshot> {
        let reference = reference.into();
        let _lock = DirLock::shared(self.root(), self.config.locking)?;
        let index = CheckpointIndex::load(&self.index_path)?;
        let snapshot = resolve(&index, &reference)?;
        self.read_blobs(snapshot)?;
        Ok(snapshot.clone())
    }

    /// Metadata of every committed snapshot, oldest first.
    pub fn list(&self) -> Result<Snapshots> {
        let index = self.read_index()?;
        Ok(Snapshots::new(index.snapshots().to_vec()))
    }

    pub fn get(&self, name: &str) -> Result<Option<Snapshot>> {
        Ok(self.read_index()?.get(name).cloned())
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.read_index()?.get(name).is_some())
    }

    /// Metadata of the most recently created snapshot.
    pub fn latest(&self) -> Result<Option<Snapshot>> {
        Ok(self.read_index()?.latest().cloned())
    }

    /// The retained snapshot with the best recorded metric.
    ///
    /// Snapshots saved without a metric are ignored.
    pub fn best(&self, objective: Objective) -> Result<Option<Snapshot>> {
        let index = self.read_index()?;
        let best = index
            .snapshots()
            .iter()
            .filter_map(|s| s.metric.map(|m| (m, s)))
            .reduce(|best, candidate| {
                let better = match objective {
                    Objective::Maximize => candidate.0 > best.0,
                    Objective::Minimize => candidate.0 < best.0,
                };
                if better {
                    candidate
                } else {
                    best
                }
            });
        Ok(best.map(|(_, s)| s.clone()))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read_index()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_index()?.is_empty())
    }

    /// Delete a snapshot. Deleting a name that does not exist is a no-op.
    ///
    /// Returns whether a snapshot was removed.
    pub fn delete(&mut self, name: &str) -> Result<bool> {
        let _lock = DirLock::exclusive(self.root(), self.config.locking)?;
        let mut index = CheckpointIndex::load(&self.index_path)?;

        let Some(removed) = index.remove(name) else {
            tracing::debug!(name, "Delete of absent snapshot ignored");
            return Ok(false);
        };

        index.store(&self.index_path, self.config.sync)?;
        self.remove_blobs(&removed);
        tracing::info!(name, sequence = removed.sequence_index, "Deleted snapshot");
        Ok(true)
    }

    /// Keep only the `keep` most recent snapshots.
    ///
    /// Returns the names of the evicted snapshots, oldest first.
    pub fn prune(&mut self, keep: usize) -> Result<Vec<String>> {
        let _lock = DirLock::exclusive(self.root(), self.config.locking)?;
        let mut index = CheckpointIndex::load(&self.index_path)?;

        let evicted = index.evict_beyond(keep);
        if evicted.is_empty() {
            return Ok(Vec::new());
        }

        index.store(&self.index_path, self.config.sync)?;
        for old in &evicted {
            tracing::info!(name = %old.name, sequence = old.sequence_index, "Pruned snapshot");
            self.remove_blobs(old);
        }
        Ok(evicted.into_iter().map(|s| s.name).collect())
    }

    /// Read the index under a shared lock.
    pub fn read_index(&self) -> Result<CheckpointIndex> {
        let _lock = DirLock::shared(self.root(), self.config.locking)?;
        CheckpointIndex::load(&self.index_path)
    }

    /// Remove the blob files of a snapshot that is no longer in the index.
    /// Failures are logged; leftover files are swept on the next open.
    fn remove_blobs(&self, snapshot: &Snapshot) {
        for shard in &snapshot.shards {
            let path = self.blob_dir.join(&shard.file);
            if let Err(e) = remove_if_exists(&path) {
                tracing::warn!(path = %path.display(), "Failed to remove snapshot blob: {}", e);
            }
        }
        if self.config.sync {
            sync_dir(&self.blob_dir);
        }
    }

    /// Delete temp files and blobs that `index` does not reference.
    fn sweep_orphans(&self, index: &CheckpointIndex) -> Result<usize> {
        let referenced = index.referenced_files();
        let mut swept = 0;

        for dir in [self.root(), self.blob_dir.as_path()] {
            for entry in fs::read_dir(dir).at(dir)? {
                let entry = entry.at(dir)?;
                let file_name = entry.file_name();
                let Some(file_name) = file_name.to_str() else {
                    continue;
                };

                let is_temp = file_name.starts_with('.') && file_name.ends_with(TMP_SUFFIX);
                let is_orphan_blob = dir == self.blob_dir.as_path()
                    && file_name.ends_with(SHARD_EXTENSION)
                    && !referenced.contains(file_name);
                if !(is_temp || is_orphan_blob) {
                    continue;
                }

                let path = entry.path();
                match remove_if_exists(&path) {
                    Ok(_) => {
                        tracing::warn!(path = %path.display(), "Removed uncommitted file");
                        swept += 1;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "Failed to remove uncommitted file: {}", e);
                    }
                }
            }
        }

        Ok(swept)
    }
}

fn validate_input(params: &ParameterMap, context: &StepContext) -> Result<()> {
    params::validate_parameters(params)?;
    match context.metric {
        Some(metric) if !metric.is_finite() => Err(StoreError::InvalidParameters {
            reason: format!("metric {} is not finite", metric),
        }),
        _ => Ok(()),
    }
}

fn resolve<'a>(index: &'a CheckpointIndex, reference: &SnapshotRef) -> Result<&'a Snapshot> {
    index
        .resolve(reference)
        .ok_or_else(|| StoreError::SnapshotNotFound {
            name: reference.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use tempfile::tempdir;

    fn params(fill: f32) -> ParameterMap {
        let mut params = ParameterMap::new();
        params.insert(
            "dense.weight".into(),
            ArrayD::from_shape_fn(IxDyn(&[4, 3]), |ix| fill + (ix[0] * 3 + ix[1]) as f32),
        );
        params.insert("dense.bias".into(), ArrayD::from_elem(IxDyn(&[3]), fill));
        params
    }

    fn open(dir: &Path) -> CheckpointStore {
        CheckpointStore::open(StoreConfig::new(dir).sync(false)).unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());

        let saved = params(1.0);
        let snapshot = store
            .save(&saved, "epoch-{epoch:04}", &StepContext::new(5, 50))
            .unwrap();

        assert_eq!(snapshot.name, "epoch-0005");
        assert_eq!(snapshot.sequence_index, 1);
        assert_eq!(snapshot.num_elements, 15);
        assert_eq!(store.load("epoch-0005").unwrap(), saved);
        assert_eq!(store.load(SnapshotRef::Latest).unwrap(), saved);
    }

    #[test]
    fn test_load_missing_snapshot() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        match store.load(SnapshotRef::Latest) {
            Err(StoreError::SnapshotNotFound { name }) => assert_eq!(name, "latest"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            store.load("nope"),
            Err(StoreError::SnapshotNotFound { .. })
        ));
    }

    #[test]
    fn test_save_rejects_invalid_input_without_writing() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());

        let err = store
            .save(&ParameterMap::new(), "cp", &StepContext::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidParameters { .. }));

        let err = store
            .save(&params(0.0), "bad/name", &StepContext::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidName { .. }));

        assert!(store.is_empty().unwrap());
        assert_eq!(fs::read_dir(dir.path().join(BLOB_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn test_save_rejects_non_finite_metric() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());

        for metric in [f64::NAN, f64::INFINITY] {
            let ctx = StepContext::new(1, 0).with_metric(metric);
            assert!(matches!(
                store.save(&params(0.0), "cp", &ctx),
                Err(StoreError::InvalidParameters { .. })
            ));
            assert!(matches!(
                store.maybe_save(&params(0.0), "cp", &ctx),
                Err(StoreError::InvalidParameters { .. })
            ));
        }
        assert!(store.is_empty().unwrap());

        let ctx = StepContext::new(1, 0).with_metric(0.25);
        store.save(&params(0.0), "cp", &ctx).unwrap();
        assert_eq!(store.get("cp").unwrap().unwrap().metric, Some(0.25));
    }

    #[test]
    fn test_unwritable_blob_dir_fails_without_touching_index() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        store.save(&params(1.0), "cp-a", &StepContext::new(1, 0)).unwrap();
        let index_before = fs::read(dir.path().join(INDEX_FILE)).unwrap();

        // A plain file where the blob directory should be
        let blob_dir = dir.path().join(BLOB_DIR);
        fs::remove_dir_all(&blob_dir).unwrap();
        fs::write(&blob_dir, b"not a directory").unwrap();

        let err = store
            .save(&params(2.0), "cp-b", &StepContext::new(2, 0))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }), "got {err:?}");
        assert_eq!(fs::read(dir.path().join(INDEX_FILE)).unwrap(), index_before);
        assert_eq!(store.latest().unwrap().unwrap().name, "cp-a");
    }

    #[test]
    fn test_interrupted_save_is_invisible() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        store.save(&params(1.0), "cp-a", &StepContext::new(1, 0)).unwrap();

        store.fail_before_commit = true;
        assert!(store.save(&params(2.0), "cp-b", &StepContext::new(2, 0)).is_err());
        store.fail_before_commit = false;

        // The shard of the interrupted save is on disk but not visible
        assert_eq!(fs::read_dir(dir.path().join(BLOB_DIR)).unwrap().count(), 2);
        let names: Vec<_> = store.list().unwrap().names().map(String::from).collect();
        assert_eq!(names, vec!["cp-a"]);
        assert_eq!(store.load(SnapshotRef::Latest).unwrap(), params(1.0));

        // Reopening sweeps it
        drop(store);
        let store = open(dir.path());
        assert_eq!(fs::read_dir(dir.path().join(BLOB_DIR)).unwrap().count(), 1);
        assert_eq!(store.latest().unwrap().unwrap().name, "cp-a");
    }

    #[test]
    fn test_interrupted_overwrite_keeps_old_payload() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        store.save(&params(1.0), "rolling", &StepContext::new(1, 0)).unwrap();

        store.fail_before_commit = true;
        assert!(store.save(&params(9.0), "rolling", &StepContext::new(2, 0)).is_err());
        store.fail_before_commit = false;

        assert_eq!(store.load("rolling").unwrap(), params(1.0));
    }

    #[test]
    fn test_overwrite_removes_old_blobs() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());

        let first = store.save(&params(1.0), "rolling", &StepContext::new(1, 0)).unwrap();
        let second = store.save(&params(2.0), "rolling", &StepContext::new(2, 0)).unwrap();

        assert!(second.sequence_index > first.sequence_index);
        assert!(!store.blob_path(&first.shards[0]).exists());
        assert!(store.blob_path(&second.shards[0]).exists());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_sharding_round_trip() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path()).sync(false).max_shard_bytes(16);
        let mut store = CheckpointStore::open(config).unwrap();

        let saved = params(3.0);
        let snapshot = store.save(&saved, "sharded", &StepContext::default()).unwrap();
        assert_eq!(snapshot.shards.len(), 2);
        assert_eq!(store.load("sharded").unwrap(), saved);
    }

    #[test]
    fn test_corrupted_shard_is_detected() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        let snapshot = store.save(&params(1.0), "cp", &StepContext::default()).unwrap();

        let path = store.blob_path(&snapshot.shards[0]);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            store.load("cp"),
            Err(StoreError::CorruptSnapshot { .. })
        ));
        assert!(store.verify("cp").is_err());

        fs::remove_file(&path).unwrap();
        match store.load("cp") {
            Err(StoreError::CorruptSnapshot { reason, .. }) => assert!(reason.contains("missing")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_best_snapshot() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());

        store
            .save(&params(0.0), "e{epoch}", &StepContext::new(1, 0).with_metric(0.7))
            .unwrap();
        store
            .save(&params(0.0), "e{epoch}", &StepContext::new(2, 0).with_metric(0.9))
            .unwrap();
        store.save(&params(0.0), "e{epoch}", &StepContext::new(3, 0)).unwrap();
        store
            .save(&params(0.0), "e{epoch}", &StepContext::new(4, 0).with_metric(0.8))
            .unwrap();

        assert_eq!(store.best(Objective::Maximize).unwrap().unwrap().name, "e2");
        assert_eq!(store.best(Objective::Minimize).unwrap().unwrap().name, "e1");
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path()).max_kept(0);
        assert!(matches!(
            CheckpointStore::open(config),
            Err(StoreError::InvalidConfig(_))
        ));
    }
}
