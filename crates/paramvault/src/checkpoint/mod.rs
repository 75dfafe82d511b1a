//! Checkpoint store for model parameters.
//!
//! Provides:
//! - `Checkpointable` trait for models whose parameters can be saved/restored
//! - `CheckpointStore` for the snapshot lifecycle under one directory
//! - `StoreConfig` / `RetentionPolicy` for retention and save intervals
//! - `render_name` for templated snapshot names
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── .lock          advisory lock serializing writers
//! ├── index.json     committed snapshots and the "latest" pointer
//! └── blobs/
//!     └── <name>.<sequence>.<shard>.safetensors
//! ```
//!
//! A save writes its shards first and commits by atomically replacing
//! `index.json`; a snapshot is only visible once that rename has happened.

mod config;
mod index;
mod io;
mod manager;
mod naming;
mod shard;
mod state;

pub use config::{IntervalUnit, RetentionPolicy, StoreConfig};
pub use index::{CheckpointIndex, FORMAT_VERSION, INDEX_FILE};
pub use manager::{CheckpointStore, BLOB_DIR};
pub use naming::{render_name, validate_name, MAX_NAME_LEN};
pub use state::{
    Checkpointable, Objective, ShardInfo, Snapshot, SnapshotRef, Snapshots, StepContext,
};
