//! # paramvault
//!
//! A durable, versioned checkpoint store for model parameters.
//!
//! ## Overview
//!
//! paramvault provides:
//! - A `CheckpointStore` that saves named snapshots of a parameter map
//!   under one directory, with crash-consistent writes
//! - Retention (`max_kept`) and save-interval policies consulted by the
//!   training loop
//! - Architecture signatures so a snapshot is only ever restored into a
//!   model with the same parameter keys and shapes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use paramvault::prelude::*;
//!
//! let config = StoreConfig::new("./checkpoints").max_kept(3);
//! let mut store = CheckpointStore::open(config)?;
//!
//! // In the training loop:
//! let ctx = StepContext::new(epoch, step);
//! store.maybe_save(&model.parameters(), "cp-{epoch:04}", &ctx)?;
//!
//! // Later, in a fresh process:
//! let mut model = build_model();
//! store.restore(SnapshotRef::Latest, &mut model)?;
//! ```

use std::path::PathBuf;

pub mod checkpoint;
pub mod params;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{
        render_name, CheckpointStore, Checkpointable, IntervalUnit, Objective, RetentionPolicy,
        ShardInfo, Snapshot, SnapshotRef, Snapshots, StepContext, StoreConfig,
    };
    pub use crate::params::{ArchitectureSignature, ParameterMap, SignatureMismatch};
    pub use crate::{Result, StoreError};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::params::SignatureMismatch;

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot not found: {name}")]
    SnapshotNotFound { name: String },

    #[error(
        "Architecture mismatch for snapshot '{name}': {}",
        params::signature::describe(.mismatches)
    )]
    ArchitectureMismatch {
        name: String,
        mismatches: Vec<SignatureMismatch>,
    },

    #[error("Invalid snapshot name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Snapshot '{name}' is corrupt: {reason}")]
    CorruptSnapshot { name: String, reason: String },

    #[error("Checkpoint index at {} is corrupt: {reason}", .path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
