//! paramvault CLI
//!
//! Command-line interface for inspecting and maintaining checkpoint stores.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

use paramvault::prelude::*;
use paramvault::utils::{abbreviate, format_age, format_bytes};

mod demo;

#[derive(Parser)]
#[command(name = "pvault")]
#[command(version, about = "paramvault - Durable checkpoints for model parameters", long_about = None)]
struct Cli {
    /// Store configuration file (JSON); its root is replaced by DIR
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the snapshots in a store
    List {
        /// Store directory
        dir: PathBuf,
    },

    /// Show a snapshot's metadata and tensor shapes
    Inspect {
        /// Store directory
        dir: PathBuf,

        /// Snapshot name, or "latest"
        #[arg(default_value = "latest")]
        snapshot: String,
    },

    /// Check the shard checksums of a snapshot
    Verify {
        /// Store directory
        dir: PathBuf,

        /// Snapshot name, or "latest"
        #[arg(default_value = "latest")]
        snapshot: String,

        /// Verify every snapshot in the store
        #[arg(long)]
        all: bool,
    },

    /// Delete a snapshot
    Delete {
        /// Store directory
        dir: PathBuf,

        /// Snapshot name
        name: String,
    },

    /// Keep only the most recent snapshots
    Prune {
        /// Store directory
        dir: PathBuf,

        /// Number of snapshots to keep
        #[arg(long)]
        keep: usize,
    },

    /// Demo: train a toy classifier, checkpoint it, and restore it
    Demo {
        /// Store directory
        #[arg(default_value = "checkpoints")]
        dir: PathBuf,

        /// Number of training epochs
        #[arg(long, default_value = "20", value_parser = clap::value_parser!(u64).range(1..))]
        epochs: u64,

        /// Epochs between automatic saves [default: 5]
        #[arg(long)]
        save_every: Option<u64>,

        /// Maximum number of snapshots to retain
        #[arg(long)]
        keep: Option<usize>,

        /// Snapshot name template
        #[arg(long, default_value = "cp-{epoch:04}")]
        template: String,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    // Initialize logging; RUST_LOG replaces the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::List { dir } => {
            let store = open_store(config_file, dir, |c| c)?;
            list(&store)?;
        }
        Commands::Inspect { dir, snapshot } => {
            let store = open_store(config_file, dir, |c| c)?;
            inspect(&store, &snapshot)?;
        }
        Commands::Verify { dir, snapshot, all } => {
            let store = open_store(config_file, dir, |c| c)?;
            verify(&store, &snapshot, all)?;
        }
        Commands::Delete { dir, name } => {
            let mut store = open_store(config_file, dir, |c| c)?;
            if store.delete(&name)? {
                println!("Deleted {}", name);
            } else {
                println!("No snapshot named {}", name);
            }
        }
        Commands::Prune { dir, keep } => {
            let mut store = open_store(config_file, dir, |c| c)?;
            let evicted = store.prune(keep)?;
            println!("Pruned {} snapshot(s)", evicted.len());
            for name in evicted {
                println!("  {}", name);
            }
        }
        Commands::Demo {
            dir,
            epochs,
            save_every,
            keep,
            template,
            seed,
        } => {
            let has_config = config_file.is_some();
            let mut store = open_store(config_file, dir, |mut c| {
                match save_every {
                    Some(n) => c.retention.save_interval = n,
                    None if !has_config => c.retention.save_interval = 5,
                    None => {}
                }
                if keep.is_some() {
                    c.retention.max_kept = keep;
                }
                c
            })?;
            demo::run(
                &mut store,
                &demo::DemoOptions {
                    epochs,
                    template,
                    seed,
                },
            )?;
        }
    }

    Ok(())
}

/// Build the store config from an optional file plus command-line overrides.
fn open_store(
    config_file: Option<&Path>,
    dir: PathBuf,
    overrides: impl FnOnce(StoreConfig) -> StoreConfig,
) -> Result<CheckpointStore> {
    let mut config = match config_file {
        Some(path) => StoreConfig::from_json_file(path)?,
        None => StoreConfig::default(),
    };
    config.root = dir;
    let config = overrides(config);

    CheckpointStore::open(config).context("failed to open checkpoint store")
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn list(store: &CheckpointStore) -> Result<()> {
    let snapshots = store.list()?;
    if snapshots.is_empty() {
        println!("No snapshots in {}", store.root().display());
        return Ok(());
    }

    let latest = snapshots.latest().map(|s| s.sequence_index);
    let now = now();

    println!(
        "{:>8}  {:<32} {:>6} {:>10} {:>8} {:>10}  created",
        "seq", "name", "epoch", "step", "metric", "size"
    );
    for s in &snapshots {
        let metric = s
            .metric
            .map(|m| format!("{:.4}", m))
            .unwrap_or_else(|| "-".to_string());
        let marker = if Some(s.sequence_index) == latest {
            "  (latest)"
        } else {
            ""
        };
        println!(
            "{:>8}  {:<32} {:>6} {:>10} {:>8} {:>10}  {}{}",
            s.sequence_index,
            s.name,
            s.epoch,
            s.step,
            metric,
            format_bytes(s.total_bytes()),
            format_age(s.created_at, now),
            marker
        );
    }
    println!();
    println!("{} snapshot(s)", snapshots.len());
    Ok(())
}

fn inspect(store: &CheckpointStore, reference: &str) -> Result<()> {
    let reference = SnapshotRef::from(reference);
    let snapshot = match &reference {
        SnapshotRef::Latest => store.latest()?,
        SnapshotRef::Name(name) => store.get(name)?,
    };
    let Some(s) = snapshot else {
        bail!("Snapshot not found: {}", reference);
    };

    println!("Snapshot:   {}", s.name);
    println!("Sequence:   {}", s.sequence_index);
    println!("Epoch:      {}", s.epoch);
    println!("Step:       {}", s.step);
    if let Some(metric) = s.metric {
        println!("Metric:     {:.4}", metric);
    }
    println!("Created:    {}", format_age(s.created_at, now()));
    println!(
        "Parameters: {} in {} tensor(s)",
        abbreviate(s.num_elements),
        s.signature.len()
    );
    println!("Size:       {}", format_bytes(s.total_bytes()));
    println!();

    for shard in &s.shards {
        println!("{} ({}, crc32 {:08x})", shard.file, format_bytes(shard.bytes), shard.crc32);
        for key in &shard.tensors {
            let shape = s.signature.shape(key).unwrap_or(&[]);
            println!("  {:<40} {:?}", key, shape);
        }
    }
    Ok(())
}

fn verify(store: &CheckpointStore, reference: &str, all: bool) -> Result<()> {
    let targets: Vec<SnapshotRef> = if all {
        store
            .list()?
            .into_iter()
            .map(|s| SnapshotRef::Name(s.name))
            .collect()
    } else {
        vec![SnapshotRef::from(reference)]
    };

    let mut failures = 0;
    for target in &targets {
        match store.verify(target.clone()) {
            Ok(s) => println!("OK      {} ({} shard(s))", s.name, s.shards.len()),
            Err(e) => {
                println!("FAILED  {}: {}", target, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} snapshot(s) failed verification", failures, targets.len());
    }
    Ok(())
}
