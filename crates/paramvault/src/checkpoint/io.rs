//! Filesystem primitives: atomic writes and the directory lock.

use crate::{Result, StoreError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the advisory lock file inside a store directory.
pub(crate) const LOCK_FILE: &str = ".lock";

/// Suffix of in-flight temporary files.
pub(crate) const TMP_SUFFIX: &str = ".tmp";

/// Attach the path being touched to an `io::Error`.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Temporary sibling of `path`, unique per call.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    path.with_file_name(format!(".{}.{}{}", name, uuid::Uuid::new_v4(), TMP_SUFFIX))
}

/// Write `data` to `path` so that readers see either the old file or the
/// complete new one.
///
/// The payload goes to a temporary file first, is flushed (and fsynced
/// when `sync` is set), then renamed over `path`.
pub(crate) fn atomic_write(path: &Path, data: &[u8], sync: bool) -> Result<()> {
    let tmp = temp_path(path);

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.flush()?;
        if sync {
            file.sync_all()?;
        }
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Io {
            path: tmp,
            source: e,
        });
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        });
    }

    if sync {
        if let Some(parent) = path.parent() {
            sync_dir(parent);
        }
    }

    Ok(())
}

/// Make renames inside `dir` durable. Best effort: not every platform
/// allows opening a directory for fsync.
pub(crate) fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = File::open(dir) {
            if let Err(e) = handle.sync_all() {
                tracing::debug!(dir = %dir.display(), "Directory fsync failed: {}", e);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}

/// Remove a file, treating "already gone" as success.
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Held advisory lock on a store directory. Released on drop.
#[derive(Debug)]
pub(crate) struct DirLock {
    file: Option<File>,
}

impl DirLock {
    /// Block until the exclusive (writer) lock is held.
    pub(crate) fn exclusive(root: &Path, enabled: bool) -> Result<Self> {
        if !enabled {
            return Ok(Self { file: None });
        }
        let path = root.join(LOCK_FILE);
        let file = open_lock_file(&path)?;
        FileExt::lock_exclusive(&file).at(&path)?;
        tracing::debug!(path = %path.display(), "Acquired exclusive store lock");
        Ok(Self { file: Some(file) })
    }

    /// Block until a shared (reader) lock is held.
    pub(crate) fn shared(root: &Path, enabled: bool) -> Result<Self> {
        if !enabled {
            return Ok(Self { file: None });
        }
        let path = root.join(LOCK_FILE);
        let file = open_lock_file(&path)?;
        FileExt::lock_shared(&file).at(&path)?;
        Ok(Self { file: Some(file) })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .at(path)
}
