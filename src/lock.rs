//! Advisory cross-process lock on an index root.
//!
//! Indexers hold the lock exclusively; any number of readers may share it.
//! Acquisition never blocks: a held lock is reported as [`BlotdexError::Lock`].

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{BlotdexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Holds an `fs2` lock on a lock file until dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl FileLock {
    /// Creates (or truncates) the lock file at `path` and locks it.
    pub fn open_and_lock(path: &Path, mode: LockMode) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::acquire_with_mode(file, path, mode)
    }

    pub fn acquire_with_mode(file: File, path: &Path, mode: LockMode) -> Result<Self> {
        let locked = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        if let Err(err) = locked {
            return Err(BlotdexError::Lock(format!(
                "unable to lock {} ({mode:?}): {err}",
                path.display()
            )));
        }
        tracing::debug!(lock.path = %path.display(), lock.mode = ?mode, "acquired index lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }

    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(lock.path = %self.path.display(), error = %err, "failed to release index lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn shared_locks_coexist_but_exclude_writers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("idx.lock");

        let a = FileLock::open_and_lock(&path, LockMode::Shared).unwrap();
        let b = FileLock::open_and_lock(&path, LockMode::Shared).unwrap();
        assert_eq!(a.mode(), LockMode::Shared);
        assert!(matches!(
            FileLock::open_and_lock(&path, LockMode::Exclusive),
            Err(BlotdexError::Lock(_))
        ));
        drop(a);
        drop(b);

        let w = FileLock::open_and_lock(&path, LockMode::Exclusive).unwrap();
        assert!(FileLock::open_and_lock(&path, LockMode::Shared).is_err());
        drop(w);
        FileLock::open_and_lock(&path, LockMode::Shared).unwrap();
    }
}
