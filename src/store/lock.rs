use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClaimError, Result};

/// Exclusive advisory lock on a file, held until the guard is dropped.
///
/// Every early return and `?` inside a critical section drops the guard, so
/// the lock cannot leak past the operation that took it.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    /// A guard that holds nothing, used when advisory locking is disabled.
    pub fn disabled(path: &Path) -> Self {
        Self {
            file: None,
            path: path.to_path_buf(),
        }
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take()
            && let Err(err) = file.unlock()
        {
            tracing::warn!(path = %self.path.display(), "failed to release lock: {err}");
        }
    }
}

/// Acquire an exclusive lock, retrying with exponential backoff
/// (1ms doubling to 512ms, about one second in total) before reporting
/// [`ClaimError::Locked`]. Contention is never queued beyond that.
pub fn acquire_lock(path: &Path) -> Result<LockGuard> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    let mut delay = Duration::from_millis(1);
    let max_delay = Duration::from_millis(512);

    loop {
        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "lock acquired");
                return Ok(LockGuard {
                    file: Some(file),
                    path: path.to_path_buf(),
                });
            }
            Err(_) if delay <= max_delay => {
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(_) => return Err(ClaimError::Locked(path.display().to_string())),
        }
    }
}

/// Single non-blocking attempt; `Ok(None)` when another holder has it.
pub fn try_lock(path: &Path) -> Result<Option<LockGuard>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(Some(LockGuard {
            file: Some(file),
            path: path.to_path_buf(),
        })),
        Err(_) => Ok(None),
    }
}
