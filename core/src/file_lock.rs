//! Cross-process advisory locks on `<file>.lock` sidecars.
//!
//! The sidecar is flock'ed, never deleted, so a crashed holder releases its
//! lock with its file descriptor. This is the same convention the external
//! status writer uses.

use crate::error::{PresenceError, PresenceResult};
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const RETRY_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct FileLock {
    lock_path: PathBuf,
}

/// Held lock. Released on drop.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
}

impl FileLock {
    /// Lock guarding `data_path`, stored next to it as `<data_path>.lock`.
    pub fn for_file(data_path: &Path) -> Self {
        let mut name = data_path.as_os_str().to_owned();
        name.push(".lock");
        Self { lock_path: PathBuf::from(name) }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Acquire the lock, retrying until `timeout` elapses.
    pub fn acquire(&self, timeout: Duration) -> PresenceResult<FileLockGuard> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| PresenceError::io(&self.lock_path, e))?;

        let started = Instant::now();
        loop {
            match file.try_lock() {
                Ok(()) => return Ok(FileLockGuard { file }),
                Err(TryLockError::WouldBlock) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(PresenceError::LockTimeout {
                            path: self.lock_path.clone(),
                            waited_ms: waited.as_millis(),
                        });
                    }
                    std::thread::sleep(RETRY_INTERVAL.min(timeout - waited));
                }
                Err(TryLockError::Error(e)) => {
                    return Err(PresenceError::io(&self.lock_path, e));
                }
            }
        }
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!("failed to release file lock: {e}");
        }
    }
}
