use std::{
    fs::{self, File, OpenOptions, TryLockError},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::error::AppError;

/// Delay between acquisition attempts
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive advisory lock on a shared file, held on `<target>.lock`.
///
/// Every process that mutates the target locks the same file. The kernel owns
/// the lock: it is released when the guard is dropped or the process dies, so
/// there is no stale-lock recovery. The lock file itself is never deleted,
/// since removing it would let two processes lock different inodes.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    _file: File,
}

impl FileLock {
    /// Blocks until the lock for `target` is held or `timeout` elapses
    pub fn acquire(target: &Path, timeout: Duration) -> Result<FileLock, AppError> {
        let path = lock_path(target);
        let lock_err = |err: std::io::Error| AppError::Lock(format!("{}: {}", path.display(), err));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_err)?;
        let deadline = Instant::now() + timeout;

        loop {
            match file.try_lock() {
                Ok(()) => {
                    debug!(path = %path.display(), "lock acquired");
                    return Ok(FileLock { path, _file: file });
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(AppError::Lock(format!(
                            "timed out waiting for {}",
                            path.display()
                        )));
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(TryLockError::Error(err)) => {
                    return Err(AppError::Lock(format!("{}: {}", path.display(), err)));
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "lock released");
    }
}

fn lock_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}
