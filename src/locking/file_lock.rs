//! Per-user, per-mode run locking so two concurrent invocations for the
//! same user cannot interleave.

use crate::constants::LOCK_FILE_EXTENSION;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lock file content, kept for operator debugging.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID that holds the lock.
    pub pid: u32,
    /// Hostname of the machine.
    pub hostname: String,
    /// When the lock was acquired.
    pub started: DateTime<Utc>,
    /// User id this lock guards.
    pub user_id: String,
    /// Run mode this lock guards (`run-nightly`, `update-today`, …).
    pub mode: String,
}

/// RAII guard for a per-user run lock.
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    /// Attempt to acquire the lock for `(user_id, mode)` under `upload_dir`.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyRunning`] if the lock is already held, or
    /// [`Error::LockCreate`] if the lock file cannot be created for any
    /// other reason.
    pub fn acquire(upload_dir: &Path, user_id: &str, mode: &str) -> Result<Self> {
        let lock_path = Self::lock_path_for(upload_dir, user_id, mode);

        fs::create_dir_all(upload_dir).map_err(|e| Error::OutputDirCreateFailed {
            path: upload_dir.to_path_buf(),
            source: e,
        })?;

        // Registered before creation so a signal between creation and
        // registration still gets cleaned up.
        register_lock(&lock_path);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path);

        match file {
            Ok(mut f) => {
                let info = LockInfo {
                    pid: std::process::id(),
                    hostname: hostname::get().map_or_else(
                        |_| "unknown".to_string(),
                        |h| h.to_string_lossy().into_owned(),
                    ),
                    started: Utc::now(),
                    user_id: user_id.to_string(),
                    mode: mode.to_string(),
                };
                let json = serde_json::to_string_pretty(&info).unwrap_or_else(|_| "{}".to_string());
                let _ = f.write_all(json.as_bytes());
                Ok(Self { lock_path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                unregister_lock(&lock_path);
                Err(Error::AlreadyRunning { path: lock_path })
            }
            Err(e) => {
                unregister_lock(&lock_path);
                Err(Error::LockCreate {
                    path: lock_path,
                    source: e,
                })
            }
        }
    }

    /// Path of the lock file for `(user_id, mode)` under `upload_dir`.
    #[must_use]
    pub fn lock_path_for(upload_dir: &Path, user_id: &str, mode: &str) -> PathBuf {
        upload_dir.join(format!("{user_id}-{mode}{LOCK_FILE_EXTENSION}"))
    }

    /// Whether a lock is currently held for `(user_id, mode)`.
    #[must_use]
    pub fn is_locked(upload_dir: &Path, user_id: &str, mode: &str) -> bool {
        Self::lock_path_for(upload_dir, user_id, mode).exists()
    }

    /// Whether the lock for `(user_id, mode)` is older than `max_age`
    /// (an operator-triggered cleanup path, not used by the pipeline itself).
    #[must_use]
    pub fn is_stale(upload_dir: &Path, user_id: &str, mode: &str, max_age: Duration) -> bool {
        let lock_path = Self::lock_path_for(upload_dir, user_id, mode);
        if let Ok(metadata) = fs::metadata(&lock_path)
            && let Ok(modified) = metadata.modified()
        {
            return modified.elapsed().unwrap_or_default() > max_age;
        }
        false
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
        unregister_lock(&self.lock_path);
    }
}

/// Global registry of active lock paths, drained by [`cleanup_all_locks`]
/// when a termination signal is received.
static ACTIVE_LOCKS: std::sync::LazyLock<std::sync::Mutex<Vec<PathBuf>>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(Vec::new()));

/// Register a lock path for signal-triggered cleanup.
pub fn register_lock(path: &Path) {
    if let Ok(mut locks) = ACTIVE_LOCKS.lock() {
        locks.push(path.to_path_buf());
    }
}

/// Unregister a lock path after normal cleanup.
pub fn unregister_lock(path: &Path) {
    if let Ok(mut locks) = ACTIVE_LOCKS.lock() {
        locks.retain(|p| p != path);
    }
}

/// Remove every registered lock file. Called from the `ctrlc` signal hook;
/// recovers from a poisoned mutex so cleanup still runs if another thread
/// panicked while holding it.
pub fn cleanup_all_locks() {
    let paths = {
        let mut locks = ACTIVE_LOCKS
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::take(&mut *locks)
    };
    for lock_path in paths {
        let _ = fs::remove_file(&lock_path);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serializes tests touching `ACTIVE_LOCKS`, matching the teacher's own
    /// `TEST_LOCK` pattern for process-global state.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_acquire_and_release_lock() {
        let _guard = TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();

        let lock = FileLock::acquire(temp_dir.path(), "user-1", "update-today");
        assert!(lock.is_ok());
        assert!(FileLock::is_locked(temp_dir.path(), "user-1", "update-today"));

        drop(lock);
        assert!(!FileLock::is_locked(temp_dir.path(), "user-1", "update-today"));
    }

    #[test]
    fn test_double_lock_fails_with_already_running() {
        let _guard = TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();

        let lock1 = FileLock::acquire(temp_dir.path(), "user-1", "update-today");
        assert!(lock1.is_ok());

        let lock2 = FileLock::acquire(temp_dir.path(), "user-1", "update-today");
        assert!(matches!(lock2, Err(Error::AlreadyRunning { .. })));
    }

    #[test]
    fn test_different_modes_do_not_conflict() {
        let _guard = TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();

        let lock1 = FileLock::acquire(temp_dir.path(), "user-1", "update-today");
        let lock2 = FileLock::acquire(temp_dir.path(), "user-1", "reconcile");
        assert!(lock1.is_ok());
        assert!(lock2.is_ok());
    }

    #[test]
    fn test_cleanup_all_locks_removes_registered_files() {
        let _guard = TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("cleanup-test.laughter-pipeline.lock");
        fs::File::create(&lock_path).unwrap();
        assert!(lock_path.exists());

        register_lock(&lock_path);
        cleanup_all_locks();

        assert!(!lock_path.exists());
    }
}
