//! Per-document file lock with a bounded wait.
//!
//! Design:
//! - The lock is a sibling `<name>.lock` file created with `create_new`,
//!   which is atomic on every platform we care about. Whoever creates the
//!   file owns the lock; dropping the guard removes it.
//! - Waiting is bounded polling. Contention inside the timeout resolves
//!   silently; expiry surfaces `CoreError::LockTimeout` and the caller
//!   decides whether to retry.
//! - A crashed process leaves its lock file behind. That is deliberate:
//!   writers then fail loudly until an operator removes the file. The
//!   file records pid and acquisition time to make that call easy.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use tracing::{debug, warn};

use crate::domain::CoreError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct DocumentLock {
    lock_path: PathBuf,
    timeout: Duration,
}

impl DocumentLock {
    pub fn new(lock_path: PathBuf, timeout: Duration) -> Self {
        Self { lock_path, timeout }
    }

    /// Acquire the lock, waiting at most the configured timeout.
    pub fn acquire(&self) -> Result<LockGuard, CoreError> {
        let started = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(mut file) => {
                    // Advisory contents for the operator inspecting a
                    // leftover lock; failure to write them is harmless.
                    let _ = writeln!(
                        file,
                        "pid={} acquired_at={}",
                        std::process::id(),
                        Utc::now().to_rfc3339()
                    );
                    return Ok(LockGuard {
                        lock_path: self.lock_path.clone(),
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    let waited = started.elapsed();
                    if waited >= self.timeout {
                        debug!(path = %self.lock_path.display(), waited_ms = waited.as_millis() as u64, "lock wait expired");
                        return Err(CoreError::LockTimeout {
                            path: self.lock_path.clone(),
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    // jitter で競合プロセスの再試行タイミングをずらす
                    let jitter = rand::thread_rng().gen_range(Duration::ZERO..POLL_INTERVAL);
                    std::thread::sleep(POLL_INTERVAL + jitter);
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    // Parent directory does not exist yet.
                    if let Some(parent) = self.lock_path.parent() {
                        fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
                    }
                }
                Err(err) => return Err(CoreError::io(&self.lock_path, err)),
            }
        }
    }
}

/// Held lock; releases on drop.
#[derive(Debug)]
pub struct LockGuard {
    lock_path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.lock_path) {
            warn!(path = %self.lock_path.display(), error = %err, "failed to release lock file");
        }
    }
}
