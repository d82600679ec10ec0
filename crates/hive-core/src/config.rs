//! Core configuration shared by every store instance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one coordination root.
///
/// All durable state lives under `data_root`:
/// - `boards/{ready,working,completed}.json` plus sibling `.lock` files
/// - `registry/{capabilities,heartbeats}.json` plus sibling `.lock` files
///
/// `lock_timeout` is shared by every document; contention within the
/// timeout resolves silently, expiry surfaces as a retryable error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub data_root: PathBuf,

    /// Bounded wait for any single document lock.
    pub lock_timeout: Duration,

    /// An agent whose newest heartbeat is older than this is stale.
    pub heartbeat_ttl: Duration,

    /// Period of the reclaim sweep.
    pub reclaim_interval: Duration,

    /// Period of the board consistency scan.
    pub scan_interval: Duration,
}

impl CoreConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            lock_timeout: Duration::from_secs(10),
            heartbeat_ttl: Duration::from_secs(60),
            reclaim_interval: Duration::from_secs(30),
            scan_interval: Duration::from_secs(60),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_heartbeat_ttl(mut self, ttl: Duration) -> Self {
        self.heartbeat_ttl = ttl;
        self
    }

    pub fn with_reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim_interval = interval;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub(crate) fn boards_dir(&self) -> PathBuf {
        self.data_root.join("boards")
    }

    pub(crate) fn registry_dir(&self) -> PathBuf {
        self.data_root.join("registry")
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}
