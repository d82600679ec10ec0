//! Error taxonomy of the coordination core.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::ids::{AgentId, CapabilityId, TaskId};

#[derive(Debug, Error)]
pub enum CoreError {
    /// Contention exceeded the bounded wait. Always retryable.
    #[error("lock timeout after {waited_ms}ms waiting for {path}")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    /// The document exists but cannot be parsed. Surfaced to an operator,
    /// never auto-retried and never silently discarded.
    #[error("corrupt record at {path}: {source}")]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Caller tried to enqueue an id that already lives on some board.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskId),

    /// Caller addressed a task the targeted board does not hold.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Soft: the candidate waits on an incomplete dependency.
    #[error("dependency unmet for task {task_id}: waiting on {dependency}")]
    DependencyUnmet { task_id: TaskId, dependency: TaskId },

    /// Soft: the agent lacks (or has deactivated) a required capability.
    #[error("capability mismatch for task {task_id}: agent {agent_id} lacks active {capability_id}")]
    CapabilityMismatch {
        task_id: TaskId,
        agent_id: AgentId,
        capability_id: CapabilityId,
    },

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether retrying the same operation against fresh state can
    /// succeed without operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::LockTimeout { .. })
    }
}
