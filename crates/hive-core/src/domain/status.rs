//! Task status state machine.

use serde::{Deserialize, Serialize};

/// Task status.
///
/// State transitions:
/// - Pending -> (claim) -> Working -> (complete) -> Completed
/// - Working -> (reclaim / explicit release) -> Pending
/// - Working -> (explicit failure) -> Failed
/// - any non-terminal -> (cancel) -> Cancelled
///
/// Blocked and Stalled are informational sub-states of a claimed task,
/// set by external monitors; the core never transitions into them itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting on the Ready board, eligible for claiming.
    Pending,

    /// Claimed and owned by an agent.
    Working,

    /// Claimed, but the owner reported it blocked.
    Blocked,

    /// Claimed, but a monitor judged it stalled.
    Stalled,

    /// Finished successfully.
    Completed,

    /// Finished with a permanent failure.
    Failed,

    /// Cancelled before reaching a natural end.
    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal status (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Is this task claimable from the Ready board?
    pub fn is_claimable(self) -> bool {
        matches!(self, TaskStatus::Pending)
    }

    /// Should the reclaimer return this task to Ready when its owner
    /// goes silent?
    pub fn is_reclaimable(self) -> bool {
        matches!(self, TaskStatus::Working | TaskStatus::Blocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::completed(TaskStatus::Completed, true)]
    #[case::failed(TaskStatus::Failed, true)]
    #[case::cancelled(TaskStatus::Cancelled, true)]
    #[case::pending(TaskStatus::Pending, false)]
    #[case::working(TaskStatus::Working, false)]
    #[case::blocked(TaskStatus::Blocked, false)]
    #[case::stalled(TaskStatus::Stalled, false)]
    fn terminal_statuses(#[case] status: TaskStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn only_pending_is_claimable() {
        assert!(TaskStatus::Pending.is_claimable());
        assert!(!TaskStatus::Working.is_claimable());
        assert!(!TaskStatus::Completed.is_claimable());
    }

    #[test]
    fn working_and_blocked_are_reclaimable() {
        assert!(TaskStatus::Working.is_reclaimable());
        assert!(TaskStatus::Blocked.is_reclaimable());
        assert!(!TaskStatus::Stalled.is_reclaimable());
        assert!(!TaskStatus::Pending.is_reclaimable());
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let serialized = serde_json::to_string(&TaskStatus::Pending).unwrap();
        assert_eq!(serialized, "\"PENDING\"");

        let back: TaskStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(back, TaskStatus::Cancelled);
    }
}
