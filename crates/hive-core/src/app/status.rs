//! Per-status tallies across the three boards, for dashboards and CLIs.

use serde::{Deserialize, Serialize};

use crate::board::{Board, TaskBoardStore};
use crate::domain::{CoreError, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardCounts {
    pub pending: usize,
    pub working: usize,
    pub blocked: usize,
    pub stalled: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BoardCounts {
    pub fn total(&self) -> usize {
        self.pending
            + self.working
            + self.blocked
            + self.stalled
            + self.completed
            + self.failed
            + self.cancelled
    }
}

pub async fn counts_by_status(boards: &TaskBoardStore) -> Result<BoardCounts, CoreError> {
    let mut counts = BoardCounts::default();
    for board in [Board::Ready, Board::Working, Board::Completed] {
        for task in boards.list(board, None).await? {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Working => counts.working += 1,
                TaskStatus::Blocked => counts.blocked += 1,
                TaskStatus::Stalled => counts.stalled += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
            }
        }
    }
    Ok(counts)
}
