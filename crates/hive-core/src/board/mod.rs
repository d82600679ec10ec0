//! The three task boards and the only component allowed to move tasks
//! between them.

mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{TaskId, TaskRecord};

pub use store::TaskBoardStore;

/// One of the three durable collections a task can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    /// Pending tasks, eligible for claiming.
    Ready,
    /// Claimed tasks owned by an agent.
    Working,
    /// Terminal tasks. Records are never destroyed, they retire here.
    Completed,
}

impl Board {
    pub(crate) fn file_stem(self) -> &'static str {
        match self {
            Board::Ready => "ready",
            Board::Working => "working",
            Board::Completed => "completed",
        }
    }
}

/// Persisted form of one board: full records keyed by task id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardDoc {
    #[serde(default)]
    pub tasks: BTreeMap<TaskId, TaskRecord>,
}

/// One repair performed by the consistency scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// Task was on Ready and Working; the Ready copy was dropped.
    DroppedReadyCopy(TaskId),
    /// Task was on Working and Completed with a terminal Completed copy;
    /// the interrupted move was finished by dropping the Working copy.
    DroppedWorkingCopy(TaskId),
    /// Task had a non-terminal duplicate on Completed; that copy was
    /// dropped in favor of the live one.
    DroppedCompletedCopy(TaskId),
}
