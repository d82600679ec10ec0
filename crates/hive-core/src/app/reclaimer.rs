//! The reclaimer: returns tasks owned by silent agents to the Ready
//! board.
//!
//! Runs on its own timer, independent of any worker's lifecycle. Fully
//! partial-failure tolerant: one task's failed reclaim is logged and the
//! rest of the sweep proceeds.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::board::{Board, TaskBoardStore};
use crate::domain::{CoreError, TaskId};
use crate::registry::HeartbeatRegistry;

/// Audit-trail reason attached to every reclaimed task.
pub const RECLAIM_REASON: &str = "agent heartbeat expired";

#[derive(Debug, Default)]
pub struct ReclaimReport {
    pub released: Vec<TaskId>,
    pub failed: Vec<(TaskId, CoreError)>,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.failed.is_empty()
    }
}

pub struct Reclaimer {
    boards: TaskBoardStore,
    heartbeats: HeartbeatRegistry,
    ttl: Duration,
}

impl Reclaimer {
    pub fn new(boards: TaskBoardStore, heartbeats: HeartbeatRegistry, ttl: Duration) -> Self {
        Self {
            boards,
            heartbeats,
            ttl,
        }
    }

    /// One sweep: cross-reference stale agents against the Working board
    /// and release everything they still hold.
    pub async fn sweep(&self) -> Result<ReclaimReport, CoreError> {
        let stale: BTreeSet<_> = self.heartbeats.stale(self.ttl).await?.into_iter().collect();
        if stale.is_empty() {
            return Ok(ReclaimReport::default());
        }
        debug!(stale = stale.len(), "stale agents found, scanning working board");

        let working = self.boards.list(Board::Working, None).await?;
        let mut report = ReclaimReport::default();
        for task in working {
            if !task.status.is_reclaimable() {
                continue;
            }
            let held_by_stale = task
                .assigned_agent
                .as_ref()
                .is_some_and(|agent| stale.contains(agent));
            if !held_by_stale {
                continue;
            }
            match self.boards.release_to_ready(&task.task_id, RECLAIM_REASON).await {
                Ok(true) => report.released.push(task.task_id),
                // Already moved by someone else between the snapshot and
                // now; nothing to do.
                Ok(false) => {}
                Err(err) => {
                    warn!(task_id = %task.task_id, error = %err, "reclaim failed, continuing sweep");
                    report.failed.push((task.task_id, err));
                }
            }
        }

        if !report.is_empty() {
            info!(
                released = report.released.len(),
                failed = report.failed.len(),
                "reclaim sweep finished"
            );
        }
        Ok(report)
    }
}
