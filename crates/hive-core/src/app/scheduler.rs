//! The claim sweep: "what should this agent do next".
//!
//! Design:
//! - One sweep works against snapshots taken at its start: the Ready
//!   board, the agent's capability descriptors and the Completed board.
//!   Only a store failure on these first reads aborts the sweep.
//! - Ineligibility (unmet dependency, missing capability, kind mismatch)
//!   is soft: the candidate is skipped and the sweep continues in
//!   priority order.
//! - Losing a claim race is equally soft, and so is a lock timeout during
//!   an individual claim attempt. Both mean "someone else got there",
//!   never "the task does not exist".
//! - An empty result does not distinguish "nothing eligible" from "lost
//!   every race"; callers back off and sweep again.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::board::{Board, TaskBoardStore};
use crate::domain::{AgentId, CoreError, TaskId, TaskRecord, TaskStatus, TaskType};
use crate::registry::{CapabilityRegistry, HeartbeatRegistry};

pub struct Scheduler {
    boards: TaskBoardStore,
    capabilities: CapabilityRegistry,
    heartbeats: HeartbeatRegistry,
}

impl Scheduler {
    pub fn new(
        boards: TaskBoardStore,
        capabilities: CapabilityRegistry,
        heartbeats: HeartbeatRegistry,
    ) -> Self {
        Self {
            boards,
            capabilities,
            heartbeats,
        }
    }

    /// Claim the best eligible task for `agent_id`, or None when the
    /// sweep comes up empty.
    pub async fn claim(
        &self,
        agent_id: &AgentId,
        kind_filter: Option<&TaskType>,
    ) -> Result<Option<TaskRecord>, CoreError> {
        let mut candidates = self
            .boards
            .list(Board::Ready, Some(TaskStatus::Pending))
            .await?;
        let descriptors = self.capabilities.list_for_agent(agent_id).await?;
        let completed = self.boards.list(Board::Completed, None).await?;

        let active: BTreeSet<_> = descriptors
            .into_iter()
            .filter(|descriptor| descriptor.is_active)
            .map(|descriptor| descriptor.capability_id)
            .collect();
        let done: BTreeSet<TaskId> = completed
            .into_iter()
            .filter(|task| task.status == TaskStatus::Completed)
            .map(|task| task.task_id)
            .collect();

        // 優先度 rank -> created_at -> id の決定的順序で試行する
        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.task_id.cmp(&b.task_id))
        });

        for candidate in candidates {
            if let Err(skip) = eligibility(&candidate, agent_id, kind_filter, &active, &done) {
                debug!(task_id = %candidate.task_id, reason = %skip, "candidate skipped");
                continue;
            }
            match self.boards.claim_record(&candidate.task_id, agent_id).await {
                Ok(Some(claimed)) => {
                    // The claimant is now known to the liveness registry
                    // even if it never heartbeats on its own.
                    if let Err(err) = self.heartbeats.record(agent_id).await {
                        warn!(agent_id = %agent_id, error = %err, "implicit heartbeat on claim failed");
                    }
                    info!(task_id = %claimed.task_id, agent_id = %agent_id, "task claimed");
                    return Ok(Some(claimed));
                }
                Ok(None) => {
                    debug!(task_id = %candidate.task_id, "lost claim race, continuing sweep");
                }
                Err(err) if err.is_retryable() => {
                    debug!(task_id = %candidate.task_id, error = %err, "claim attempt timed out, continuing sweep");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

/// Soft eligibility check. An error here skips the candidate, it never
/// aborts the sweep.
fn eligibility(
    task: &TaskRecord,
    agent_id: &AgentId,
    kind_filter: Option<&TaskType>,
    active_capabilities: &BTreeSet<crate::domain::CapabilityId>,
    completed: &BTreeSet<TaskId>,
) -> Result<(), CoreError> {
    if let Some(kind) = kind_filter
        && let Some(task_kind) = &task.kind
        && task_kind != kind
    {
        return Err(CoreError::Other(format!(
            "kind mismatch: task is {task_kind}, filter wants {kind}"
        )));
    }
    for capability in &task.required_capabilities {
        if !active_capabilities.contains(capability) {
            return Err(CoreError::CapabilityMismatch {
                task_id: task.task_id.clone(),
                agent_id: agent_id.clone(),
                capability_id: capability.clone(),
            });
        }
    }
    for dependency in &task.dependencies {
        if !completed.contains(dependency) {
            return Err(CoreError::DependencyUnmet {
                task_id: task.task_id.clone(),
                dependency: dependency.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::domain::{
        CapabilityDescriptor, CapabilityId, CompletionOutcome, Priority, TaskRecord,
    };
    use crate::ports::{Clock, FixedClock, NoopEventSink};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        boards: TaskBoardStore,
        capabilities: CapabilityRegistry,
        heartbeats: HeartbeatRegistry,
        scheduler: Scheduler,
        clock: Arc<FixedClock>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::new(dir.path()).with_lock_timeout(Duration::from_secs(2));
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
        ));
        let events = Arc::new(NoopEventSink);
        let boards = TaskBoardStore::open(&config, clock.clone(), events.clone());
        let capabilities = CapabilityRegistry::open(&config, clock.clone(), events.clone());
        let heartbeats = HeartbeatRegistry::open(&config, clock.clone());
        let scheduler = Scheduler::new(boards.clone(), capabilities.clone(), heartbeats.clone());
        Fixture {
            _dir: dir,
            boards,
            capabilities,
            heartbeats,
            scheduler,
            clock,
        }
    }

    fn task(fx: &Fixture, id: &str) -> TaskRecord {
        TaskRecord::new(TaskId::new(id), format!("task {id}"), fx.clock.now())
    }

    #[tokio::test]
    async fn higher_priority_is_served_first() {
        // Scenario: T1 HIGH and T2 LOW, no deps or capabilities.
        let fx = fixture();
        fx.boards
            .enqueue(task(&fx, "T1").with_priority(Priority::High))
            .await
            .unwrap();
        fx.boards
            .enqueue(task(&fx, "T2").with_priority(Priority::Low))
            .await
            .unwrap();

        let claimed = fx
            .scheduler
            .claim(&AgentId::new("A1"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.task_id, TaskId::new("T1"));
        assert_eq!(claimed.status, TaskStatus::Working);
    }

    #[tokio::test]
    async fn dependency_gates_until_completed() {
        // Scenario: T3 depends on T1; claims skip T3 while T1 is pending,
        // then return it once T1 completes.
        let fx = fixture();
        fx.boards
            .enqueue(task(&fx, "T1").with_priority(Priority::Low))
            .await
            .unwrap();
        fx.boards
            .enqueue(
                task(&fx, "T3")
                    .with_priority(Priority::Critical)
                    .with_dependencies([TaskId::new("T1")]),
            )
            .await
            .unwrap();

        // T3 outranks T1 but is gated, so T1 is claimed.
        let claimed = fx
            .scheduler
            .claim(&AgentId::new("A1"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.task_id, TaskId::new("T1"));

        // Nothing else is eligible while T1 is in flight.
        assert!(
            fx.scheduler
                .claim(&AgentId::new("A2"), None)
                .await
                .unwrap()
                .is_none()
        );

        fx.boards
            .move_to_completed(&TaskId::new("T1"), CompletionOutcome::success(None))
            .await
            .unwrap();
        let claimed = fx
            .scheduler
            .claim(&AgentId::new("A2"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.task_id, TaskId::new("T3"));
    }

    #[tokio::test]
    async fn failed_dependency_does_not_satisfy_the_gate() {
        let fx = fixture();
        fx.boards.enqueue(task(&fx, "T1")).await.unwrap();
        fx.boards
            .enqueue(task(&fx, "T2").with_dependencies([TaskId::new("T1")]))
            .await
            .unwrap();

        fx.boards
            .claim(&TaskId::new("T1"), &AgentId::new("A1"))
            .await
            .unwrap();
        fx.boards
            .move_to_completed(&TaskId::new("T1"), CompletionOutcome::failure("boom"))
            .await
            .unwrap();

        assert!(
            fx.scheduler
                .claim(&AgentId::new("A1"), None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn capability_gates_absent_and_inactive_agents() {
        let fx = fixture();
        fx.boards
            .enqueue(
                task(&fx, "T1").with_required_capabilities([CapabilityId::new("gpu")]),
            )
            .await
            .unwrap();

        // No descriptor at all.
        assert!(
            fx.scheduler
                .claim(&AgentId::new("A1"), None)
                .await
                .unwrap()
                .is_none()
        );

        // Inactive descriptor is just as ineligible.
        fx.capabilities
            .register(
                CapabilityDescriptor::new(
                    AgentId::new("A1"),
                    CapabilityId::new("gpu"),
                    "1.0.0",
                    fx.clock.now(),
                )
                .inactive(),
            )
            .await
            .unwrap();
        assert!(
            fx.scheduler
                .claim(&AgentId::new("A1"), None)
                .await
                .unwrap()
                .is_none()
        );

        // Activating it makes the task claimable.
        fx.capabilities
            .update_status(
                &AgentId::new("A1"),
                &CapabilityId::new("gpu"),
                Some(true),
                None,
            )
            .await
            .unwrap();
        let claimed = fx
            .scheduler
            .claim(&AgentId::new("A1"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.task_id, TaskId::new("T1"));
    }

    #[tokio::test]
    async fn kind_filter_skips_other_kinds_but_takes_generic_tasks() {
        let fx = fixture();
        fx.boards
            .enqueue(
                task(&fx, "T1")
                    .with_kind(TaskType::new("browser"))
                    .with_priority(Priority::Critical),
            )
            .await
            .unwrap();
        fx.boards
            .enqueue(task(&fx, "T2").with_kind(TaskType::new("shell")))
            .await
            .unwrap();
        fx.boards
            .enqueue(task(&fx, "T3").with_priority(Priority::Background))
            .await
            .unwrap();

        let shell = TaskType::new("shell");
        let claimed = fx
            .scheduler
            .claim(&AgentId::new("A1"), Some(&shell))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.task_id, TaskId::new("T2"));

        // The generic task is still claimable under a filter.
        let claimed = fx
            .scheduler
            .claim(&AgentId::new("A1"), Some(&shell))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.task_id, TaskId::new("T3"));
    }

    #[tokio::test]
    async fn racing_schedulers_hand_out_the_task_once() {
        // Scenario: two workers race for the single remaining task.
        let fx = fixture();
        fx.boards.enqueue(task(&fx, "T1")).await.unwrap();

        let scheduler_a = Scheduler::new(
            fx.boards.clone(),
            fx.capabilities.clone(),
            fx.heartbeats.clone(),
        );
        let scheduler_b = Scheduler::new(
            fx.boards.clone(),
            fx.capabilities.clone(),
            fx.heartbeats.clone(),
        );

        let agent_a = AgentId::new("A1");
        let agent_b = AgentId::new("A2");
        let (a, b) = tokio::join!(
            scheduler_a.claim(&agent_a, None),
            scheduler_b.claim(&agent_b, None),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert!(a.is_some() ^ b.is_some());

        // The loser's fresh sweep reports no task.
        assert!(
            fx.scheduler
                .claim(&AgentId::new("A3"), None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn successful_claim_records_an_implicit_heartbeat() {
        let fx = fixture();
        fx.boards.enqueue(task(&fx, "T1")).await.unwrap();

        fx.scheduler
            .claim(&AgentId::new("A1"), None)
            .await
            .unwrap()
            .unwrap();

        let alive = fx.heartbeats.all(Duration::from_secs(60)).await.unwrap();
        assert!(alive.contains_key(&AgentId::new("A1")));
    }

    #[tokio::test]
    async fn empty_board_claims_nothing() {
        let fx = fixture();
        assert!(
            fx.scheduler
                .claim(&AgentId::new("A1"), None)
                .await
                .unwrap()
                .is_none()
        );
    }
}
