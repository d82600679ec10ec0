//! Task record: the single source of truth for one unit of work.
//!
//! Design:
//! - Board documents hold full records keyed by id; all state transitions
//!   happen through methods here, never by poking fields from the stores.
//! - Timestamps are monotonic non-decreasing: `touch` never moves
//!   `updated_at` backwards even if the wall clock does.
//! - `notes` is an append-only audit trail.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, CapabilityId, TaskId};
use super::priority::Priority;
use super::status::TaskStatus;
use super::task_type::TaskType;

/// One entry of the append-only audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNote {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// A unit of work on one of the three boards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,

    /// Kind of work, matched against the claim filter. None = generic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TaskType>,

    pub description: String,

    pub status: TaskStatus,

    /// Integer rank, lower served first. Named levels are normalized to
    /// this scale on enqueue and never compared by name afterwards.
    pub priority: i32,

    /// Tasks that must be COMPLETED before this one is claimable.
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,

    /// Capabilities the claiming agent must hold active. Empty = any agent.
    #[serde(default)]
    pub required_capabilities: BTreeSet<CapabilityId>,

    /// Set exactly while claimed, cleared on release.
    #[serde(default)]
    pub assigned_agent: Option<AgentId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Free-form outcome payload, set on terminal status.
    #[serde(default)]
    pub result: Option<serde_json::Value>,

    /// Failure description, set on terminal status.
    #[serde(default)]
    pub error_details: Option<String>,

    #[serde(default)]
    pub notes: Vec<TaskNote>,
}

impl TaskRecord {
    pub fn new(task_id: TaskId, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            kind: None,
            description: description.into(),
            status: TaskStatus::Pending,
            priority: Priority::Medium.rank(),
            dependencies: BTreeSet::new(),
            required_capabilities: BTreeSet::new(),
            assigned_agent: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            result: None,
            error_details: None,
            notes: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: TaskType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority.rank();
        self
    }

    /// Raw rank for callers that sit between the named anchors.
    pub fn with_priority_rank(mut self, rank: i32) -> Self {
        self.priority = rank;
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn with_required_capabilities(
        mut self,
        capabilities: impl IntoIterator<Item = CapabilityId>,
    ) -> Self {
        self.required_capabilities = capabilities.into_iter().collect();
        self
    }

    /// Advance `updated_at`, never backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
    }

    pub fn push_note(&mut self, text: impl Into<String>, now: DateTime<Utc>) {
        self.notes.push(TaskNote {
            at: now,
            text: text.into(),
        });
        self.touch(now);
    }

    /// Claim transition: Pending -> Working, owned by `agent_id`.
    pub fn begin_work(&mut self, agent_id: AgentId, now: DateTime<Utc>) {
        self.status = TaskStatus::Working;
        self.assigned_agent = Some(agent_id);
        self.touch(now);
    }

    /// Release transition: back to Pending, ownership cleared, reason
    /// recorded in the audit trail.
    pub fn release(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Pending;
        self.assigned_agent = None;
        self.push_note(format!("released: {}", reason.into()), now);
    }

    /// Terminal transition via a completion outcome.
    pub fn finish(&mut self, outcome: CompletionOutcome, now: DateTime<Utc>) {
        match outcome {
            CompletionOutcome::Completed { result } => {
                self.status = TaskStatus::Completed;
                self.result = result;
            }
            CompletionOutcome::Failed { error_details } => {
                self.status = TaskStatus::Failed;
                self.error_details = Some(error_details);
            }
            CompletionOutcome::Cancelled { reason } => {
                self.status = TaskStatus::Cancelled;
                self.push_note(format!("cancelled: {reason}"), now);
            }
        }
        self.completed_at = Some(now);
        self.touch(now);
    }

    /// Cancel from any non-terminal state.
    pub fn mark_cancelled(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.finish(
            CompletionOutcome::Cancelled {
                reason: reason.into(),
            },
            now,
        );
    }

    /// Apply a partial update while on the Working board.
    pub fn apply_update(&mut self, update: WorkingUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status.into();
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let Some(note) = update.note {
            self.push_note(note, now);
        }
        self.touch(now);
    }
}

/// Statuses an owner (or an external monitor) may set on a claimed task.
///
/// A separate enum rather than `TaskStatus` so a partial update cannot
/// smuggle a task into a terminal or claimable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkingStatus {
    Working,
    Blocked,
    Stalled,
}

impl From<WorkingStatus> for TaskStatus {
    fn from(status: WorkingStatus) -> Self {
        match status {
            WorkingStatus::Working => TaskStatus::Working,
            WorkingStatus::Blocked => TaskStatus::Blocked,
            WorkingStatus::Stalled => TaskStatus::Stalled,
        }
    }
}

/// Partial update for a task on the Working board.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkingUpdate {
    #[serde(default)]
    pub status: Option<WorkingStatus>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Terminal outcome of a claimed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Completed {
        #[serde(default)]
        result: Option<serde_json::Value>,
    },
    Failed {
        error_details: String,
    },
    Cancelled {
        reason: String,
    },
}

impl CompletionOutcome {
    pub fn success(result: Option<serde_json::Value>) -> Self {
        CompletionOutcome::Completed { result }
    }

    pub fn failure(error_details: impl Into<String>) -> Self {
        CompletionOutcome::Failed {
            error_details: error_details.into(),
        }
    }
}
