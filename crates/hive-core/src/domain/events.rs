//! Domain events published to the external pub/sub transport.
//!
//! Every event carries the full mutated record so subscribers never have
//! to re-query the store. Delivery is best-effort and fire-and-forget.

use serde::{Deserialize, Serialize};

use super::capability::CapabilityDescriptor;
use super::ids::{AgentId, CapabilityId};
use super::task::TaskRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskEnqueued {
        task: TaskRecord,
    },
    TaskClaimed {
        task: TaskRecord,
    },
    TaskCompleted {
        task: TaskRecord,
    },
    TaskReleased {
        task: TaskRecord,
        reason: String,
    },
    TaskCancelled {
        task: TaskRecord,
        reason: String,
    },
    CapabilityRegistered {
        descriptor: CapabilityDescriptor,
    },
    CapabilityUnregistered {
        agent_id: AgentId,
        capability_id: CapabilityId,
    },
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::TaskEnqueued { .. } => "task.enqueued",
            DomainEvent::TaskClaimed { .. } => "task.claimed",
            DomainEvent::TaskCompleted { .. } => "task.completed",
            DomainEvent::TaskReleased { .. } => "task.released",
            DomainEvent::TaskCancelled { .. } => "task.cancelled",
            DomainEvent::CapabilityRegistered { .. } => "capability.registered",
            DomainEvent::CapabilityUnregistered { .. } => "capability.unregistered",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}
