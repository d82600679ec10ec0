//! Domain model (IDs, task records, capabilities, events, errors).

pub mod capability;
pub mod errors;
pub mod events;
pub mod ids;
pub mod priority;
pub mod status;
pub mod task;
pub mod task_type;

pub use capability::{CapabilityDescriptor, CapabilityQuery};
pub use errors::CoreError;
pub use events::DomainEvent;
pub use ids::{AgentId, CapabilityId, TaskId};
pub use priority::Priority;
pub use status::TaskStatus;
pub use task::{CompletionOutcome, TaskNote, TaskRecord, WorkingStatus, WorkingUpdate};
pub use task_type::TaskType;
