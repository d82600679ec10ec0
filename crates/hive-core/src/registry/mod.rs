//! Durable registries: who can do what, and who is still alive.
//!
//! Both are independent documents, lockable without touching any board.

mod capability;
mod heartbeat;

pub use capability::CapabilityRegistry;
pub use heartbeat::HeartbeatRegistry;
