//! Ports: the narrow interfaces to everything outside the core.
//!
//! The pub/sub transport and the wall clock are external collaborators;
//! each gets a trait here so tests can substitute them.

pub mod clock;
pub mod event_sink;

pub use clock::{Clock, FixedClock, SystemClock};
pub use event_sink::{EventSink, InMemoryEventSink, NoopEventSink, SinkError, emit};
