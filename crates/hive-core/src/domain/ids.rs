//! Domain identifiers (strongly-typed IDs).
//!
//! Identifiers are opaque strings minted by whoever creates the entity:
//! producers name their tasks, agents name themselves. A phantom marker
//! type keeps the three families apart at compile time while sharing one
//! implementation.
//!
//! Serde is implemented by hand so an `Id<T>` is a plain JSON string and
//! can be used directly as a map key in persisted documents.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{Deserializer, Error as _};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Marker trait for each ID family.
pub trait IdMarker: Send + Sync + 'static {
    /// Short label used in Debug-style contexts ("task", "agent", ...).
    fn label() -> &'static str;
}

/// Generic opaque string ID.
///
/// `T` is phantom: it costs nothing at runtime but makes `TaskId` and
/// `AgentId` distinct, non-interchangeable types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        if value.is_empty() {
            return Err(D::Error::custom(format!("empty {} id", T::label())));
        }
        Ok(Self::new(value))
    }
}

/// Marker for task ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn label() -> &'static str {
        "task"
    }
}

/// Marker for agent ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Agent {}

impl IdMarker for Agent {
    fn label() -> &'static str {
        "agent"
    }
}

/// Marker for capability ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {}

impl IdMarker for Capability {
    fn label() -> &'static str {
        "capability"
    }
}

/// Identifier of a task (immutable once enqueued).
pub type TaskId = Id<Task>;

/// Identifier of a worker agent.
pub type AgentId = Id<Agent>;

/// Identifier of an advertised capability.
pub type CapabilityId = Id<Capability>;

impl Id<Task> {
    /// Mint a fresh task id for producers that do not bring their own.
    ///
    /// ULID なので生成順にソート可能。
    pub fn generate() -> Self {
        Self::new(Ulid::new().to_string())
    }
}
