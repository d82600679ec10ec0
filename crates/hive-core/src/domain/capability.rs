//! Capability descriptors and query matching.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, CapabilityId};

/// What one agent can do, keyed by (agent_id, capability_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub agent_id: AgentId,
    pub capability_id: CapabilityId,

    /// Exact-match version string. No semantic ranges: "1.2.3" and
    /// "1.2.4" are simply different capabilities as far as queries are
    /// concerned.
    pub version: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    pub is_active: bool,

    pub registered_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub last_verified: Option<DateTime<Utc>>,
}

impl CapabilityDescriptor {
    pub fn new(
        agent_id: AgentId,
        capability_id: CapabilityId,
        version: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id,
            capability_id,
            version: version.into(),
            tags: BTreeSet::new(),
            is_active: true,
            registered_at: now,
            last_updated: now,
            last_verified: None,
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Filter for registry lookups.
///
/// Every requested tag must be present on the descriptor; capability id
/// and version are exact matches when given. Inactive descriptors are
/// excluded unless `include_inactive` is set.
#[derive(Debug, Clone, Default)]
pub struct CapabilityQuery {
    pub capability_id: Option<CapabilityId>,
    pub tags: BTreeSet<String>,
    /// Exact string comparison only.
    pub version: Option<String>,
    pub include_inactive: bool,
}

impl CapabilityQuery {
    pub fn for_capability(capability_id: CapabilityId) -> Self {
        Self {
            capability_id: Some(capability_id),
            ..Self::default()
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn matches(&self, descriptor: &CapabilityDescriptor) -> bool {
        if !self.include_inactive && !descriptor.is_active {
            return false;
        }
        if let Some(capability_id) = &self.capability_id
            && capability_id != &descriptor.capability_id
        {
            return false;
        }
        if let Some(version) = &self.version
            && version != &descriptor.version
        {
            return false;
        }
        self.tags.is_subset(&descriptor.tags)
    }
}
