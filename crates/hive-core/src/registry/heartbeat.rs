//! Heartbeat registry: the liveness source of truth.
//!
//! One timestamp per agent, overwritten on every beat, never historized
//! and never purged. Staleness is a judgment made at read time against a
//! TTL, not a stored state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::domain::{AgentId, CoreError};
use crate::ports::Clock;
use crate::store::{RecordStore, run_blocking};

/// Persisted form: agent -> last seen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatDoc {
    #[serde(default)]
    pub agents: BTreeMap<AgentId, DateTime<Utc>>,
}

#[derive(Clone)]
pub struct HeartbeatRegistry {
    store: RecordStore<HeartbeatDoc>,
    clock: Arc<dyn Clock>,
}

impl HeartbeatRegistry {
    pub fn open(config: &CoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RecordStore::open(&config.registry_dir(), "heartbeats", config.lock_timeout),
            clock,
        }
    }

    /// Record a beat at the current clock reading.
    pub async fn record(&self, agent_id: &AgentId) -> Result<(), CoreError> {
        let at = self.clock.now();
        self.record_at(agent_id, at).await
    }

    /// Record a beat at an explicit timestamp. Never moves an agent's
    /// entry backwards.
    pub async fn record_at(&self, agent_id: &AgentId, at: DateTime<Utc>) -> Result<(), CoreError> {
        let registry = self.clone();
        let agent = agent_id.clone();
        run_blocking(move || {
            registry.store.update(|doc| {
                let entry = doc.agents.entry(agent.clone()).or_insert(at);
                *entry = (*entry).max(at);
                Ok(())
            })
        })
        .await
    }

    /// Agents whose newest beat is within the TTL.
    pub async fn all(&self, ttl: Duration) -> Result<BTreeMap<AgentId, DateTime<Utc>>, CoreError> {
        let registry = self.clone();
        run_blocking(move || {
            let now = registry.clock.now();
            let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
            Ok(registry
                .store
                .load()?
                .agents
                .into_iter()
                .filter(|(_, last_seen)| now.signed_duration_since(*last_seen) <= ttl)
                .collect())
        })
        .await
    }

    /// Agents whose newest beat is older than the TTL.
    pub async fn stale(&self, ttl: Duration) -> Result<Vec<AgentId>, CoreError> {
        let registry = self.clone();
        run_blocking(move || {
            let now = registry.clock.now();
            let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
            Ok(registry
                .store
                .load()?
                .agents
                .into_iter()
                .filter(|(_, last_seen)| now.signed_duration_since(*last_seen) > ttl)
                .map(|(agent_id, _)| agent_id)
                .collect())
        })
        .await
    }
}
