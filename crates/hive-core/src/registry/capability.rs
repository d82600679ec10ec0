//! Capability registry: source of truth for "which agents can do what".
//!
//! Consulted by the scheduler, mutated only by agents announcing
//! themselves. Descriptors are removed by explicit unregistration only,
//! never implicitly expired.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CoreConfig;
use crate::domain::{
    AgentId, CapabilityDescriptor, CapabilityId, CapabilityQuery, CoreError, DomainEvent,
};
use crate::ports::{Clock, EventSink, emit};
use crate::store::{RecordStore, run_blocking};

/// Persisted form: agent -> capability -> descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityDoc {
    #[serde(default)]
    pub agents: BTreeMap<AgentId, BTreeMap<CapabilityId, CapabilityDescriptor>>,
}

#[derive(Clone)]
pub struct CapabilityRegistry {
    store: RecordStore<CapabilityDoc>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl CapabilityRegistry {
    pub fn open(config: &CoreConfig, clock: Arc<dyn Clock>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store: RecordStore::open(&config.registry_dir(), "capabilities", config.lock_timeout),
            clock,
            events,
        }
    }

    /// Insert or update a descriptor. On update the original
    /// `registered_at` is preserved; `last_updated` always advances.
    pub async fn register(
        &self,
        descriptor: CapabilityDescriptor,
    ) -> Result<CapabilityDescriptor, CoreError> {
        let registry = self.clone();
        let stored = run_blocking(move || registry.register_blocking(descriptor)).await?;
        emit(
            self.events.as_ref(),
            &DomainEvent::CapabilityRegistered {
                descriptor: stored.clone(),
            },
        )
        .await;
        Ok(stored)
    }

    /// Remove one (agent, capability) entry. Returns false if absent.
    pub async fn unregister(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
    ) -> Result<bool, CoreError> {
        let registry = self.clone();
        let agent = agent_id.clone();
        let capability = capability_id.clone();
        let removed =
            run_blocking(move || registry.unregister_blocking(&agent, &capability)).await?;
        if removed {
            emit(
                self.events.as_ref(),
                &DomainEvent::CapabilityUnregistered {
                    agent_id: agent_id.clone(),
                    capability_id: capability_id.clone(),
                },
            )
            .await;
        }
        Ok(removed)
    }

    pub async fn get(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
    ) -> Result<Option<CapabilityDescriptor>, CoreError> {
        let registry = self.clone();
        let agent = agent_id.clone();
        let capability = capability_id.clone();
        run_blocking(move || {
            Ok(registry
                .store
                .load()?
                .agents
                .get(&agent)
                .and_then(|capabilities| capabilities.get(&capability))
                .cloned())
        })
        .await
    }

    pub async fn list_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<CapabilityDescriptor>, CoreError> {
        let registry = self.clone();
        let agent = agent_id.clone();
        run_blocking(move || {
            Ok(registry
                .store
                .load()?
                .agents
                .get(&agent)
                .map(|capabilities| capabilities.values().cloned().collect())
                .unwrap_or_default())
        })
        .await
    }

    /// All descriptors matching the query, across every agent.
    pub async fn find(
        &self,
        query: CapabilityQuery,
    ) -> Result<Vec<CapabilityDescriptor>, CoreError> {
        let registry = self.clone();
        run_blocking(move || {
            Ok(registry
                .store
                .load()?
                .agents
                .into_values()
                .flat_map(|capabilities| capabilities.into_values())
                .filter(|descriptor| query.matches(descriptor))
                .collect())
        })
        .await
    }

    /// Agents advertising a capability, optionally including ones whose
    /// descriptor is inactive.
    pub async fn find_agents_for_capability(
        &self,
        capability_id: &CapabilityId,
        require_active: bool,
    ) -> Result<Vec<AgentId>, CoreError> {
        let registry = self.clone();
        let capability = capability_id.clone();
        run_blocking(move || {
            Ok(registry
                .store
                .load()?
                .agents
                .iter()
                .filter(|(_, capabilities)| {
                    capabilities
                        .get(&capability)
                        .is_some_and(|descriptor| !require_active || descriptor.is_active)
                })
                .map(|(agent_id, _)| agent_id.clone())
                .collect())
        })
        .await
    }

    /// Flip activity and/or record a verification probe.
    pub async fn update_status(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        is_active: Option<bool>,
        last_verified: Option<DateTime<Utc>>,
    ) -> Result<bool, CoreError> {
        let registry = self.clone();
        let agent = agent_id.clone();
        let capability = capability_id.clone();
        run_blocking(move || {
            let now = registry.clock.now();
            registry.store.update(|doc| {
                let Some(descriptor) = doc
                    .agents
                    .get_mut(&agent)
                    .and_then(|capabilities| capabilities.get_mut(&capability))
                else {
                    return Ok(false);
                };
                if let Some(is_active) = is_active {
                    descriptor.is_active = is_active;
                }
                if let Some(last_verified) = last_verified {
                    descriptor.last_verified = Some(last_verified);
                }
                descriptor.last_updated = descriptor.last_updated.max(now);
                Ok(true)
            })
        })
        .await
    }

    // ---- blocking bodies -------------------------------------------------

    fn register_blocking(
        &self,
        descriptor: CapabilityDescriptor,
    ) -> Result<CapabilityDescriptor, CoreError> {
        let now = self.clock.now();
        self.store.update(move |doc| {
            let capabilities = doc.agents.entry(descriptor.agent_id.clone()).or_default();
            let mut stored = descriptor;
            if let Some(existing) = capabilities.get(&stored.capability_id) {
                stored.registered_at = existing.registered_at;
            }
            stored.last_updated = now;
            debug!(
                agent_id = %stored.agent_id,
                capability_id = %stored.capability_id,
                "capability registered"
            );
            capabilities.insert(stored.capability_id.clone(), stored.clone());
            Ok(stored)
        })
    }

    fn unregister_blocking(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
    ) -> Result<bool, CoreError> {
        self.store.update(|doc| {
            let Some(capabilities) = doc.agents.get_mut(agent_id) else {
                return Ok(false);
            };
            let removed = capabilities.remove(capability_id).is_some();
            if capabilities.is_empty() {
                doc.agents.remove(agent_id);
            }
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{Clock as _, FixedClock, InMemoryEventSink, NoopEventSink, SinkError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: CapabilityRegistry,
        clock: Arc<FixedClock>,
        events: Arc<InMemoryEventSink>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::new(dir.path()).with_lock_timeout(Duration::from_secs(2));
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
        ));
        let events = Arc::new(InMemoryEventSink::new());
        let registry = CapabilityRegistry::open(&config, clock.clone(), events.clone());
        Fixture {
            _dir: dir,
            registry,
            clock,
            events,
        }
    }

    fn descriptor(fx: &Fixture, agent: &str, capability: &str) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            AgentId::new(agent),
            CapabilityId::new(capability),
            "1.0.0",
            fx.clock.now(),
        )
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let fx = fixture();
        fx.registry
            .register(descriptor(&fx, "a-1", "shell.exec"))
            .await
            .unwrap();

        let found = fx
            .registry
            .get(&AgentId::new("a-1"), &CapabilityId::new("shell.exec"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.version, "1.0.0");
        assert!(found.is_active);
    }

    #[tokio::test]
    async fn re_register_preserves_registered_at() {
        let fx = fixture();
        fx.registry
            .register(descriptor(&fx, "a-1", "shell.exec"))
            .await
            .unwrap();
        let original = fx.clock.now();

        fx.clock.advance(Duration::from_secs(3600));
        let mut update = descriptor(&fx, "a-1", "shell.exec");
        update.version = "2.0.0".to_string();
        let stored = fx.registry.register(update).await.unwrap();

        assert_eq!(stored.registered_at, original);
        assert_eq!(stored.last_updated, fx.clock.now());
        assert_eq!(stored.version, "2.0.0");
    }

    #[tokio::test]
    async fn unregister_removes_only_that_entry() {
        let fx = fixture();
        fx.registry
            .register(descriptor(&fx, "a-1", "shell.exec"))
            .await
            .unwrap();
        fx.registry
            .register(descriptor(&fx, "a-1", "browser"))
            .await
            .unwrap();

        let removed = fx
            .registry
            .unregister(&AgentId::new("a-1"), &CapabilityId::new("shell.exec"))
            .await
            .unwrap();
        assert!(removed);

        let remaining = fx.registry.list_for_agent(&AgentId::new("a-1")).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].capability_id, CapabilityId::new("browser"));

        // Unregistering twice is a clean false.
        assert!(
            !fx.registry
                .unregister(&AgentId::new("a-1"), &CapabilityId::new("shell.exec"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn find_filters_by_tags_version_and_activity() {
        let fx = fixture();
        fx.registry
            .register(
                descriptor(&fx, "a-1", "shell.exec")
                    .with_tags(["posix".to_string(), "fast".to_string()]),
            )
            .await
            .unwrap();
        fx.registry
            .register(descriptor(&fx, "a-2", "shell.exec").inactive())
            .await
            .unwrap();

        let query = CapabilityQuery::for_capability(CapabilityId::new("shell.exec"));
        let found = fx.registry.find(query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].agent_id, AgentId::new("a-1"));

        let query = CapabilityQuery::for_capability(CapabilityId::new("shell.exec"))
            .with_tags(["gpu".to_string()]);
        assert!(fx.registry.find(query).await.unwrap().is_empty());

        let query =
            CapabilityQuery::for_capability(CapabilityId::new("shell.exec")).with_version("9.9.9");
        assert!(fx.registry.find(query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_agents_for_capability_respects_activity() {
        let fx = fixture();
        fx.registry
            .register(descriptor(&fx, "a-1", "shell.exec"))
            .await
            .unwrap();
        fx.registry
            .register(descriptor(&fx, "a-2", "shell.exec").inactive())
            .await
            .unwrap();

        let active = fx
            .registry
            .find_agents_for_capability(&CapabilityId::new("shell.exec"), true)
            .await
            .unwrap();
        assert_eq!(active, vec![AgentId::new("a-1")]);

        let all = fx
            .registry
            .find_agents_for_capability(&CapabilityId::new("shell.exec"), false)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn update_status_flips_activity_and_records_probe() {
        let fx = fixture();
        fx.registry
            .register(descriptor(&fx, "a-1", "shell.exec"))
            .await
            .unwrap();

        fx.clock.advance(Duration::from_secs(60));
        let verified_at = fx.clock.now();
        let updated = fx
            .registry
            .update_status(
                &AgentId::new("a-1"),
                &CapabilityId::new("shell.exec"),
                Some(false),
                Some(verified_at),
            )
            .await
            .unwrap();
        assert!(updated);

        let stored = fx
            .registry
            .get(&AgentId::new("a-1"), &CapabilityId::new("shell.exec"))
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.last_verified, Some(verified_at));

        // Unknown entries report false instead of erroring.
        assert!(
            !fx.registry
                .update_status(
                    &AgentId::new("ghost"),
                    &CapabilityId::new("shell.exec"),
                    Some(true),
                    None,
                )
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn register_and_unregister_emit_notifications() {
        let fx = fixture();
        fx.registry
            .register(descriptor(&fx, "a-1", "shell.exec"))
            .await
            .unwrap();
        fx.registry
            .unregister(&AgentId::new("a-1"), &CapabilityId::new("shell.exec"))
            .await
            .unwrap();

        assert_eq!(
            fx.events.topics(),
            vec!["capability.registered", "capability.unregistered"]
        );
        let published = fx.events.published();
        assert_eq!(published[0].1["descriptor"]["agent_id"], "a-1");
        assert_eq!(published[1].1["capability_id"], "shell.exec");
    }

    struct FailingSink;

    #[async_trait]
    impl crate::ports::EventSink for FailingSink {
        async fn publish(
            &self,
            _topic: &str,
            _payload: serde_json::Value,
        ) -> Result<(), SinkError> {
            Err(SinkError("transport down".to_string()))
        }
    }

    #[tokio::test]
    async fn notification_failure_never_blocks_the_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::new(dir.path()).with_lock_timeout(Duration::from_secs(2));
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
        ));
        let registry = CapabilityRegistry::open(&config, clock.clone(), Arc::new(FailingSink));

        let descriptor = CapabilityDescriptor::new(
            AgentId::new("a-1"),
            CapabilityId::new("shell.exec"),
            "1.0.0",
            clock.now(),
        );
        registry.register(descriptor).await.unwrap();

        // The mutation landed despite the dead transport.
        let verify = CapabilityRegistry::open(&config, clock, Arc::new(NoopEventSink));
        assert!(
            verify
                .get(&AgentId::new("a-1"), &CapabilityId::new("shell.exec"))
                .await
                .unwrap()
                .is_some()
        );
    }
}
