//! Periodic maintenance: the reclaim sweep and the board consistency
//! scan, each on its own timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use super::reclaimer::Reclaimer;
use crate::board::TaskBoardStore;

/// Maintenance loop handle.
/// - `request_shutdown()` でループ全体が止まる
/// - `shutdown_and_join()` で終了を待てる
pub struct MaintenanceGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl MaintenanceGroup {
    /// Spawn the reclaim and reconcile loops.
    pub fn spawn(
        reclaimer: Reclaimer,
        boards: TaskBoardStore,
        reclaim_interval: Duration,
        scan_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reclaimer = Arc::new(reclaimer);

        let mut joins = Vec::with_capacity(2);

        {
            let reclaimer = Arc::clone(&reclaimer);
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(reclaim_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    if *rx.borrow() {
                        break;
                    }
                    tokio::select! {
                        _ = rx.changed() => continue,
                        _ = ticker.tick() => {
                            if let Err(err) = reclaimer.sweep().await {
                                warn!(error = %err, "reclaim sweep failed");
                            }
                        }
                    }
                }
            }));
        }

        {
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(scan_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    if *rx.borrow() {
                        break;
                    }
                    tokio::select! {
                        _ = rx.changed() => continue,
                        _ = ticker.tick() => {
                            if let Err(err) = boards.reconcile().await {
                                warn!(error = %err, "consistency scan failed");
                            }
                        }
                    }
                }
            }));
        }

        Self { shutdown_tx, joins }
    }

    /// Request shutdown. In-flight sweeps finish; no new ticks start.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for both loops.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::domain::{AgentId, TaskId, TaskRecord, TaskStatus};
    use crate::ports::{Clock, NoopEventSink, SystemClock};
    use crate::registry::HeartbeatRegistry;

    #[tokio::test]
    async fn group_shuts_down_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::new(dir.path()).with_lock_timeout(Duration::from_secs(2));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let boards = TaskBoardStore::open(&config, clock.clone(), Arc::new(NoopEventSink));
        let heartbeats = HeartbeatRegistry::open(&config, clock.clone());
        let reclaimer = Reclaimer::new(boards.clone(), heartbeats, Duration::from_secs(60));

        let group = MaintenanceGroup::spawn(
            reclaimer,
            boards,
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        tokio::time::sleep(Duration::from_millis(120)).await;
        group.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn reclaim_loop_releases_expired_claims() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::new(dir.path()).with_lock_timeout(Duration::from_secs(2));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let boards = TaskBoardStore::open(&config, clock.clone(), Arc::new(NoopEventSink));
        let heartbeats = HeartbeatRegistry::open(&config, clock.clone());

        boards
            .enqueue(TaskRecord::new(TaskId::new("T1"), "work", clock.now()))
            .await
            .unwrap();
        boards
            .claim(&TaskId::new("T1"), &AgentId::new("A1"))
            .await
            .unwrap();
        heartbeats.record(&AgentId::new("A1")).await.unwrap();

        // TTL far shorter than the sleep below, so the loop must fire and
        // reclaim while we wait.
        let reclaimer = Reclaimer::new(boards.clone(), heartbeats, Duration::from_millis(10));
        let group = MaintenanceGroup::spawn(
            reclaimer,
            boards.clone(),
            Duration::from_millis(40),
            Duration::from_secs(3600),
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        group.shutdown_and_join().await;

        let ready = boards
            .list(crate::board::Board::Ready, None)
            .await
            .unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].status, TaskStatus::Pending);
    }
}
