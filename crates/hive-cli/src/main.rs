//! End-to-end demo: two workers sharing one file-backed coordination
//! root, with heartbeats and the maintenance loops running alongside.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hive_core::app::{MaintenanceGroup, Reclaimer, Scheduler, counts_by_status};
use hive_core::board::TaskBoardStore;
use hive_core::config::CoreConfig;
use hive_core::domain::{
    AgentId, CapabilityDescriptor, CapabilityId, CompletionOutcome, Priority, TaskId, TaskRecord,
};
use hive_core::ports::{Clock, EventSink, NoopEventSink, SystemClock};
use hive_core::registry::{CapabilityRegistry, HeartbeatRegistry};

/// worker: claim -> pretend to work -> complete, heartbeating as it goes.
async fn worker_loop(agent_id: AgentId, scheduler: Arc<Scheduler>, stores: Stores) {
    loop {
        stores
            .heartbeats
            .record(&agent_id)
            .await
            .expect("heartbeat");

        match scheduler.claim(&agent_id, None).await.expect("claim sweep") {
            Some(task) => {
                info!(agent = %agent_id, task = %task.task_id, "working");
                sleep(Duration::from_millis(150)).await;
                stores
                    .boards
                    .move_to_completed(
                        &task.task_id,
                        CompletionOutcome::success(Some(serde_json::json!({
                            "worker": agent_id.as_str(),
                        }))),
                    )
                    .await
                    .expect("complete");
            }
            None => {
                // Nothing eligible this sweep; either all done or gated.
                let counts = counts_by_status(&stores.boards).await.expect("counts");
                if counts.pending == 0 && counts.working == 0 && counts.blocked == 0 {
                    break;
                }
                sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

#[derive(Clone)]
struct Stores {
    boards: TaskBoardStore,
    heartbeats: HeartbeatRegistry,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) one coordination root shared by everything below
    let data_root = std::env::temp_dir().join(format!("hive-demo-{}", std::process::id()));
    let config = CoreConfig::new(&data_root)
        .with_heartbeat_ttl(Duration::from_secs(2))
        .with_reclaim_interval(Duration::from_millis(500))
        .with_scan_interval(Duration::from_secs(1));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events: Arc<dyn EventSink> = Arc::new(NoopEventSink);
    let boards = TaskBoardStore::open(&config, clock.clone(), events.clone());
    let capabilities = CapabilityRegistry::open(&config, clock.clone(), events.clone());
    let heartbeats = HeartbeatRegistry::open(&config, clock.clone());
    let stores = Stores {
        boards: boards.clone(),
        heartbeats: heartbeats.clone(),
    };

    // (B) both agents advertise the capability the tasks below need
    for agent in ["agent-1", "agent-2"] {
        capabilities
            .register(CapabilityDescriptor::new(
                AgentId::new(agent),
                CapabilityId::new("shell.exec"),
                "1.0.0",
                clock.now(),
            ))
            .await
            .expect("register capability");
    }

    // (C) a small batch: one urgent, one background, one dependent
    boards
        .enqueue(
            TaskRecord::new(TaskId::new("build"), "compile the project", clock.now())
                .with_priority(Priority::High)
                .with_required_capabilities([CapabilityId::new("shell.exec")]),
        )
        .await
        .expect("enqueue");
    boards
        .enqueue(
            TaskRecord::new(TaskId::new("lint"), "style sweep", clock.now())
                .with_priority(Priority::Background),
        )
        .await
        .expect("enqueue");
    boards
        .enqueue(
            TaskRecord::new(TaskId::new("test"), "run the test suite", clock.now())
                .with_priority(Priority::High)
                .with_dependencies([TaskId::new("build")]),
        )
        .await
        .expect("enqueue");

    // (D) maintenance loops: reclaim + consistency scan
    let reclaimer = Reclaimer::new(boards.clone(), heartbeats.clone(), config.heartbeat_ttl);
    let maintenance = MaintenanceGroup::spawn(
        reclaimer,
        boards.clone(),
        config.reclaim_interval,
        config.scan_interval,
    );

    // (E) two workers race over the same boards
    let scheduler = Arc::new(Scheduler::new(
        boards.clone(),
        capabilities.clone(),
        heartbeats.clone(),
    ));
    let workers: Vec<_> = ["agent-1", "agent-2"]
        .into_iter()
        .map(|agent| {
            tokio::spawn(worker_loop(
                AgentId::new(agent),
                Arc::clone(&scheduler),
                stores.clone(),
            ))
        })
        .collect();
    for worker in workers {
        worker.await.expect("worker");
    }

    maintenance.shutdown_and_join().await;

    let counts = counts_by_status(&boards).await.expect("counts");
    info!(?counts, root = %data_root.display(), "all tasks drained");
}
