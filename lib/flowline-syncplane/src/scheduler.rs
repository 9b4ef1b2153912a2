//! The leader's periodic dispatch loop: while leader, submit a `flow:step`
//! task for every run in the active-runs set every `SyncInterval`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::active_runs::ActiveRuns;
use crate::bus::TaskBus;
use crate::task::{FlowStepTask, Task};

/// Default interval between dispatch ticks.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Default TTL for the leader-election mutex.
pub const DEFAULT_SCHEDULER_ELECTION_INTERVAL: Duration = Duration::from_secs(30);

/// Runs the dispatch loop until `shutdown` fires. Only submits tasks while
/// `is_leader` reads true; a process that loses leadership mid-tick simply
/// skips dispatch until it regains it.
pub async fn run(
    bus: Arc<dyn TaskBus>,
    active_runs: Arc<dyn ActiveRuns>,
    sync_interval: Duration,
    mut is_leader: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(sync_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
                continue;
            }
        }

        if !*is_leader.borrow_and_update() {
            continue;
        }

        match active_runs.list().await {
            Ok(run_ids) => {
                for run_id in run_ids {
                    if let Err(e) = bus.publish(Task::FlowStep(FlowStepTask { run_id })).await {
                        tracing::warn!(%run_id, error = %e, "failed to dispatch flow:step task");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to list active runs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::active_runs::InMemoryActiveRuns;
    use crate::bus::InMemoryTaskBus;
    use flowline_core::FlowRunId;

    #[tokio::test]
    async fn leader_dispatches_a_flow_step_task_per_active_run() {
        let bus: Arc<dyn TaskBus> = Arc::new(InMemoryTaskBus::new());
        let active_runs: Arc<dyn ActiveRuns> = Arc::new(InMemoryActiveRuns::new());
        let run_id = FlowRunId::new();
        active_runs.add(run_id).await.unwrap();

        let (leader_tx, leader_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run(
            bus.clone(),
            active_runs,
            Duration::from_millis(10),
            leader_rx,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        drop(leader_tx);

        let task = bus.poll("controller").await.unwrap();
        assert!(matches!(task, Some(Task::FlowStep(t)) if t.run_id == run_id));
    }

    #[tokio::test]
    async fn non_leader_never_dispatches() {
        let bus: Arc<dyn TaskBus> = Arc::new(InMemoryTaskBus::new());
        let active_runs: Arc<dyn ActiveRuns> = Arc::new(InMemoryActiveRuns::new());
        active_runs.add(FlowRunId::new()).await.unwrap();

        let (leader_tx, leader_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run(
            bus.clone(),
            active_runs,
            Duration::from_millis(10),
            leader_rx,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        drop(leader_tx);

        assert_eq!(bus.poll("controller").await.unwrap(), None);
    }
}
