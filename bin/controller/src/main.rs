//! Controller process entry point: leader election, the active-run
//! dispatcher, and the controller task queue's three handlers
//! (`flow:step`, `node:finished`, `node:failed`).

mod config;

use std::sync::Arc;

use flowline_controller::ControllerService;
use flowline_flow::InMemoryStoreFactory;
use flowline_repository::RunRepository;
use flowline_repository::memory::InMemoryRunRepository;
use flowline_repository::postgres::PostgresRunRepository;
use flowline_syncplane::{ActiveRuns, CONTROLLER_QUEUE, DistributedMutex, NatsActiveRuns, NatsMutex, NatsTaskBus, Task, TaskBus};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const MUTEX_BUCKET: &str = "flowline-run-locks";
const ACTIVE_RUNS_BUCKET: &str = "flowline-active-runs";

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::ControllerConfig::from_env().expect("failed to load controller configuration");

    tracing::info!(nats_url = %config.nats_url, "connecting to NATS");
    let client = async_nats::connect(&config.nats_url).await.expect("failed to connect to NATS");
    let jetstream = async_nats::jetstream::new(client);

    let mutex: Arc<dyn DistributedMutex> =
        Arc::new(NatsMutex::new(&jetstream, MUTEX_BUCKET).await.expect("failed to open run mutex bucket"));
    let active_runs: Arc<dyn ActiveRuns> = Arc::new(
        NatsActiveRuns::new(&jetstream, ACTIVE_RUNS_BUCKET)
            .await
            .expect("failed to open active-runs bucket"),
    );
    let bus: Arc<dyn TaskBus> = Arc::new(NatsTaskBus::new(jetstream).await.expect("failed to open task bus stream"));

    let repository: Arc<dyn RunRepository> = match &config.database_url {
        Some(url) => {
            tracing::info!("connecting to Postgres run repository");
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await.expect("failed to connect to Postgres");
            sqlx::migrate!("../../lib/flowline-repository/migrations").run(&pool).await.expect("failed to run repository migrations");
            Arc::new(PostgresRunRepository::new(pool))
        }
        None => {
            tracing::warn!("no database_url configured; runs will not survive a restart");
            Arc::new(InMemoryRunRepository::new())
        }
    };

    let service = Arc::new(ControllerService::new(
        repository,
        bus.clone(),
        mutex.clone(),
        active_runs.clone(),
        Arc::new(InMemoryStoreFactory),
    ));

    let (leader_tx, leader_rx) = watch::channel(false);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let leader_task = tokio::spawn(flowline_syncplane::leader::run(mutex, config.election_interval(), leader_tx, shutdown_rx.clone()));
    let scheduler_task = tokio::spawn(flowline_syncplane::scheduler::run(
        bus.clone(),
        active_runs,
        config.sync_interval(),
        leader_rx,
        shutdown_rx.clone(),
    ));

    tracing::info!("controller task loop started");
    let poll_loop = tokio::spawn(run_task_loop(service, bus, config.poll_interval(), shutdown_rx));

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(leader_task, scheduler_task, poll_loop);
}

/// Polls the controller queue until `shutdown` fires, dispatching each task
/// to the matching `ControllerService` handler. Handler errors are logged
/// and the loop continues: a `LockContended` task will be retried on the
/// next `flow:step` the scheduler dispatches, and a `NotFound` task means
/// the run already finished elsewhere.
async fn run_task_loop(service: Arc<ControllerService>, bus: Arc<dyn TaskBus>, poll_interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        let task = match bus.poll(CONTROLLER_QUEUE).await {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll controller queue");
                None
            }
        };

        let Some(task) = task else {
            tokio::select! {
                () = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.changed() => {}
            }
            continue;
        };

        let result = match task {
            Task::FlowStep(t) => service.flow_step_handler(t.run_id).await,
            Task::NodeFinished(t) => service.node_finished_handler(t).await,
            Task::NodeFailed(t) => service.node_failed_handler(t).await,
            Task::NodeExecute(_) => {
                tracing::warn!("node:execute task observed on the controller queue; dropping it");
                continue;
            }
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "controller task handler failed");
        }
    }
}
