//! Worker process entry point: advertises this host's resource tiers,
//! then polls its subscribed queues in priority order and runs each
//! `node:execute` task it pulls off through the container pipeline.

mod config;

use std::sync::Arc;

use bollard::Docker;
use flowline_resources::ResourceManager;
use flowline_syncplane::{NatsTaskBus, QueueSubscription, Task, TaskBus};
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::WorkerConfig::from_env().expect("failed to load worker configuration");

    tracing::info!(nats_url = %config.nats_url, "connecting to NATS");
    let client = async_nats::connect(&config.nats_url).await.expect("failed to connect to NATS");
    let jetstream = async_nats::jetstream::new(client);
    let bus: Arc<dyn TaskBus> = Arc::new(NatsTaskBus::new(jetstream).await.expect("failed to open task bus stream"));

    let docker = Docker::connect_with_local_defaults().expect("failed to connect to the local container runtime");

    let resources = Arc::new(ResourceManager::new(config.resource_manager_config()).expect("failed to size resource manager from host/config"));
    let subscription = Arc::new(QueueSubscription::new());
    flowline_worker::advertise_resources(&resources, &subscription);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_loop = tokio::spawn(run_task_loop(docker, resources, subscription, bus, config.poll_interval(), shutdown_rx));

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutdown requested; waiting for in-flight executions to finish");
    let _ = shutdown_tx.send(true);

    let _ = poll_loop.await;
}

/// Sweeps the subscribed queues in ascending priority order until `shutdown`
/// fires. A sweep that finds nothing across every queue sleeps for
/// `poll_interval` before trying again, mirroring the controller's
/// queue-poll loop.
async fn run_task_loop(
    docker: Docker,
    resources: Arc<ResourceManager>,
    subscription: Arc<QueueSubscription>,
    bus: Arc<dyn TaskBus>,
    poll_interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        let mut found_any = false;
        for queue in subscription.ordered_queues() {
            if *shutdown.borrow() {
                return;
            }

            let task = match bus.poll(&queue).await {
                Ok(task) => task,
                Err(e) => {
                    tracing::warn!(error = %e, %queue, "failed to poll worker queue");
                    None
                }
            };

            let Some(Task::NodeExecute(task)) = task else {
                if task.is_some() {
                    tracing::warn!(%queue, "non-execute task observed on a tier queue; dropping it");
                }
                continue;
            };

            found_any = true;
            if let Err(e) = flowline_worker::execute(&docker, &resources, &subscription, bus.clone(), *task).await {
                tracing::warn!(error = %e, "failed to publish node execution outcome");
            }
        }

        if !found_any {
            tokio::select! {
                () = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }
}
