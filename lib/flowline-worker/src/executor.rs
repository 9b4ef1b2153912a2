//! The `node:execute` handler (§4.E): resolves I/O, expands the command,
//! runs the node's image in a container under its tier's resource limits,
//! and reports the outcome back onto the sync plane.

use std::sync::Arc;

use bollard::Docker;
use flowline_resources::{ResourceManager, STANDARD_TIER_MAP, TierRequirement};
use flowline_syncplane::{NodeExecuteTask, NodeFailedTask, NodeFinishedTask, QueueSubscription, Task, TaskBus};
use tracing::{error, info, instrument};

use crate::command;
use crate::container;
use crate::error::WorkerError;
use crate::io;

/// Advertises this worker's currently-valid tier set to the sync plane.
/// Called once at startup; a worker's valid-tier set is a function of its
/// static capacity ceiling, so it never changes over the worker's lifetime
/// (see `ResourceManager::valid_tier_map`).
pub fn advertise_resources(resources: &ResourceManager, subscription: &QueueSubscription) {
    let tiers = resources.valid_tier_map();
    info!(tier_count = tiers.len(), "advertising resource tiers");
    subscription.update(tiers);
}

/// Executes one `node:execute` task end to end and publishes its outcome
/// (`node:finished` or `node:failed`) onto the bus. Tier capacity is
/// reserved before execution and released on every path, including a
/// pipeline failure.
///
/// # Errors
///
/// Returns an error only if publishing the outcome itself fails; execution
/// failures are translated into a `node:failed` task instead of propagated.
#[instrument(skip(docker, resources, subscription, bus, task), fields(run_id = %task.run_id, node_id = %task.node_id, attempt = task.attempt))]
pub async fn execute(
    docker: &Docker,
    resources: &ResourceManager,
    subscription: &QueueSubscription,
    bus: Arc<dyn TaskBus>,
    task: NodeExecuteTask,
) -> Result<(), WorkerError> {
    resources
        .reserve(&task.node_def.tier)
        .map_err(|e| WorkerError::ResourceReservationFailed { message: e.to_string() })?;
    advertise_resources(resources, subscription);

    let outcome = run_pipeline(docker, &task).await;
    resources.release(&task.node_def.tier);
    advertise_resources(resources, subscription);

    let result_task = match outcome {
        Ok(logs) => {
            info!("node execution succeeded");
            Task::NodeFinished(NodeFinishedTask {
                run_id: task.run_id,
                node_id: task.node_id,
                logs,
                trace_parent: task.trace_parent,
            })
        }
        Err((err, logs)) => {
            error!(error = %err, "node execution failed");
            Task::NodeFailed(NodeFailedTask {
                run_id: task.run_id,
                node_id: task.node_id,
                attempt: task.attempt,
                max_attempts: task.max_attempts,
                error_message: err.to_string(),
                logs,
                trace_parent: task.trace_parent,
            })
        }
    };

    bus.publish(result_task)
        .await
        .map_err(|e| WorkerError::ContainerFailed { message: format!("failed to publish execution outcome: {e}") })
}

/// Runs the container pipeline (§4.E a-i): prepare I/O, expand the
/// command, ensure the image, create the container, stage inputs, run it,
/// collect logs, upload outputs, and always tear the container down.
async fn run_pipeline(docker: &Docker, task: &NodeExecuteTask) -> Result<Vec<String>, (WorkerError, Vec<String>)> {
    let inputs = io::prepare_inputs(&task.node_def, &task.node, &task.input_urls)
        .await
        .map_err(|e| (e, Vec::new()))?;
    let outputs = io::prepare_outputs(&task.node_def);

    io::fetch_inputs(&inputs, &task.input_urls).await.map_err(|e| (e, Vec::new()))?;

    let env = command::build_env(&task.node.flags, &inputs, &outputs);
    let argv = command::expand(&task.node_def.command.exec, &env).map_err(|e| (e, Vec::new()))?;

    container::ensure_image(docker, &task.node_def.image).await.map_err(|e| (e, Vec::new()))?;

    let requirement = tier_requirement(&task.node_def.tier);
    let container_id = container::create(docker, &task.node_def.image, &argv, &requirement)
        .await
        .map_err(|e| (e, Vec::new()))?;

    let result = run_inside_container(docker, &container_id, &inputs, &outputs, &task.output_urls).await;
    container::remove(docker, &container_id).await;
    result
}

async fn run_inside_container(
    docker: &Docker,
    container_id: &str,
    inputs: &[io::ResolvedPath],
    outputs: &[io::ResolvedPath],
    output_urls: &std::collections::HashMap<String, String>,
) -> Result<Vec<String>, (WorkerError, Vec<String>)> {
    if let Err(e) = container::stage_inputs(docker, container_id, inputs).await {
        return Err((e, Vec::new()));
    }

    let exit_code = match container::start_and_wait(docker, container_id).await {
        Ok(code) => code,
        Err(e) => return Err((e, Vec::new())),
    };

    let logs = container::collect_logs(docker, container_id).await;

    if exit_code != 0 {
        return Err((WorkerError::NonZeroExit { exit_code }, logs));
    }

    if let Err(e) = container::upload_outputs(docker, container_id, outputs, output_urls).await {
        return Err((e, logs));
    }

    Ok(logs)
}

/// Looks up `tier`'s resource requirement, falling back to the default
/// tier's requirement if the catalog lookup somehow misses — admission
/// validation (rule 6) already rejects flows with an unknown tier, so this
/// only guards against a def persisted before the catalog changed.
fn tier_requirement(tier: &str) -> TierRequirement {
    STANDARD_TIER_MAP
        .get(tier)
        .copied()
        .unwrap_or_else(|| *STANDARD_TIER_MAP.get(flowline_resources::DEFAULT_TIER).expect("default tier is always in the catalog"))
}
