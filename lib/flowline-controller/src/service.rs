//! `ControllerService` (§4.D): admission, status, and the three sync-plane
//! task handlers, each following the lock-load-rebuild-mutate-step-save
//! pattern over the run mutex.

use std::sync::Arc;
use std::time::Duration;

use flowline_core::{FlowRunId, Result};
use flowline_flow::{Flow, FlowRun, FlowRunStatus, NodeDef, ObjectStoreFactory, RuntimeFlow, StepOutcome, validate};
use flowline_repository::{RunRecord, RunRepository};
use flowline_syncplane::{ActiveRuns, DistributedMutex, MutexError, NodeFailedTask, NodeFinishedTask, Task, TaskBus};
use tracing::{info, instrument, warn};

use crate::error::ControllerError;

/// Run mutex lease (§5): short enough that a crashed holder never wedges a
/// run for long, long enough to cover one load-rebuild-step-save cycle.
pub const RUN_MUTEX_TTL: Duration = Duration::from_secs(10);

/// Thin orchestration over the runtime, repository, and sync plane. Holds
/// no mutable state of its own beyond the `Arc`s it was built with; all
/// mutable run state lives in the repository, guarded by the run mutex.
pub struct ControllerService {
    repository: Arc<dyn RunRepository>,
    bus: Arc<dyn TaskBus>,
    mutex: Arc<dyn DistributedMutex>,
    active_runs: Arc<dyn ActiveRuns>,
    store_factory: Arc<dyn ObjectStoreFactory>,
}

impl ControllerService {
    #[must_use]
    pub fn new(
        repository: Arc<dyn RunRepository>,
        bus: Arc<dyn TaskBus>,
        mutex: Arc<dyn DistributedMutex>,
        active_runs: Arc<dyn ActiveRuns>,
        store_factory: Arc<dyn ObjectStoreFactory>,
    ) -> Self {
        Self { repository, bus, mutex, active_runs, store_factory }
    }

    /// Admits a flow: normalize, validate, construct a runtime, persist it
    /// WAITING, and register it with the scheduler. Returns the freshly
    /// constructed `FlowRun` for the client to poll.
    #[instrument(skip(self, flow, defs), fields(flow_name = %flow.name))]
    pub async fn run_flow(&self, mut flow: Flow, defs: Vec<NodeDef>, trace_parent: Option<String>) -> Result<FlowRun, ControllerError> {
        flow.normalize();
        let validation = validate(&flow, &defs);
        if !validation.is_ok() {
            warn!(error_count = validation.errors.len(), "flow rejected at admission");
            return Err(ControllerError::Validation { errors: validation.errors }.into());
        }

        let runtime = RuntimeFlow::construct(flow, defs, self.store_factory.as_ref())
            .await
            .map_err(|e| ControllerError::Runtime { message: e.to_string() })?;

        let run_id = runtime.run.id;
        let record = RunRecord::new(runtime.flow().clone(), defs_of(&runtime), runtime.run.clone(), trace_parent);
        self.save(run_id, &record).await?;
        self.active_runs
            .add(run_id)
            .await
            .map_err(|e| ControllerError::Bus { message: e.to_string() })?;

        info!(run_id = %run_id, "flow admitted");
        Ok(runtime.run)
    }

    /// Returns the current `FlowRun` for `run_id`. Read-only: no mutex is
    /// taken, so this may race a concurrent step, but never mutates.
    pub async fn status(&self, run_id: FlowRunId) -> Result<FlowRun, ControllerError> {
        Ok(self.load(run_id).await?.run)
    }

    /// Handles a `flow:step` task: reruns the step function for `run_id`
    /// under the run mutex and dispatches whatever it emits.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn flow_step_handler(&self, run_id: FlowRunId) -> Result<(), ControllerError> {
        self.lock(run_id).await?;
        let outcome = self.step_run(run_id, None, |_runtime| {}).await;
        self.unlock(run_id).await;
        outcome
    }

    /// Handles a `node:finished` task: marks the node complete and steps.
    #[instrument(skip(self, task), fields(run_id = %task.run_id, node_id = %task.node_id))]
    pub async fn node_finished_handler(&self, task: NodeFinishedTask) -> Result<(), ControllerError> {
        let run_id = task.run_id;
        self.lock(run_id).await?;
        let outcome = self
            .step_run(run_id, task.trace_parent.as_deref(), |runtime| {
                runtime.handle_node_finished(&task.node_id, task.logs.clone());
            })
            .await;
        self.unlock(run_id).await;
        outcome
    }

    /// Handles a `node:failed` task. `isFinalFailure` (attempt ≥
    /// max_attempts) is computed here and mirrored by
    /// `RuntimeFlow::handle_node_failed`'s own comparison, so the two never
    /// disagree on whether this is the node's last attempt.
    #[instrument(skip(self, task), fields(run_id = %task.run_id, node_id = %task.node_id, attempt = task.attempt))]
    pub async fn node_failed_handler(&self, task: NodeFailedTask) -> Result<(), ControllerError> {
        let run_id = task.run_id;
        let is_final_failure = task.attempt >= task.max_attempts;
        warn!(%is_final_failure, "node execution failed");

        self.lock(run_id).await?;
        let outcome = self
            .step_run(run_id, task.trace_parent.as_deref(), |runtime| {
                runtime.handle_node_failed(
                    &task.node_id,
                    task.logs.clone(),
                    task.error_message.clone(),
                    task.attempt,
                    task.max_attempts,
                );
            })
            .await;
        self.unlock(run_id).await;
        outcome
    }

    /// The load-rebuild-mutate-step-save body shared by all three task
    /// handlers, run while the caller holds the run mutex. `mutate` is
    /// applied to the freshly rebuilt runtime before `step()` is called.
    async fn step_run(&self, run_id: FlowRunId, trace_parent: Option<&str>, mutate: impl FnOnce(&mut RuntimeFlow)) -> Result<(), ControllerError> {
        let record = self.load(run_id).await?;
        let saved_trace_parent = record.trace_parent.clone();
        let mut runtime = RuntimeFlow::rebuild(record.flow, record.defs, record.run, self.store_factory.as_ref())
            .map_err(|e| ControllerError::Runtime { message: e.to_string() })?;

        mutate(&mut runtime);

        let outcome = runtime.step(trace_parent).await.map_err(|e| ControllerError::Runtime { message: e.to_string() })?;
        self.dispatch(outcome).await?;

        if is_terminal(runtime.run.status) {
            self.handle_flow_complete(run_id).await
        } else {
            let defs = defs_of(&runtime);
            let record = RunRecord::new(runtime.flow().clone(), defs, runtime.run, saved_trace_parent);
            self.save(run_id, &record).await
        }
    }

    async fn dispatch(&self, outcome: StepOutcome) -> Result<(), ControllerError> {
        for task in outcome.dispatched {
            self.bus
                .publish(Task::NodeExecute(Box::new(task.into())))
                .await
                .map_err(|e| ControllerError::Bus { message: e.to_string() })?;
        }
        Ok(())
    }

    /// A run reaching a terminal status is removed from durable storage
    /// and from the scheduler's active-runs set; there is nothing further
    /// for the leader's periodic dispatcher to do with it.
    async fn handle_flow_complete(&self, run_id: FlowRunId) -> Result<(), ControllerError> {
        info!(run_id = %run_id, "flow run reached a terminal state");
        self.repository.delete(run_id).await.map_err(|e| ControllerError::Repository { message: e.to_string() })?;
        self.active_runs.remove(run_id).await.map_err(|e| ControllerError::Bus { message: e.to_string() })?;
        Ok(())
    }

    async fn lock(&self, run_id: FlowRunId) -> Result<(), ControllerError> {
        self.mutex.lock(&run_id.to_string(), RUN_MUTEX_TTL).await.map_err(|e| match e {
            MutexError::Contended { .. } => ControllerError::LockContended { run_id }.into(),
            MutexError::Backend { message } => ControllerError::Bus { message }.into(),
        })
    }

    /// Releases the run mutex unconditionally; a failure to unlock is
    /// logged rather than propagated since the lease expires on its own
    /// and the caller already has the result it came for.
    async fn unlock(&self, run_id: FlowRunId) {
        if let Err(e) = self.mutex.unlock(&run_id.to_string()).await {
            warn!(run_id = %run_id, error = %e, "failed to release run mutex");
        }
    }

    async fn load(&self, run_id: FlowRunId) -> Result<RunRecord, ControllerError> {
        self.repository.load(run_id).await.map_err(|e| {
            match e {
                flowline_repository::RepositoryError::NotFound { run_id } => ControllerError::NotFound { run_id },
                other => ControllerError::Repository { message: other.to_string() },
            }
            .into()
        })
    }

    async fn save(&self, run_id: FlowRunId, record: &RunRecord) -> Result<(), ControllerError> {
        self.repository
            .save(run_id, record)
            .await
            .map_err(|e| ControllerError::Repository { message: e.to_string() }.into())
    }
}

/// A run is done once it reaches COMPLETE or ERROR; STOPPED is a paused
/// state the step function also no-ops on, but a paused run still has a
/// resumable record and stays in the repository and the active-runs set.
fn is_terminal(status: FlowRunStatus) -> bool {
    matches!(status, FlowRunStatus::Complete | FlowRunStatus::Error)
}

fn defs_of(runtime: &RuntimeFlow) -> Vec<NodeDef> {
    runtime.flow().nodes.iter().filter_map(|node| runtime.node_def(&node.uses).cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_flow::{Command, DefaultDataWell, FlagDef, InMemoryStoreFactory, Node, NodeId, PortBinding, PortDef, StoreBinding};
    use flowline_repository::memory::InMemoryRunRepository;
    use flowline_syncplane::{InMemoryActiveRuns, InMemoryMutex, InMemoryTaskBus};
    use std::collections::HashMap as Map;

    fn service() -> ControllerService {
        ControllerService::new(
            Arc::new(InMemoryRunRepository::new()),
            Arc::new(InMemoryTaskBus::new()),
            Arc::new(InMemoryMutex::new()),
            Arc::new(InMemoryActiveRuns::new()),
            Arc::new(InMemoryStoreFactory),
        )
    }

    /// A single node with no inputs, one output routed through the flow's
    /// default datawell onto a memory store.
    fn single_node_flow() -> (Flow, Vec<NodeDef>) {
        let def = NodeDef {
            publisher: "acme".to_string(),
            name: "produce".to_string(),
            image: "img:1.0".to_string(),
            inputs: Vec::new(),
            outputs: vec![PortDef { name: "out".to_string(), description: String::new(), required: true, mime_types: vec!["text/plain".to_string()] }],
            flags: Vec::<FlagDef>::new(),
            command: Command { name: "run".to_string(), description: String::new(), exec: "run".to_string() },
            tier: "c-small".to_string(),
            max_attempts: 2,
        };
        let node = Node {
            id: NodeId::new("n1"),
            uses: "acme/produce".to_string(),
            inputs: Vec::new(),
            outputs: vec![PortBinding::new("out", "e_out")],
            flags: Map::new(),
        };
        let flow = Flow {
            name: "single".to_string(),
            nodes: vec![node],
            stores: vec![StoreBinding { name: "s".to_string(), store_type: "memory".to_string(), params: serde_json::Value::Null }],
            default_data_well: Some(DefaultDataWell { store: "s".to_string() }),
            data_wells: Vec::new(),
        };
        (flow, vec![def])
    }

    fn cyclic_flow() -> (Flow, Vec<NodeDef>) {
        let def = NodeDef {
            publisher: "acme".to_string(),
            name: "pass".to_string(),
            image: "img:1.0".to_string(),
            inputs: vec![PortDef { name: "in".to_string(), description: String::new(), required: true, mime_types: vec!["text/plain".to_string()] }],
            outputs: vec![PortDef { name: "out".to_string(), description: String::new(), required: true, mime_types: vec!["text/plain".to_string()] }],
            flags: Vec::<FlagDef>::new(),
            command: Command { name: "run".to_string(), description: String::new(), exec: "run".to_string() },
            tier: "c-small".to_string(),
            max_attempts: 1,
        };
        let a = Node {
            id: NodeId::new("a"),
            uses: "acme/pass".to_string(),
            inputs: vec![PortBinding::new("in", "e_ba")],
            outputs: vec![PortBinding::new("out", "e_ab")],
            flags: Map::new(),
        };
        let b = Node {
            id: NodeId::new("b"),
            uses: "acme/pass".to_string(),
            inputs: vec![PortBinding::new("in", "e_ab")],
            outputs: vec![PortBinding::new("out", "e_ba")],
            flags: Map::new(),
        };
        let flow = Flow {
            name: "cyclic".to_string(),
            nodes: vec![a, b],
            stores: Vec::new(),
            default_data_well: None,
            data_wells: Vec::new(),
        };
        (flow, vec![def])
    }

    #[tokio::test]
    async fn run_flow_rejects_a_cycle() {
        let service = service();
        let (flow, defs) = cyclic_flow();
        let err = service.run_flow(flow, defs, None).await.unwrap_err();
        assert!(err.to_string().contains("admission validation"));
    }

    #[tokio::test]
    async fn run_flow_admits_and_registers_with_the_scheduler() {
        let service = service();
        let (flow, defs) = single_node_flow();
        let run = service.run_flow(flow, defs, None).await.unwrap();
        assert_eq!(run.status, FlowRunStatus::Waiting);

        let status = service.status(run.id).await.unwrap();
        assert_eq!(status.id, run.id);
        assert!(service.active_runs.list().await.unwrap().contains(&run.id));
    }

    #[tokio::test]
    async fn concurrent_flow_step_calls_on_the_same_run_are_serialized() {
        let service = service();
        let (flow, defs) = single_node_flow();
        let run = service.run_flow(flow, defs, None).await.unwrap();

        service.lock(run.id).await.unwrap();
        let err = service.flow_step_handler(run.id).await.unwrap_err();
        assert!(err.to_string().contains("already held"));
    }

    #[tokio::test]
    async fn stepping_to_completion_dispatches_then_cleans_up() {
        let service = service();
        let (flow, defs) = single_node_flow();
        let run = service.run_flow(flow, defs, None).await.unwrap();

        // Waiting -> Running (becomes ready, no dispatch yet).
        service.flow_step_handler(run.id).await.unwrap();
        let status = service.status(run.id).await.unwrap();
        assert_eq!(status.status, FlowRunStatus::Running);

        // Running -> Waiting, dispatches the one ready node.
        service.flow_step_handler(run.id).await.unwrap();
        let dispatched = service.bus.poll("c-small").await.unwrap();
        assert!(dispatched.is_some());

        let node_id = NodeId::new("n1");
        let finished = NodeFinishedTask { run_id: run.id, node_id, logs: vec!["done".to_string()], trace_parent: None };
        service.node_finished_handler(finished).await.unwrap();

        // The run completed and was removed from both the repository and
        // the scheduler's active-runs set.
        assert!(service.status(run.id).await.unwrap_err().to_string().contains("no run record"));
        assert!(!service.active_runs.list().await.unwrap().contains(&run.id));
    }

    #[tokio::test]
    async fn final_node_failure_errors_the_run() {
        let service = service();
        let (flow, defs) = single_node_flow();
        let run = service.run_flow(flow, defs, None).await.unwrap();

        service.flow_step_handler(run.id).await.unwrap();
        service.flow_step_handler(run.id).await.unwrap();

        let node_id = NodeId::new("n1");
        let failed = NodeFailedTask {
            run_id: run.id,
            node_id,
            attempt: 2,
            max_attempts: 2,
            error_message: "boom".to_string(),
            logs: Vec::new(),
            trace_parent: None,
        };
        service.node_failed_handler(failed).await.unwrap();

        assert!(service.status(run.id).await.unwrap_err().to_string().contains("no run record"));
    }
}
