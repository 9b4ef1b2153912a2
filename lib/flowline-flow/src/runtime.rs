//! The materialized, steppable `RuntimeFlow` — flow + bound node defs +
//! constructed stores + the dynamic `FlowRun` — and its step function
//! (§4.A), the heart of the engine.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::artifact::{Artifact, WaitingUrl};
use crate::error::RuntimeError;
use crate::flow::Flow;
use crate::node::{Node, NodeDef, NodeId, find_def};
use crate::state::{FlowRun, FlowRunStatus, NodeRunStatus, NodeState};
use crate::store::{ObjectStore, ObjectStoreFactory};
use crate::well::DataWellSource;
use flowline_core::FlowRunId;

const UPLOAD_WAITING_URL_TTL: Duration = Duration::from_secs(3600);
const OUTPUT_WAITING_URL_TTL: Duration = Duration::from_secs(15 * 60);
const INPUT_GET_URL_TTL: Duration = Duration::from_secs(3600);

/// A `node:execute` task emitted by the step function for the caller (the
/// controller, wired to the sync plane) to dispatch onto the queue named
/// by `node_def.tier`.
#[derive(Debug, Clone)]
pub struct NodeExecuteTask {
    pub run_id: FlowRunId,
    pub node_id: NodeId,
    pub node: Node,
    pub node_def: NodeDef,
    pub input_urls: HashMap<String, String>,
    pub output_urls: HashMap<String, String>,
    pub max_attempts: u32,
    pub attempt: u32,
    pub trace_parent: Option<String>,
}

/// The outcome of a single `step()` invocation: the tasks newly dispatched
/// this step, for the caller to publish onto the sync plane.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub dispatched: Vec<NodeExecuteTask>,
}

/// A `Flow` bound to its `NodeDef`s, constructed stores, and dynamic
/// `FlowRun` state.
pub struct RuntimeFlow {
    flow: Flow,
    defs: HashMap<String, NodeDef>,
    stores: HashMap<String, Box<dyn ObjectStore>>,
    pub run: FlowRun,
}

impl RuntimeFlow {
    /// Materializes a brand new runtime: binds node defs, constructs
    /// stores, seeds IDLE node state, and generates WaitingURLs for every
    /// `upload`-sourced datawell.
    pub async fn construct(
        mut flow: Flow,
        defs: Vec<NodeDef>,
        factory: &dyn ObjectStoreFactory,
    ) -> Result<Self, RuntimeError> {
        flow.normalize();
        bind_all(&flow, &defs)?;

        let defs_by_ref: HashMap<String, NodeDef> = defs.into_iter().map(|d| (d.reference(), d)).collect();
        let stores = build_stores(&flow, factory)?;

        let mut run = FlowRun::new(FlowRunId::new());
        for node in &flow.nodes {
            let def = &defs_by_ref[&node.uses];
            run.node_states.insert(node.id.clone(), NodeState::idle(def.max_attempts));
        }

        let mut runtime = Self { flow, defs: defs_by_ref, stores, run };
        runtime.seed_upload_waiting_urls().await?;
        runtime.run.status = FlowRunStatus::Waiting;
        Ok(runtime)
    }

    /// Rebuilds the non-persisted fields (stores, bound defs) from a
    /// previously-saved `(Flow, NodeDefs, FlowRun)` tuple. Runs on every
    /// load from the repository, before stepping.
    pub fn rebuild(
        mut flow: Flow,
        defs: Vec<NodeDef>,
        run: FlowRun,
        factory: &dyn ObjectStoreFactory,
    ) -> Result<Self, RuntimeError> {
        flow.normalize();
        bind_all(&flow, &defs)?;
        let defs_by_ref = defs.into_iter().map(|d| (d.reference(), d)).collect();
        let stores = build_stores(&flow, factory)?;
        Ok(Self { flow, defs: defs_by_ref, stores, run })
    }

    #[must_use]
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    #[must_use]
    pub fn node_def(&self, reference: &str) -> Option<&NodeDef> {
        self.defs.get(reference)
    }

    async fn seed_upload_waiting_urls(&mut self) -> Result<(), RuntimeError> {
        for well in self.flow.data_wells.clone() {
            if well.source != Some(DataWellSource::Upload) {
                continue;
            }
            let store = self.store(&well.store)?;
            let object_name = well.object_name(&self.run.id);
            let put_url = store
                .put_url(&object_name, UPLOAD_WAITING_URL_TTL)
                .await
                .map_err(|e| RuntimeError::StoreFailure { store: well.store.clone(), message: e.to_string() })?;
            self.run.waiting_urls.push(WaitingUrl::new(
                Artifact::new(well.edge.clone(), well.store.clone(), object_name),
                put_url,
                UPLOAD_WAITING_URL_TTL.as_secs(),
            ));
        }
        Ok(())
    }

    fn store(&self, name: &str) -> Result<&dyn ObjectStore, RuntimeError> {
        self.stores
            .get(name)
            .map(|boxed| boxed.as_ref())
            .ok_or_else(|| RuntimeError::StoreNotFound { store: name.to_string() })
    }

    /// Advances the run until no further progress is possible in this
    /// invocation (§4.A).
    #[instrument(skip(self, trace_parent), fields(run_id = %self.run.id))]
    pub async fn step(&mut self, trace_parent: Option<&str>) -> Result<StepOutcome, RuntimeError> {
        if self.run.all_nodes_complete() {
            self.run.status = FlowRunStatus::Complete;
            return Ok(StepOutcome::default());
        }

        match self.run.status {
            FlowRunStatus::Stopped | FlowRunStatus::Complete | FlowRunStatus::Error => Ok(StepOutcome::default()),
            FlowRunStatus::Waiting => {
                self.update_waiting().await?;
                if self.update_readiness() {
                    self.run.status = FlowRunStatus::Running;
                }
                Ok(StepOutcome::default())
            }
            FlowRunStatus::Running => {
                let dispatched = self.dispatch_ready_nodes(trace_parent).await?;
                self.run.status = FlowRunStatus::Waiting;
                Ok(StepOutcome { dispatched })
            }
        }
    }

    /// Probes every WaitingURL's store for object existence; on hit, moves
    /// the Artifact into `Artifacts` and drops the WaitingURL.
    async fn update_waiting(&mut self) -> Result<(), RuntimeError> {
        let mut still_waiting = Vec::with_capacity(self.run.waiting_urls.len());
        for waiting_url in std::mem::take(&mut self.run.waiting_urls) {
            let store = self.store(&waiting_url.artifact.store)?;
            if store.exists(&waiting_url.artifact.object_name).await {
                debug!(edge = %waiting_url.artifact.edge, "artifact materialized");
                self.run.artifacts.insert(waiting_url.artifact.edge.clone(), waiting_url.artifact.clone());
            } else {
                still_waiting.push(waiting_url);
            }
        }
        self.run.waiting_urls = still_waiting;
        Ok(())
    }

    /// For each IDLE node, promotes to READY iff every input edge is
    /// present in `Artifacts`. Returns whether any node became READY.
    fn update_readiness(&mut self) -> bool {
        let mut idle_ids: Vec<NodeId> = self
            .run
            .node_states
            .iter()
            .filter(|(_, state)| state.status == NodeRunStatus::Idle)
            .map(|(id, _)| id.clone())
            .collect();
        idle_ids.sort();

        let mut newly_ready = Vec::new();
        for id in idle_ids {
            let node = self.flow.node(id.as_str()).expect("node state without matching node");
            if node.inputs.iter().all(|binding| self.run.artifacts.contains_key(&binding.edge)) {
                newly_ready.push(id);
            }
        }

        let any_ready = !newly_ready.is_empty();
        for id in newly_ready {
            self.run.node_states.get_mut(&id).unwrap().status = NodeRunStatus::Ready;
        }
        any_ready
    }

    async fn dispatch_ready_nodes(&mut self, trace_parent: Option<&str>) -> Result<Vec<NodeExecuteTask>, RuntimeError> {
        let mut ready_ids: Vec<NodeId> = self
            .run
            .node_states
            .iter()
            .filter(|(_, state)| state.status == NodeRunStatus::Ready)
            .map(|(id, _)| id.clone())
            .collect();
        ready_ids.sort();

        let mut dispatched = Vec::with_capacity(ready_ids.len());
        for node_id in ready_ids {
            let task = self.execute_node(&node_id, trace_parent).await?;
            self.run.node_states.get_mut(&node_id).unwrap().status = NodeRunStatus::Running;
            dispatched.push(task);
        }
        Ok(dispatched)
    }

    /// Allocates output artifacts, generates presigned URLs for outputs
    /// (15m TTL) and inputs (1h TTL), and builds the dispatched task.
    async fn execute_node(&mut self, node_id: &NodeId, trace_parent: Option<&str>) -> Result<NodeExecuteTask, RuntimeError> {
        let node = self.flow.node(node_id.as_str()).expect("ready node must exist").clone();
        let def = self.defs.get(&node.uses).expect("bound at construction").clone();
        let max_attempts = def.max_attempts;
        let attempt = self.run.node_states[node_id].retry_count + 1;

        let mut input_urls = HashMap::new();
        for binding in &node.inputs {
            let artifact = self
                .run
                .artifacts
                .get(&binding.edge)
                .expect("readiness check guarantees artifact present")
                .clone();
            let store = self.store(&artifact.store)?;
            let url = store
                .get_url(&artifact.object_name, INPUT_GET_URL_TTL)
                .await
                .map_err(|e| RuntimeError::StoreFailure { store: artifact.store.clone(), message: e.to_string() })?;
            input_urls.insert(binding.name.clone(), url);
        }

        let mut output_urls = HashMap::new();
        for binding in &node.outputs {
            let (store_name, object_name) = self.allocate_output_location(&binding.edge)?;
            let store = self.store(&store_name)?;
            let url = store
                .put_url(&object_name, OUTPUT_WAITING_URL_TTL)
                .await
                .map_err(|e| RuntimeError::StoreFailure { store: store_name.clone(), message: e.to_string() })?;
            self.run.waiting_urls.push(WaitingUrl::new(
                Artifact::new(binding.edge.clone(), store_name.clone(), object_name.clone()),
                url.clone(),
                OUTPUT_WAITING_URL_TTL.as_secs(),
            ));
            output_urls.insert(binding.name.clone(), url);
        }

        Ok(NodeExecuteTask {
            run_id: self.run.id,
            node_id: node_id.clone(),
            node,
            node_def: def,
            input_urls,
            output_urls,
            max_attempts,
            attempt,
            trace_parent: trace_parent.map(str::to_string),
        })
    }

    /// §4.A output artifact allocation: a DataWell binding wins; otherwise
    /// falls back to the flow's DefaultDataWell.
    fn allocate_output_location(&self, edge: &str) -> Result<(String, String), RuntimeError> {
        if let Some(well) = self.flow.data_wells.iter().find(|w| w.edge == edge) {
            return Ok((well.store.clone(), well.object_name(&self.run.id)));
        }
        let default_well = self
            .flow
            .default_data_well
            .as_ref()
            .ok_or_else(|| RuntimeError::NoDefaultStore { edge: edge.to_string() })?;
        Ok((default_well.store.clone(), format!("{edge}-{}", self.run.id)))
    }

    /// Appends logs and marks the node complete. The artifact itself
    /// arrives via the next `update_waiting` probe, not by trusting the
    /// worker's claim.
    pub fn handle_node_finished(&mut self, node_id: &NodeId, logs: Vec<String>) {
        if let Some(state) = self.run.node_states.get_mut(node_id) {
            state.logs.extend(logs);
            state.status = NodeRunStatus::Complete;
        }
    }

    /// Appends logs; on final failure marks the node and run errored,
    /// otherwise marks it retrying for the sync plane to re-enqueue.
    pub fn handle_node_failed(
        &mut self,
        node_id: &NodeId,
        logs: Vec<String>,
        error_message: String,
        attempt: u32,
        max_attempts: u32,
    ) {
        let Some(state) = self.run.node_states.get_mut(node_id) else { return };
        state.logs.extend(logs);
        state.last_error = Some(error_message);
        state.retry_count = attempt;
        if attempt >= max_attempts {
            state.status = NodeRunStatus::Error;
            self.run.status = FlowRunStatus::Error;
        } else {
            state.status = NodeRunStatus::Retrying;
        }
    }
}

fn bind_all(flow: &Flow, defs: &[NodeDef]) -> Result<(), RuntimeError> {
    for node in &flow.nodes {
        if find_def(defs, &node.uses).is_none() {
            return Err(RuntimeError::DefNotFound { node_id: node.id.clone(), reference: node.uses.clone() });
        }
    }
    Ok(())
}

fn build_stores(
    flow: &Flow,
    factory: &dyn ObjectStoreFactory,
) -> Result<HashMap<String, Box<dyn ObjectStore>>, RuntimeError> {
    let mut stores = HashMap::new();
    for binding in &flow.stores {
        let store = match factory.build(binding) {
            Some(Ok(store)) => store,
            Some(Err(message)) => {
                return Err(RuntimeError::StoreConstruction { store: binding.name.clone(), message });
            }
            None => {
                return Err(RuntimeError::StoreConstruction {
                    store: binding.name.clone(),
                    message: format!("no factory registered for store type {:?}", binding.store_type),
                });
            }
        };
        stores.insert(binding.name.clone(), store);
    }
    Ok(stores)
}
