//! The four task kinds the sync plane carries between the controller and
//! its workers, each wrapped in a [`flowline_core::Envelope`] before it
//! crosses a queue.

use std::collections::HashMap;

use flowline_core::FlowRunId;
use flowline_flow::{Node, NodeDef, NodeId};
use serde::{Deserialize, Serialize};

/// Re-run the step function for a run. Dispatched to the controller queue
/// by the leader's periodic dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStepTask {
    pub run_id: FlowRunId,
}

/// Execute one node. Dispatched to the queue named by the node def's tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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

impl From<flowline_flow::NodeExecuteTask> for NodeExecuteTask {
    fn from(task: flowline_flow::NodeExecuteTask) -> Self {
        Self {
            run_id: task.run_id,
            node_id: task.node_id,
            node: task.node,
            node_def: task.node_def,
            input_urls: task.input_urls,
            output_urls: task.output_urls,
            max_attempts: task.max_attempts,
            attempt: task.attempt,
            trace_parent: task.trace_parent,
        }
    }
}

/// A node finished successfully. Dispatched to the controller queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFinishedTask {
    pub run_id: FlowRunId,
    pub node_id: NodeId,
    pub logs: Vec<String>,
    pub trace_parent: Option<String>,
}

/// A node execution attempt failed. `attempt` has already been incremented
/// by the sync plane before this is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailedTask {
    pub run_id: FlowRunId,
    pub node_id: NodeId,
    pub attempt: u32,
    pub max_attempts: u32,
    pub error_message: String,
    pub logs: Vec<String>,
    pub trace_parent: Option<String>,
}

/// The typed union of task payloads the bus carries. Tagged so a consumer
/// that subscribes to a mixed queue can dispatch on `kind` before decoding
/// the rest of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    FlowStep(FlowStepTask),
    NodeExecute(Box<NodeExecuteTask>),
    NodeFinished(NodeFinishedTask),
    NodeFailed(NodeFailedTask),
}

impl Task {
    /// The queue a task is routed to: a node-def tier for `NodeExecute`,
    /// the fixed controller queue for everything else.
    #[must_use]
    pub fn queue(&self) -> String {
        match self {
            Self::NodeExecute(task) => task.node_def.tier.clone(),
            Self::FlowStep(_) | Self::NodeFinished(_) | Self::NodeFailed(_) => CONTROLLER_QUEUE.to_string(),
        }
    }

    /// The run this task concerns, used to route it past the run mutex.
    #[must_use]
    pub fn run_id(&self) -> FlowRunId {
        match self {
            Self::FlowStep(t) => t.run_id,
            Self::NodeExecute(t) => t.run_id,
            Self::NodeFinished(t) => t.run_id,
            Self::NodeFailed(t) => t.run_id,
        }
    }
}

/// The fixed queue name the controller's own tasks (`flow:step`,
/// `node:finished`, `node:failed`) are dispatched to.
pub const CONTROLLER_QUEUE: &str = "controller";

/// Priority every worker subscribes to regardless of its valid tier set
/// (§4.F's always-valid `worker` fallback entry).
pub const WORKER_QUEUE_PRIORITY: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_flow::node::DEFAULT_MAX_ATTEMPTS;
    use std::collections::HashMap as Map;

    fn node_def(tier: &str) -> NodeDef {
        NodeDef {
            publisher: "pub".into(),
            name: "name".into(),
            image: "img:latest".into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            flags: Vec::new(),
            command: flowline_flow::Command {
                name: "run".into(),
                description: String::new(),
                exec: "run".into(),
            },
            tier: tier.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[test]
    fn flow_step_routes_to_controller_queue() {
        let task = Task::FlowStep(FlowStepTask { run_id: FlowRunId::new() });
        assert_eq!(task.queue(), CONTROLLER_QUEUE);
    }

    #[test]
    fn node_execute_routes_to_its_tier_queue() {
        let task = Task::NodeExecute(Box::new(NodeExecuteTask {
            run_id: FlowRunId::new(),
            node_id: NodeId::new("a"),
            node: Node {
                id: NodeId::new("a"),
                uses: "pub/name".into(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                flags: Map::new(),
            },
            node_def: node_def("gn-large"),
            input_urls: Map::new(),
            output_urls: Map::new(),
            max_attempts: 3,
            attempt: 1,
            trace_parent: None,
        }));
        assert_eq!(task.queue(), "gn-large");
    }

    #[test]
    fn serde_round_trips_through_the_tagged_union() {
        let run_id = FlowRunId::new();
        let task = Task::NodeFailed(NodeFailedTask {
            run_id,
            node_id: NodeId::new("a"),
            attempt: 2,
            max_attempts: 2,
            error_message: "boom".into(),
            logs: vec!["line".into()],
            trace_parent: None,
        });
        let bytes = serde_json::to_vec(&task).unwrap();
        let decoded: Task = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, task);
        assert_eq!(decoded.run_id(), run_id);
    }
}
