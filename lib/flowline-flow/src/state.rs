//! Dynamic per-run state: node status, the flow-run envelope, and the
//! status enums the step function transitions between.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, WaitingUrl};
use crate::node::NodeId;
use flowline_core::FlowRunId;

/// A node's progress through its lifecycle within a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Idle,
    Ready,
    Running,
    Retrying,
    Complete,
    Error,
}

/// Per-node dynamic state within a `FlowRun`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub status: NodeRunStatus,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,
}

impl NodeState {
    #[must_use]
    pub fn idle(max_retries: u32) -> Self {
        Self {
            status: NodeRunStatus::Idle,
            logs: Vec::new(),
            last_error: None,
            retry_count: 0,
            max_retries,
        }
    }
}

/// The run's overall progress, derived from its node states by the step
/// function (invariants 4/5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowRunStatus {
    Stopped,
    Waiting,
    Running,
    Complete,
    Error,
}

/// The persisted dynamic state of one flow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRun {
    pub id: FlowRunId,
    pub status: FlowRunStatus,
    pub node_states: HashMap<NodeId, NodeState>,
    pub artifacts: HashMap<String, Artifact>,
    #[serde(default)]
    pub waiting_urls: Vec<WaitingUrl>,
}

impl FlowRun {
    #[must_use]
    pub fn new(id: FlowRunId) -> Self {
        Self {
            id,
            status: FlowRunStatus::Stopped,
            node_states: HashMap::new(),
            artifacts: HashMap::new(),
            waiting_urls: Vec::new(),
        }
    }

    /// Invariant 4: the run is complete iff every node state is complete.
    #[must_use]
    pub fn all_nodes_complete(&self) -> bool {
        !self.node_states.is_empty() && self.node_states.values().all(|s| s.status == NodeRunStatus::Complete)
    }

    /// Invariant 5: the run is terminally errored iff any node state is a
    /// terminal error (attempts exhausted).
    #[must_use]
    pub fn any_node_errored(&self) -> bool {
        self.node_states.values().any(|s| s.status == NodeRunStatus::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_nodes_complete_requires_nonempty_and_all_complete() {
        let mut run = FlowRun::new(FlowRunId::new());
        assert!(!run.all_nodes_complete());

        run.node_states.insert(NodeId::new("a"), NodeState::idle(3));
        assert!(!run.all_nodes_complete());

        run.node_states.get_mut(&NodeId::new("a")).unwrap().status = NodeRunStatus::Complete;
        assert!(run.all_nodes_complete());
    }

    #[test]
    fn any_node_errored_detects_terminal_failure() {
        let mut run = FlowRun::new(FlowRunId::new());
        run.node_states.insert(NodeId::new("a"), NodeState::idle(3));
        assert!(!run.any_node_errored());

        run.node_states.get_mut(&NodeId::new("a")).unwrap().status = NodeRunStatus::Error;
        assert!(run.any_node_errored());
    }
}
