//! The persisted shape of a flow run: everything `RuntimeFlow::rebuild`
//! needs to reconstruct an in-flight run after a controller restart.

use flowline_flow::{Flow, FlowRun, NodeDef};
use serde::{Deserialize, Serialize};

/// A snapshot of a flow run suitable for envelope-wrapped storage.
///
/// `flow` and `defs` are persisted alongside the mutable `run` state because
/// `RuntimeFlow::rebuild` needs all three to reconstruct a steppable runtime
/// without re-running admission validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub flow: Flow,
    pub defs: Vec<NodeDef>,
    pub run: FlowRun,
    pub trace_parent: Option<String>,
}

impl RunRecord {
    #[must_use]
    pub fn new(flow: Flow, defs: Vec<NodeDef>, run: FlowRun, trace_parent: Option<String>) -> Self {
        Self { flow, defs, run, trace_parent }
    }
}
