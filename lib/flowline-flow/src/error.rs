//! Error types for the flow data model, admission validation, and runtime.
//!
//! Mirrors the layering the workflow crate this was ported from uses:
//! plain error enums at the leaf (`ValidationError`, `RuntimeError`), with
//! `rootcause::Report` reserved for callers that cross component
//! boundaries (the controller, which wires flow + repository + sync plane
//! together).

use crate::node::NodeId;
use std::fmt;

/// A single admission-time validation failure, tagged with a stable code
/// so callers (tests, the HTTP admission layer) can match on it without
/// parsing the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A node's `Uses` didn't resolve to any supplied `NodeDef`.
    DefNotFound { node_id: NodeId, reference: String },
    /// A required input edge on a node has no binding.
    RequiredInputUnbound { node_id: NodeId, input_name: String },
    /// A required flag on a node has no value.
    RequiredFlagMissing { node_id: NodeId, flag_name: String },
    /// A flag was supplied that the `NodeDef` doesn't declare.
    UnknownFlag { node_id: NodeId, flag_name: String },
    /// A node id is empty or duplicated within the flow.
    DuplicateOrEmptyNodeId { node_id: String },
    /// A node declares a tier the resource catalog doesn't know about.
    UnknownTier { node_id: NodeId, tier: String },
    /// An edge has no producer (no node output, no datawell source) or no
    /// consumer (no node input, no datawell sink).
    UnboundEdge { edge: String, missing: &'static str },
    /// A producer's output mime set and a consumer's input mime set share
    /// no type, so no artifact for this edge could ever satisfy the
    /// consumer.
    EdgeTypeMismatch { edge: String, producer_node: NodeId, consumer_node: NodeId },
    /// Two datawells are bound to the same edge.
    DuplicateDataWellEdge { edge: String },
    /// A datawell's edge appears in no node's inputs or outputs.
    DanglingDataWellEdge { edge: String },
    /// The node graph contains a cycle.
    CycleDetected,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefNotFound { node_id, reference } => {
                write!(f, "node {node_id} uses undefined node def {reference:?}")
            }
            Self::RequiredInputUnbound { node_id, input_name } => {
                write!(f, "node {node_id} has no binding for required input {input_name:?}")
            }
            Self::RequiredFlagMissing { node_id, flag_name } => {
                write!(f, "node {node_id} is missing required flag {flag_name:?}")
            }
            Self::UnknownFlag { node_id, flag_name } => {
                write!(f, "node {node_id} sets unknown flag {flag_name:?}")
            }
            Self::DuplicateOrEmptyNodeId { node_id } => {
                write!(f, "node id {node_id:?} is empty or duplicated")
            }
            Self::UnknownTier { node_id, tier } => {
                write!(f, "node {node_id} declares unknown tier {tier:?}")
            }
            Self::UnboundEdge { edge, missing } => {
                write!(f, "edge {edge:?} has no {missing}")
            }
            Self::EdgeTypeMismatch {
                edge,
                producer_node,
                consumer_node,
            } => {
                write!(
                    f,
                    "EdgeTypeMismatch: edge {edge:?} producer {producer_node} and consumer {consumer_node} share no mime type"
                )
            }
            Self::DuplicateDataWellEdge { edge } => {
                write!(f, "edge {edge:?} is bound by more than one datawell")
            }
            Self::DanglingDataWellEdge { edge } => {
                write!(f, "datawell edge {edge:?} appears in no node's inputs or outputs")
            }
            Self::CycleDetected => write!(f, "node graph contains a cycle"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// The outcome of admission validation: a flow is rejected iff `errors`
/// is non-empty. `warnings` never block admission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
}

impl ValidationResult {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }
}

/// Errors raised while constructing or stepping a `RuntimeFlow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A node's `Uses` reference has no matching `NodeDef` (should have
    /// been caught at admission; defensive check on rehydration too).
    DefNotFound { node_id: NodeId, reference: String },
    /// An output edge has no datawell binding and the flow has no
    /// `DefaultDataWell` to fall back to.
    NoDefaultStore { edge: String },
    /// A store name referenced by a datawell or the default datawell
    /// doesn't appear in the flow's `Stores`.
    StoreNotFound { store: String },
    /// The object store backing a binding returned an error.
    StoreFailure { store: String, message: String },
    /// A node referenced a store that could not be constructed from its
    /// opaque parameters.
    StoreConstruction { store: String, message: String },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefNotFound { node_id, reference } => {
                write!(f, "node {node_id} uses undefined node def {reference:?}")
            }
            Self::NoDefaultStore { edge } => {
                write!(f, "NoDefaultStore: edge {edge:?} has no datawell and the flow has no default datawell")
            }
            Self::StoreNotFound { store } => write!(f, "store {store:?} is not declared on this flow"),
            Self::StoreFailure { store, message } => {
                write!(f, "object store {store:?} failed: {message}")
            }
            Self::StoreConstruction { store, message } => {
                write!(f, "failed to construct store {store:?}: {message}")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}
