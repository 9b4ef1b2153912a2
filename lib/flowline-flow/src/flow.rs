//! The static `Flow` definition and admission-time validation (§4.D.v).

use std::collections::{HashMap, HashSet};

use flowline_resources::tier::STANDARD_TIER_MAP;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};
use crate::node::{Node, NodeDef, NodeId, find_def};
use crate::store::StoreBinding;
use crate::well::{DataWell, DefaultDataWell};

/// A user-defined flow: the static DAG description admitted by the
/// controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub stores: Vec<StoreBinding>,
    #[serde(default)]
    pub default_data_well: Option<DefaultDataWell>,
    #[serde(default)]
    pub data_wells: Vec<DataWell>,
}

impl Flow {
    /// Normalizes a freshly-loaded flow: trims incidental whitespace from
    /// names so equivalent flows compare and hash identically regardless
    /// of how they were authored.
    pub fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        for node in &mut self.nodes {
            for binding in node.inputs.iter_mut().chain(node.outputs.iter_mut()) {
                binding.edge = binding.edge.trim().to_string();
            }
        }
        for well in &mut self.data_wells {
            well.edge = well.edge.trim().to_string();
        }
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id.as_str() == id)
    }

    #[must_use]
    pub fn store(&self, name: &str) -> Option<&StoreBinding> {
        self.stores.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone)]
enum Producer {
    NodeOutput { node: NodeId, port: String },
    DataWell,
}

#[derive(Debug, Clone)]
struct Consumer {
    node: NodeId,
    port: String,
}

/// Validates `flow` against `defs` per §4.D.v rules 1-11. Returns a result
/// whose `errors` list is empty iff the flow may be admitted.
#[must_use]
pub fn validate(flow: &Flow, defs: &[NodeDef]) -> ValidationResult {
    let mut result = ValidationResult::default();

    // Rule 5: node ids unique and non-empty.
    let mut seen_ids = HashSet::new();
    for node in &flow.nodes {
        if node.id.as_str().is_empty() || !seen_ids.insert(node.id.as_str()) {
            result.push_error(ValidationError::DuplicateOrEmptyNodeId {
                node_id: node.id.as_str().to_string(),
            });
        }
    }

    // Resolve each node's def; rules 1-4, 6 only apply to resolved nodes.
    let mut bound: HashMap<NodeId, &NodeDef> = HashMap::new();
    for node in &flow.nodes {
        match find_def(defs, &node.uses) {
            Some(def) => {
                bound.insert(node.id.clone(), def);
            }
            None => result.push_error(ValidationError::DefNotFound {
                node_id: node.id.clone(),
                reference: node.uses.clone(),
            }),
        }
    }

    for node in &flow.nodes {
        let Some(def) = bound.get(&node.id) else { continue };

        // Rule 2: every required input is bound.
        for input in &def.inputs {
            if input.required && node.input_edge(&input.name).is_none() {
                result.push_error(ValidationError::RequiredInputUnbound {
                    node_id: node.id.clone(),
                    input_name: input.name.clone(),
                });
            }
        }

        // Rule 3: every required flag has a value.
        for flag in &def.flags {
            if flag.required && !node.flags.contains_key(&flag.name) {
                result.push_error(ValidationError::RequiredFlagMissing {
                    node_id: node.id.clone(),
                    flag_name: flag.name.clone(),
                });
            }
        }

        // Rule 4: no unknown flags.
        for flag_name in node.flags.keys() {
            if def.flag(flag_name).is_none() {
                result.push_error(ValidationError::UnknownFlag {
                    node_id: node.id.clone(),
                    flag_name: flag_name.clone(),
                });
            }
        }

        // Rule 6: declared tier is known.
        if !STANDARD_TIER_MAP.contains_key(def.tier.as_str()) {
            result.push_error(ValidationError::UnknownTier {
                node_id: node.id.clone(),
                tier: def.tier.clone(),
            });
        }
    }

    // Rule 9: no two datawells share an edge.
    let mut seen_well_edges = HashSet::new();
    for well in &flow.data_wells {
        if !seen_well_edges.insert(well.edge.as_str()) {
            result.push_error(ValidationError::DuplicateDataWellEdge { edge: well.edge.clone() });
        }
    }

    // Rule 10: every datawell edge appears in some node's inputs/outputs.
    let node_edges: HashSet<&str> = flow
        .nodes
        .iter()
        .flat_map(|n| n.inputs.iter().chain(n.outputs.iter()))
        .map(|b| b.edge.as_str())
        .collect();
    for well in &flow.data_wells {
        if !node_edges.contains(well.edge.as_str()) {
            result.push_error(ValidationError::DanglingDataWellEdge { edge: well.edge.clone() });
        }
    }

    // Build producer/consumer maps over edge name for rules 1, 7, 8, 11.
    let mut producers: HashMap<&str, Vec<Producer>> = HashMap::new();
    let mut consumers: HashMap<&str, Vec<Consumer>> = HashMap::new();

    for node in &flow.nodes {
        let Some(def) = bound.get(&node.id) else { continue };
        for binding in &node.outputs {
            if def.output(&binding.name).is_some() {
                producers.entry(binding.edge.as_str()).or_default().push(Producer::NodeOutput {
                    node: node.id.clone(),
                    port: binding.name.clone(),
                });
            }
        }
        for binding in &node.inputs {
            if def.input(&binding.name).is_some() {
                consumers.entry(binding.edge.as_str()).or_default().push(Consumer {
                    node: node.id.clone(),
                    port: binding.name.clone(),
                });
            }
        }
    }
    for well in &flow.data_wells {
        if well.source.is_some() {
            producers.entry(well.edge.as_str()).or_default().push(Producer::DataWell);
        }
    }

    // A node output edge is always "consumed" by the artifact store it
    // lands in (§4.A output artifact allocation), whether or not any node
    // input reads it back.
    let output_bound_edges: HashSet<&str> = flow
        .nodes
        .iter()
        .flat_map(|n| n.outputs.iter())
        .map(|b| b.edge.as_str())
        .collect();

    let all_edges: HashSet<&str> = node_edges.iter().copied().collect();
    for edge in &all_edges {
        let producer_list = producers.get(edge).map(Vec::as_slice).unwrap_or(&[]);
        let consumer_list = consumers.get(edge).map(Vec::as_slice).unwrap_or(&[]);

        if producer_list.is_empty() {
            result.push_error(ValidationError::UnboundEdge {
                edge: (*edge).to_string(),
                missing: "producer",
            });
        }
        if consumer_list.is_empty() && !output_bound_edges.contains(edge) {
            result.push_error(ValidationError::UnboundEdge {
                edge: (*edge).to_string(),
                missing: "consumer",
            });
        }

        // Rule 8: producer/consumer mime intersection, exempting datawell
        // sourced edges (datawells are type-agnostic at runtime).
        if let [Producer::NodeOutput { node: producer_node, port }] = producer_list {
            let Some(producer_def) = bound.get(producer_node) else { continue };
            let Some(producer_port) = producer_def.output(port) else { continue };
            let producer_mime = producer_port.mime_set();

            for consumer in consumer_list {
                let Some(consumer_def) = bound.get(&consumer.node) else { continue };
                let Some(consumer_port) = consumer_def.input(&consumer.port) else { continue };
                if !producer_mime.intersects(&consumer_port.mime_set()) {
                    result.push_error(ValidationError::EdgeTypeMismatch {
                        edge: (*edge).to_string(),
                        producer_node: producer_node.clone(),
                        consumer_node: consumer.node.clone(),
                    });
                }
            }
        }
    }

    // Rule 11: the node graph (producer node -> consumer node per edge)
    // must be a DAG.
    let mut graph = DiGraph::<NodeId, ()>::new();
    let mut index_of = HashMap::new();
    for node in &flow.nodes {
        let idx = graph.add_node(node.id.clone());
        index_of.insert(node.id.clone(), idx);
    }
    for (edge, producer_list) in &producers {
        let Some(consumer_list) = consumers.get(edge) else { continue };
        for producer in producer_list {
            let Producer::NodeOutput { node: producer_node, .. } = producer else { continue };
            let Some(&from) = index_of.get(producer_node) else { continue };
            for consumer in consumer_list {
                let Some(&to) = index_of.get(&consumer.node) else { continue };
                graph.add_edge(from, to, ());
            }
        }
    }
    if is_cyclic_directed(&graph) {
        result.push_error(ValidationError::CycleDetected);
    }

    result
}
