//! Node instances and their reusable definitions.
//!
//! A [`Node`] is a flow-scoped instance (`id`, `uses`, bound inputs/outputs,
//! flag values); a [`NodeDef`] is the reusable contract it instantiates
//! (container image, command template, typed ports, resource tier).

use std::collections::HashMap;

use flowline_resources::tier::DEFAULT_TIER;
use serde::{Deserialize, Serialize};

pub use flowline_core::NodeId;

/// Default attempt ceiling for a `NodeDef` that doesn't set `max_attempts`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A local port name bound to a flow edge name (`Node.Inputs`/`Outputs`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// The local name, matching a `NodeDef` input/output declaration.
    pub name: String,
    /// The flow-wide edge name this port is wired to.
    pub edge: String,
}

impl PortBinding {
    #[must_use]
    pub fn new(name: impl Into<String>, edge: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            edge: edge.into(),
        }
    }
}

/// A flow-scoped instance of a `NodeDef`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id within the owning flow.
    pub id: NodeId,
    /// Reference to the `NodeDef` this node instantiates, `publisher/name`.
    pub uses: String,
    #[serde(default)]
    pub inputs: Vec<PortBinding>,
    #[serde(default)]
    pub outputs: Vec<PortBinding>,
    #[serde(default)]
    pub flags: HashMap<String, String>,
}

impl Node {
    /// Returns the edge bound to the local input/output port `name`, if any.
    #[must_use]
    pub fn input_edge(&self, name: &str) -> Option<&str> {
        self.inputs.iter().find(|b| b.name == name).map(|b| b.edge.as_str())
    }

    #[must_use]
    pub fn output_edge(&self, name: &str) -> Option<&str> {
        self.outputs.iter().find(|b| b.name == name).map(|b| b.edge.as_str())
    }
}

/// Declared input or output port on a `NodeDef`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub mime_types: Vec<String>,
}

impl PortDef {
    #[must_use]
    pub fn mime_set(&self) -> crate::mime::MimeSet {
        crate::mime::MimeSet::new(self.mime_types.iter().cloned())
    }
}

/// Declared flag on a `NodeDef`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub value_type: String,
}

/// The executable entry point a `NodeDef`'s container runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Shell-expandable command template, e.g. `"mytool --in $in --out $out"`.
    pub exec: String,
}

/// The reusable contract a `Node` instantiates, identified by
/// `publisher/name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDef {
    pub publisher: String,
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub inputs: Vec<PortDef>,
    #[serde(default)]
    pub outputs: Vec<PortDef>,
    #[serde(default)]
    pub flags: Vec<FlagDef>,
    pub command: Command,
    #[serde(default = "default_tier")]
    pub tier: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_tier() -> String {
    DEFAULT_TIER.to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl NodeDef {
    /// The `publisher/name` key this def is looked up by.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}/{}", self.publisher, self.name)
    }

    #[must_use]
    pub fn input(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn output(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn flag(&self, name: &str) -> Option<&FlagDef> {
        self.flags.iter().find(|f| f.name == name)
    }
}

/// Looks up a `NodeDef` by `publisher/name` from the set supplied at
/// admission.
#[must_use]
pub fn find_def<'a>(defs: &'a [NodeDef], reference: &str) -> Option<&'a NodeDef> {
    defs.iter().find(|d| d.reference() == reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_def() -> NodeDef {
        NodeDef {
            publisher: "acme".to_string(),
            name: "resize".to_string(),
            image: "acme/resize:1.0".to_string(),
            inputs: vec![PortDef {
                name: "in".to_string(),
                description: String::new(),
                required: true,
                mime_types: vec!["image/png".to_string()],
            }],
            outputs: vec![PortDef {
                name: "out".to_string(),
                description: String::new(),
                required: true,
                mime_types: vec!["image/png".to_string()],
            }],
            flags: vec![],
            command: Command {
                name: "run".to_string(),
                description: String::new(),
                exec: "resize --in $in --out $out".to_string(),
            },
            tier: default_tier(),
            max_attempts: default_max_attempts(),
        }
    }

    #[test]
    fn reference_joins_publisher_and_name() {
        assert_eq!(sample_def().reference(), "acme/resize");
    }

    #[test]
    fn find_def_matches_by_reference() {
        let defs = vec![sample_def()];
        assert!(find_def(&defs, "acme/resize").is_some());
        assert!(find_def(&defs, "acme/other").is_none());
    }

    #[test]
    fn defaults_apply_when_absent() {
        let json = serde_json::json!({
            "publisher": "acme",
            "name": "noop",
            "image": "acme/noop:1.0",
            "command": {"name": "run", "exec": "noop"}
        });
        let def: NodeDef = serde_json::from_value(json).unwrap();
        assert_eq!(def.tier, DEFAULT_TIER);
        assert_eq!(def.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn node_resolves_bound_edges() {
        let node = Node {
            id: NodeId::new("a"),
            uses: "acme/resize".to_string(),
            inputs: vec![PortBinding::new("in", "e_in")],
            outputs: vec![PortBinding::new("out", "e_out")],
            flags: HashMap::new(),
        };
        assert_eq!(node.input_edge("in"), Some("e_in"));
        assert_eq!(node.output_edge("missing"), None);
    }
}
