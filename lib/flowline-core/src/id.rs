//! Strongly-typed identifiers for domain entities.
//!
//! `FlowRunId` is a UUIDv7: assigned once at run creation, monotonic with
//! creation order, and never reassigned — the property the run repository
//! and the sync plane's scheduler-active-runs set both rely on to use it as
//! a stable, sortable key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Unique identifier for a flow run. Assigned at creation (`FlowRunId::new`)
/// and never changes for the lifetime of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowRunId(Uuid);

impl FlowRunId {
    /// Generates a new run id from a UUIDv7 (time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID without validating its version.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    const PREFIX: &'static str = "run";
}

impl Default for FlowRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}

impl FromStr for FlowRunId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix_with_underscore = "run_";
        let uuid_str = s.strip_prefix(prefix_with_underscore).unwrap_or(s);

        Uuid::from_str(uuid_str).map(Self).map_err(|e| ParseIdError {
            id_type: "FlowRunId",
            reason: e.to_string(),
        })
    }
}

impl From<Uuid> for FlowRunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<FlowRunId> for Uuid {
    fn from(id: FlowRunId) -> Self {
        id.0
    }
}

/// User-supplied, flow-scoped node identifier. Unlike `FlowRunId` this is
/// not generated — it comes from the flow definition and only needs to be
/// unique within that flow (validation rule 5 enforces this at admission).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wraps a raw node id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the node id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_run_id_display_format() {
        let id = FlowRunId::new();
        let display = id.to_string();
        assert!(display.starts_with("run_"));
    }

    #[test]
    fn flow_run_id_parse_with_prefix() {
        let id = FlowRunId::new();
        let display = id.to_string();
        let parsed: FlowRunId = display.parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn flow_run_id_parse_without_prefix() {
        let uuid = Uuid::now_v7();
        let id: FlowRunId = uuid.to_string().parse().expect("should parse");
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn flow_run_id_parse_invalid() {
        let result: Result<FlowRunId, _> = "not_a_uuid".parse();
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().id_type, "FlowRunId");
    }

    #[test]
    fn flow_run_id_monotonic_ordering() {
        let first = FlowRunId::new();
        let second = FlowRunId::new();
        assert!(first < second, "UUIDv7 ids should sort by creation order");
    }

    #[test]
    fn flow_run_id_serde_roundtrip() {
        let id = FlowRunId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        let parsed: FlowRunId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }

    #[test]
    fn node_id_equality_and_borrow() {
        use std::collections::HashSet;

        let a = NodeId::new("node-a");
        let b: NodeId = "node-a".into();
        assert_eq!(a, b);

        let mut set: HashSet<NodeId> = HashSet::new();
        set.insert(a);
        assert!(set.contains("node-a"));
    }
}
