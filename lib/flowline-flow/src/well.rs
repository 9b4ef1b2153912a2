//! Data wells: external bindings of a flow edge to an object-store location.

use serde::{Deserialize, Serialize};

/// Where a datawell's data originates. Only `Upload` generates a presigned
/// PUT URL at construction time; `Static` and `Webhook` defer URL
/// generation (§4.A).
///
/// This supersedes a legacy `type: dynamic|static` field the original
/// source also carried (see DESIGN.md) — only `source` is modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataWellSource {
    Upload,
    Static,
    Webhook,
}

/// Binds a flow edge to a named store, optionally with an external
/// producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataWell {
    pub store: String,
    pub edge: String,
    #[serde(default)]
    pub source: Option<DataWellSource>,
    /// Explicit object key; defaults to `"${edge}_${run_id}"` when unset.
    #[serde(default)]
    pub key: Option<String>,
}

impl DataWell {
    #[must_use]
    pub fn object_name(&self, run_id: &flowline_core::FlowRunId) -> String {
        self.key.clone().unwrap_or_else(|| format!("{}_{}", self.edge, run_id))
    }
}

/// A flow's fallback store binding for edges with no explicit datawell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultDataWell {
    pub store: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_prefers_explicit_key() {
        let well = DataWell {
            store: "s".to_string(),
            edge: "e".to_string(),
            source: Some(DataWellSource::Upload),
            key: Some("custom-key".to_string()),
        };
        let run_id = flowline_core::FlowRunId::new();
        assert_eq!(well.object_name(&run_id), "custom-key");
    }

    #[test]
    fn object_name_falls_back_to_edge_and_run() {
        let well = DataWell {
            store: "s".to_string(),
            edge: "e".to_string(),
            source: None,
            key: None,
        };
        let run_id = flowline_core::FlowRunId::new();
        assert_eq!(well.object_name(&run_id), format!("e_{run_id}"));
    }
}
