//! Where an edge's data lives once produced, and the presigned URLs a
//! waiting upload is exposed through.

use serde::{Deserialize, Serialize};

/// The resolved object-store location backing an edge's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub edge: String,
    pub store: String,
    pub object_name: String,
}

impl Artifact {
    #[must_use]
    pub fn new(edge: impl Into<String>, store: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            edge: edge.into(),
            store: store.into(),
            object_name: object_name.into(),
        }
    }
}

/// A presigned PUT URL handed back to the caller so they can supply data
/// for an edge sourced by an `Upload` datawell (§4.A).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingUrl {
    pub artifact: Artifact,
    pub put_url: String,
    pub ttl_secs: u64,
}

impl WaitingUrl {
    #[must_use]
    pub fn new(artifact: Artifact, put_url: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            artifact,
            put_url: put_url.into(),
            ttl_secs,
        }
    }
}
