//! Errors produced by a run repository implementation.

use std::fmt;

use flowline_core::FlowRunId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// No record exists for the given run id.
    NotFound { run_id: FlowRunId },
    /// The persisted record failed to decode (schema drift, corrupt row).
    Decode { run_id: FlowRunId, message: String },
    /// The backing store rejected the operation.
    Backend { message: String },
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { run_id } => write!(f, "no run record for {run_id}"),
            Self::Decode { run_id, message } => write!(f, "failed to decode run record {run_id}: {message}"),
            Self::Backend { message } => write!(f, "repository backend error: {message}"),
        }
    }
}

impl std::error::Error for RepositoryError {}
