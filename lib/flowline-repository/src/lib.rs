//! Durable storage for in-flight flow runs.
//!
//! A `RunRecord` (a flow, its resolved node defs, and the mutable `FlowRun`
//! state) is wrapped in a [`flowline_core::Envelope`] and handed to a
//! `RunRepository` implementation: [`memory::InMemoryRunRepository`] for
//! tests and single-process deployments, [`postgres::PostgresRunRepository`]
//! for durable multi-controller deployments.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;

pub use error::RepositoryError;
pub use record::RunRecord;

use async_trait::async_trait;
use flowline_core::FlowRunId;

/// Durable storage for in-flight flow run state.
///
/// Implementations must treat `save` as an upsert: a run id that already
/// exists is overwritten, not rejected, since the controller calls `save`
/// after every step.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Persists `record` under `run_id`, replacing any existing record.
    async fn save(&self, run_id: FlowRunId, record: &RunRecord) -> Result<(), RepositoryError>;

    /// Loads the record for `run_id`.
    async fn load(&self, run_id: FlowRunId) -> Result<RunRecord, RepositoryError>;

    /// Removes the record for `run_id`. Deleting a run id that doesn't exist
    /// is not an error: the caller's intent (no record under this id) is
    /// already satisfied.
    async fn delete(&self, run_id: FlowRunId) -> Result<(), RepositoryError>;

    /// Lists every run id currently stored.
    async fn list_run_ids(&self) -> Result<Vec<FlowRunId>, RepositoryError>;

    /// Releases any resources held by the repository (connection pools,
    /// background tasks). Safe to call more than once.
    async fn close(&self) -> Result<(), RepositoryError>;
}
