//! DashMap-backed `RunRepository` for tests and single-process deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use flowline_core::{Envelope, FlowRunId};

use crate::{RepositoryError, RunRecord, RunRepository};

/// An in-memory run repository. State is lost on process exit; intended for
/// tests and for controllers that don't need to survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryRunRepository {
    runs: DashMap<FlowRunId, Envelope<RunRecord>>,
}

impl InMemoryRunRepository {
    #[must_use]
    pub fn new() -> Self {
        Self { runs: DashMap::new() }
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn save(&self, run_id: FlowRunId, record: &RunRecord) -> Result<(), RepositoryError> {
        self.runs.insert(run_id, Envelope::new(record.clone()));
        Ok(())
    }

    async fn load(&self, run_id: FlowRunId) -> Result<RunRecord, RepositoryError> {
        self.runs
            .get(&run_id)
            .map(|entry| entry.payload().clone())
            .ok_or(RepositoryError::NotFound { run_id })
    }

    async fn delete(&self, run_id: FlowRunId) -> Result<(), RepositoryError> {
        self.runs.remove(&run_id);
        Ok(())
    }

    async fn list_run_ids(&self) -> Result<Vec<FlowRunId>, RepositoryError> {
        Ok(self.runs.iter().map(|entry| *entry.key()).collect())
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_flow::{Flow, FlowRun};

    fn sample_record() -> RunRecord {
        let run_id = FlowRunId::new();
        RunRecord::new(
            Flow {
                name: "t".into(),
                nodes: Vec::new(),
                stores: Vec::new(),
                default_data_well: None,
                data_wells: Vec::new(),
            },
            Vec::new(),
            FlowRun::new(run_id),
            None,
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let repo = InMemoryRunRepository::new();
        let record = sample_record();
        let run_id = record.run.id;

        repo.save(run_id, &record).await.unwrap();
        let loaded = repo.load(run_id).await.unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn load_missing_run_is_not_found() {
        let repo = InMemoryRunRepository::new();
        let err = repo.load(FlowRunId::new()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let repo = InMemoryRunRepository::new();
        let mut record = sample_record();
        let run_id = record.run.id;

        repo.save(run_id, &record).await.unwrap();
        record.trace_parent = Some("trace-123".into());
        repo.save(run_id, &record).await.unwrap();

        let loaded = repo.load(run_id).await.unwrap();
        assert_eq!(loaded.trace_parent.as_deref(), Some("trace-123"));
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let repo = InMemoryRunRepository::new();
        let record = sample_record();
        let run_id = record.run.id;

        repo.save(run_id, &record).await.unwrap();
        repo.delete(run_id).await.unwrap();
        assert!(matches!(repo.load(run_id).await, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_of_missing_run_is_not_an_error() {
        let repo = InMemoryRunRepository::new();
        repo.delete(FlowRunId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn list_run_ids_returns_every_saved_run() {
        let repo = InMemoryRunRepository::new();
        let a = sample_record();
        let b = sample_record();
        repo.save(a.run.id, &a).await.unwrap();
        repo.save(b.run.id, &b).await.unwrap();

        let mut ids = repo.list_run_ids().await.unwrap();
        ids.sort();
        let mut expected = vec![a.run.id, b.run.id];
        expected.sort();
        assert_eq!(ids, expected);
    }
}
