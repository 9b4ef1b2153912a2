//! sqlx/Postgres-backed `RunRepository`.
//!
//! Runs live in a single `flow_runs` table keyed by `run_id`, with the
//! envelope's `version` and `payload` stored as separate columns so a
//! reader can inspect the version without deserializing the payload.

use async_trait::async_trait;
use flowline_core::{Envelope, FlowRunId, RawEnvelope};
use sqlx::{FromRow, PgPool};

use crate::{RepositoryError, RunRecord, RunRepository};

/// Run `flowline-repository/migrations` (or an equivalent) before using this
/// repository. The expected schema:
///
/// ```sql
/// CREATE TABLE flow_runs (
///     run_id  TEXT PRIMARY KEY,
///     version INTEGER NOT NULL,
///     payload JSONB NOT NULL
/// );
/// ```
pub struct PostgresRunRepository {
    pool: PgPool,
}

#[derive(FromRow)]
struct FlowRunRow {
    version: i32,
    payload: serde_json::Value,
}

impl PostgresRunRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(run_id: FlowRunId, row: FlowRunRow) -> Result<RunRecord, RepositoryError> {
        let raw = RawEnvelope {
            version: row.version as u32,
            payload: row.payload,
        };
        let envelope: Envelope<RunRecord> = raw.deserialize_payload().map_err(|e| RepositoryError::Decode {
            run_id,
            message: e.to_string(),
        })?;
        Ok(envelope.into_payload())
    }
}

#[async_trait]
impl RunRepository for PostgresRunRepository {
    async fn save(&self, run_id: FlowRunId, record: &RunRecord) -> Result<(), RepositoryError> {
        let envelope = Envelope::new(record.clone());
        let payload = serde_json::to_value(envelope.payload()).map_err(|e| RepositoryError::Backend {
            message: format!("failed to encode run record: {e}"),
        })?;

        sqlx::query(
            r#"
            INSERT INTO flow_runs (run_id, version, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id) DO UPDATE SET version = $2, payload = $3
            "#,
        )
        .bind(run_id.to_string())
        .bind(envelope.version as i32)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Backend { message: e.to_string() })?;

        Ok(())
    }

    async fn load(&self, run_id: FlowRunId) -> Result<RunRecord, RepositoryError> {
        let row: Option<FlowRunRow> = sqlx::query_as("SELECT version, payload FROM flow_runs WHERE run_id = $1")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend { message: e.to_string() })?;

        match row {
            Some(row) => Self::decode(run_id, row),
            None => Err(RepositoryError::NotFound { run_id }),
        }
    }

    async fn delete(&self, run_id: FlowRunId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM flow_runs WHERE run_id = $1")
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend { message: e.to_string() })?;
        Ok(())
    }

    async fn list_run_ids(&self) -> Result<Vec<FlowRunId>, RepositoryError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT run_id FROM flow_runs")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend { message: e.to_string() })?;

        rows.into_iter()
            .map(|(raw,)| {
                raw.parse::<FlowRunId>().map_err(|e| RepositoryError::Backend {
                    message: format!("stored run_id '{raw}' is not a valid FlowRunId: {e}"),
                })
            })
            .collect()
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        self.pool.close().await;
        Ok(())
    }
}

// Run with: DATABASE_URL="postgresql:///flowline_test" cargo test -p flowline-repository -- --ignored
#[cfg(test)]
mod tests {
    use super::*;
    use flowline_flow::{Flow, FlowRun};
    use sqlx::postgres::PgPoolOptions;

    async fn repo() -> PostgresRunRepository {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("connect to postgres");
        sqlx::migrate!("./migrations").run(&pool).await.expect("run migrations");
        PostgresRunRepository::new(pool)
    }

    fn sample_record() -> RunRecord {
        RunRecord::new(
            Flow {
                name: "t".into(),
                nodes: Vec::new(),
                stores: Vec::new(),
                default_data_well: None,
                data_wells: Vec::new(),
            },
            Vec::new(),
            FlowRun::new(FlowRunId::new()),
            None,
        )
    }

    #[tokio::test]
    #[ignore] // requires DATABASE_URL
    async fn save_then_load_round_trips() {
        let repo = repo().await;
        let record = sample_record();
        let run_id = record.run.id;

        repo.save(run_id, &record).await.unwrap();
        let loaded = repo.load(run_id).await.unwrap();
        assert_eq!(loaded, record);

        repo.delete(run_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // requires DATABASE_URL
    async fn load_missing_run_is_not_found() {
        let repo = repo().await;
        let err = repo.load(FlowRunId::new()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    #[ignore] // requires DATABASE_URL
    async fn save_is_an_upsert() {
        let repo = repo().await;
        let mut record = sample_record();
        let run_id = record.run.id;

        repo.save(run_id, &record).await.unwrap();
        record.trace_parent = Some("trace-xyz".into());
        repo.save(run_id, &record).await.unwrap();

        let loaded = repo.load(run_id).await.unwrap();
        assert_eq!(loaded.trace_parent.as_deref(), Some("trace-xyz"));

        repo.delete(run_id).await.unwrap();
    }
}
