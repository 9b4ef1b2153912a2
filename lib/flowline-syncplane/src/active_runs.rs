//! The `scheduler-active-runs` set: which runs the leader's periodic
//! dispatcher submits `flow:step` tasks for.
//!
//! `add`/`remove` are independent per-key operations on the same KV bucket
//! backing the mutex, so they're commutative across concurrent controllers
//! (§5's CRDT-safe requirement) — no controller needs to coordinate with
//! another to add or remove its own runs.

use async_trait::async_trait;
use flowline_core::FlowRunId;

use crate::error::MutexError;

#[async_trait]
pub trait ActiveRuns: Send + Sync {
    async fn add(&self, run_id: FlowRunId) -> Result<(), MutexError>;
    async fn remove(&self, run_id: FlowRunId) -> Result<(), MutexError>;
    async fn list(&self) -> Result<Vec<FlowRunId>, MutexError>;
}

/// An in-process active-runs set for tests and single-controller
/// deployments.
#[derive(Default)]
pub struct InMemoryActiveRuns {
    runs: std::sync::Mutex<std::collections::HashSet<FlowRunId>>,
}

impl InMemoryActiveRuns {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActiveRuns for InMemoryActiveRuns {
    async fn add(&self, run_id: FlowRunId) -> Result<(), MutexError> {
        self.runs.lock().expect("active runs set poisoned").insert(run_id);
        Ok(())
    }

    async fn remove(&self, run_id: FlowRunId) -> Result<(), MutexError> {
        self.runs.lock().expect("active runs set poisoned").remove(&run_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<FlowRunId>, MutexError> {
        Ok(self.runs.lock().expect("active runs set poisoned").iter().copied().collect())
    }
}

/// A JetStream KV-backed active-runs set, one entry per run id.
pub struct NatsActiveRuns {
    kv: async_nats::jetstream::kv::Store,
}

impl NatsActiveRuns {
    /// Creates or opens the KV bucket `bucket` for the active-runs set.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be created or opened.
    pub async fn new(jetstream: &async_nats::jetstream::Context, bucket: &str) -> Result<Self, MutexError> {
        let kv = jetstream
            .create_key_value(async_nats::jetstream::kv::Config {
                bucket: bucket.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|e| MutexError::Backend { message: e.to_string() })?;
        Ok(Self { kv })
    }
}

#[async_trait]
impl ActiveRuns for NatsActiveRuns {
    async fn add(&self, run_id: FlowRunId) -> Result<(), MutexError> {
        self.kv
            .put(run_id.to_string(), "1".into())
            .await
            .map_err(|e| MutexError::Backend { message: e.to_string() })?;
        Ok(())
    }

    async fn remove(&self, run_id: FlowRunId) -> Result<(), MutexError> {
        self.kv
            .delete(run_id.to_string())
            .await
            .map_err(|e| MutexError::Backend { message: e.to_string() })?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<FlowRunId>, MutexError> {
        use futures::StreamExt;
        let mut keys = self
            .kv
            .keys()
            .await
            .map_err(|e| MutexError::Backend { message: e.to_string() })?;

        let mut run_ids = Vec::new();
        while let Some(key) = keys.next().await {
            let key = key.map_err(|e| MutexError::Backend { message: e.to_string() })?;
            if let Ok(run_id) = key.parse() {
                run_ids.push(run_id);
            }
        }
        Ok(run_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_list_contains_the_run() {
        let runs = InMemoryActiveRuns::new();
        let run_id = FlowRunId::new();
        runs.add(run_id).await.unwrap();
        assert_eq!(runs.list().await.unwrap(), vec![run_id]);
    }

    #[tokio::test]
    async fn remove_drops_the_run() {
        let runs = InMemoryActiveRuns::new();
        let run_id = FlowRunId::new();
        runs.add(run_id).await.unwrap();
        runs.remove(run_id).await.unwrap();
        assert!(runs.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_of_absent_run_is_not_an_error() {
        let runs = InMemoryActiveRuns::new();
        runs.remove(FlowRunId::new()).await.unwrap();
    }
}
