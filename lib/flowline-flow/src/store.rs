//! The object store contract (§6) and the named store bindings a flow
//! declares against it.
//!
//! Only the trait and an in-memory fake live here — S3-compatible drivers
//! are out of scope (§1); a real deployment plugs one in behind
//! [`ObjectStoreFactory`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A named object-store binding as declared on a `Flow`. `params` is an
/// opaque JSON blob whose shape is determined by `store_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreBinding {
    pub name: String,
    #[serde(rename = "type")]
    pub store_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Errors an `ObjectStore` implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    PresignFailed { message: String },
    DeleteFailed { message: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PresignFailed { message } => write!(f, "presign failed: {message}"),
            Self::DeleteFailed { message } => write!(f, "delete failed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The object store contract (§6): presigned PUT/GET URLs, existence
/// checks, and deletion. The control plane never reads or writes payload
/// bytes through this trait — only URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_url(&self, object_name: &str, ttl: Duration) -> Result<String, StoreError>;
    async fn get_url(&self, object_name: &str, ttl: Duration) -> Result<String, StoreError>;
    async fn exists(&self, object_name: &str) -> bool;
    async fn delete_object(&self, object_name: &str) -> Result<(), StoreError>;
}

/// Constructs `ObjectStore` instances from a `StoreBinding`'s opaque
/// parameters. Implementations register one variant per `store_type` tag
/// (`s3`, `s3local`, `s3fs`, ...); this crate only registers `"memory"`.
pub trait ObjectStoreFactory: Send + Sync {
    /// Builds a store from `binding`, or `None` if `store_type` is
    /// unrecognized by this factory.
    fn build(&self, binding: &StoreBinding) -> Option<Result<Box<dyn ObjectStore>, String>>;
}

/// A factory that only ever produces [`InMemoryStore`]s, keyed by
/// `store_type == "memory"`. Suitable for tests and local dev.
#[derive(Debug, Default)]
pub struct InMemoryStoreFactory;

impl ObjectStoreFactory for InMemoryStoreFactory {
    fn build(&self, binding: &StoreBinding) -> Option<Result<Box<dyn ObjectStore>, String>> {
        (binding.store_type == "memory").then(|| Ok(Box::new(InMemoryStore::default()) as Box<dyn ObjectStore>))
    }
}

/// A filesystem-free in-memory object store fake: "uploading" to a
/// presigned URL and materializing an object are both modeled by directly
/// calling [`InMemoryStore::seed`] from a test, since there is no real HTTP
/// server to receive the PUT.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/demo helper: materializes an object directly, standing in for
    /// an external actor completing an upload to a presigned PUT URL.
    pub fn seed(&self, object_name: &str, data: impl Into<Vec<u8>>) {
        self.objects.lock().unwrap().insert(object_name.to_string(), data.into());
    }

    #[must_use]
    pub fn get(&self, object_name: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(object_name).cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn put_url(&self, object_name: &str, ttl: Duration) -> Result<String, StoreError> {
        Ok(format!("memory://put/{object_name}?ttl={}", ttl.as_secs()))
    }

    async fn get_url(&self, object_name: &str, ttl: Duration) -> Result<String, StoreError> {
        Ok(format!("memory://get/{object_name}?ttl={}", ttl.as_secs()))
    }

    async fn exists(&self, object_name: &str) -> bool {
        self.objects.lock().unwrap().contains_key(object_name)
    }

    async fn delete_object(&self, object_name: &str) -> Result<(), StoreError> {
        self.objects.lock().unwrap().remove(object_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_object_exists() {
        let store = InMemoryStore::new();
        assert!(!store.exists("a").await);
        store.seed("a", b"data".to_vec());
        assert!(store.exists("a").await);
        assert_eq!(store.get("a"), Some(b"data".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_object() {
        let store = InMemoryStore::new();
        store.seed("a", b"data".to_vec());
        store.delete_object("a").await.unwrap();
        assert!(!store.exists("a").await);
    }

    #[tokio::test]
    async fn factory_only_builds_memory_type() {
        let factory = InMemoryStoreFactory;
        let memory_binding = StoreBinding {
            name: "s".to_string(),
            store_type: "memory".to_string(),
            params: serde_json::Value::Null,
        };
        assert!(factory.build(&memory_binding).is_some());

        let s3_binding = StoreBinding {
            name: "s".to_string(),
            store_type: "s3".to_string(),
            params: serde_json::Value::Null,
        };
        assert!(factory.build(&s3_binding).is_none());
    }
}
