//! Collaborator seams: the resource store, the pod log source and the run
//! name generator.
//!
//! Production implementations live in [`crate::cluster`] and [`crate::names`];
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::model::PodIdentity;

/// System of record for `OrtRun` objects in one namespace.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a backing object and return it as stored.
    async fn create(&self, object: Value) -> Result<Value, StoreError>;

    /// Fetch one backing object. Missing objects are [`StoreError::NotFound`].
    async fn get(&self, name: &str) -> Result<Value, StoreError>;

    /// List every backing object, in store order.
    async fn list(&self) -> Result<Vec<Value>, StoreError>;
}

/// Pod directory and log source for one namespace.
#[async_trait]
pub trait PodLogSource: Send + Sync {
    /// List every pod in the namespace, in directory order.
    async fn list_pods(&self) -> Result<Vec<PodIdentity>, StoreError>;

    /// Fetch the full log of one pod.
    async fn fetch_log(&self, pod_name: &str) -> Result<String, StoreError>;
}

/// Source of human-readable run names.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}
