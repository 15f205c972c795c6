//! In-memory collaborators for tests and local runs without a cluster.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::model::PodIdentity;
use crate::store::{NameGenerator, PodLogSource, RunStore};

const NAMESPACE: &str = "ort";

/// `OrtRun` store kept in a vector, in creation order.
#[derive(Default)]
pub struct InMemoryRunStore {
    objects: RwLock<Vec<Value>>,
    failing: AtomicBool,
    hanging: AtomicBool,
    calls: AtomicUsize,
}

impl InMemoryRunStore {
    /// Make every call fail with a store error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every call wait forever.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of the stored objects.
    pub async fn objects(&self) -> Vec<Value> {
        self.objects.read().await.clone()
    }

    /// Insert an object as-is, bypassing `create`.
    pub async fn insert(&self, object: Value) {
        self.objects.write().await.push(object);
    }

    /// Replace the status section of a stored run.
    pub async fn set_status(&self, name: &str, status: Value) {
        let mut objects = self.objects.write().await;
        if let Some(object) = objects
            .iter_mut()
            .find(|o| object_name(o) == Some(name))
            .and_then(Value::as_object_mut)
        {
            object.insert("status".to_string(), status);
        }
    }

    async fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Other("store unavailable".to_string()));
        }
        Ok(())
    }
}

fn object_name(object: &Value) -> Option<&str> {
    object.get("metadata")?.get("name")?.as_str()
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, mut object: Value) -> Result<Value, StoreError> {
        self.enter().await?;

        let name = object_name(&object).unwrap_or_default().to_string();
        let mut objects = self.objects.write().await;
        if objects.iter().any(|o| object_name(o) == Some(name.as_str())) {
            return Err(StoreError::Conflict(name));
        }

        if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert("namespace".to_string(), Value::from(NAMESPACE));
        }
        objects.push(object.clone());
        Ok(object)
    }

    async fn get(&self, name: &str) -> Result<Value, StoreError> {
        self.enter().await?;
        self.objects
            .read()
            .await
            .iter()
            .find(|o| object_name(o) == Some(name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<Value>, StoreError> {
        self.enter().await?;
        Ok(self.objects.read().await.clone())
    }
}

/// Pod directory with canned logs. A pod added without logs fails to fetch.
#[derive(Default)]
pub struct InMemoryPods {
    pods: RwLock<Vec<(PodIdentity, Option<String>)>>,
    failing: AtomicBool,
    listing_hangs: AtomicBool,
    fetch_hangs: AtomicBool,
}

impl InMemoryPods {
    pub async fn add(&self, name: &str, logs: Option<&str>) {
        self.pods
            .write()
            .await
            .push((PodIdentity::new(name), logs.map(ToString::to_string)));
    }

    /// Make pod listing fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make pod listing wait forever.
    pub fn set_listing_hanging(&self, hanging: bool) {
        self.listing_hangs.store(hanging, Ordering::SeqCst);
    }

    /// Make every log fetch wait forever.
    pub fn set_fetch_hanging(&self, hanging: bool) {
        self.fetch_hangs.store(hanging, Ordering::SeqCst);
    }
}

#[async_trait]
impl PodLogSource for InMemoryPods {
    async fn list_pods(&self) -> Result<Vec<PodIdentity>, StoreError> {
        if self.listing_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Other("pod listing unavailable".to_string()));
        }
        Ok(self.pods.read().await.iter().map(|(p, _)| p.clone()).collect())
    }

    async fn fetch_log(&self, pod_name: &str) -> Result<String, StoreError> {
        if self.fetch_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.pods
            .read()
            .await
            .iter()
            .find(|(p, _)| p.name == pod_name)
            .and_then(|(_, logs)| logs.clone())
            .ok_or_else(|| StoreError::Other(format!("no logs for {pod_name}")))
    }
}

/// Hands out the given names in turn, wrapping around.
pub struct FixedNames {
    names: Vec<String>,
    next: AtomicUsize,
}

impl FixedNames {
    #[must_use]
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(ToString::to_string).collect(),
            next: AtomicUsize::new(0),
        }
    }
}

impl NameGenerator for FixedNames {
    fn generate(&self) -> String {
        if self.names.is_empty() {
            return String::new();
        }
        let index = self.next.fetch_add(1, Ordering::SeqCst) % self.names.len();
        self.names[index].clone()
    }
}
