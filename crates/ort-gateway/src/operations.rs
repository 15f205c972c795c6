//! The four run operations shared by the HTTP API and the chat bots.
//!
//! [`RunOperations`] keeps no state between calls beyond handles to its
//! collaborators, so it is cloned freely per request or per bot.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cluster::{KubePodLogs, KubeRunStore, ORT_RUN_API_VERSION, ORT_RUN_KIND};
use crate::error::{OperationError, Result, StoreError};
use crate::logs::{build_log_bundle, locate_stage_pods};
use crate::model::{LogBundle, Run};
use crate::names::WordPairNames;
use crate::store::{NameGenerator, PodLogSource, RunStore};
use crate::translate::{translate, translate_list};

/// Default deadline for a single resource-store or log-source call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Run operations over a resource store, a pod log source and a name generator.
#[derive(Clone)]
pub struct RunOperations {
    store: Arc<dyn RunStore>,
    pods: Arc<dyn PodLogSource>,
    names: Arc<dyn NameGenerator>,
    call_timeout: Duration,
}

impl RunOperations {
    pub fn new(
        store: Arc<dyn RunStore>,
        pods: Arc<dyn PodLogSource>,
        names: Arc<dyn NameGenerator>,
    ) -> Self {
        Self {
            store,
            pods,
            names,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Operations against `OrtRun` resources and pods in `namespace`.
    #[must_use]
    pub fn for_cluster(client: kube::Client, namespace: &str) -> Self {
        Self::new(
            Arc::new(KubeRunStore::new(client.clone(), namespace)),
            Arc::new(KubePodLogs::new(client, namespace)),
            Arc::new(WordPairNames),
        )
    }

    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Create a run for `repo_url` under a freshly generated name.
    ///
    /// # Errors
    ///
    /// `ResourceStore` when the store rejects the object (including a name
    /// collision), `MalformedResource` if the stored object lacks identity.
    pub async fn create_run(&self, repo_url: &str) -> Result<Run> {
        let name = self.names.generate();
        info!(name = %name, repo_url = %repo_url, "Creating run");

        let object = json!({
            "apiVersion": ORT_RUN_API_VERSION,
            "kind": ORT_RUN_KIND,
            "metadata": { "name": name },
            "spec": { "repoUrl": repo_url },
        });

        let created = self
            .call(self.store.create(object))
            .await
            .map_err(OperationError::ResourceStore)?;

        Ok(translate(&created, true)?)
    }

    /// List every run, without raw resources.
    ///
    /// # Errors
    ///
    /// `ResourceStore` when listing fails, `MalformedResource` for an item
    /// without name or repository URL.
    pub async fn list_runs(&self) -> Result<Vec<Run>> {
        let items = self
            .call(self.store.list())
            .await
            .map_err(OperationError::ResourceStore)?;
        debug!(count = items.len(), "Listed runs");

        Ok(translate_list(&items)?)
    }

    /// Fetch one run, including its raw resource.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such run exists, `ResourceStore` for other store
    /// failures, `MalformedResource` when the object lacks identity.
    pub async fn get_run(&self, name: &str) -> Result<Run> {
        let raw: Value = self.call(self.store.get(name)).await?;
        Ok(translate(&raw, true)?)
    }

    /// Logs of every pod of one run stage. No matching pods is an empty bundle.
    ///
    /// # Errors
    ///
    /// `ResourceStore` when pods cannot be listed, `LogFetch` when any
    /// located pod's log cannot be read.
    pub async fn get_logs(&self, run_name: &str, stage_name: &str) -> Result<LogBundle> {
        let all_pods = self
            .call(self.pods.list_pods())
            .await
            .map_err(OperationError::ResourceStore)?;

        let located = locate_stage_pods(&all_pods, run_name, stage_name);
        debug!(
            run = %run_name,
            stage = %stage_name,
            pods = located.len(),
            "Located stage pods"
        );

        Ok(build_log_bundle(
            run_name,
            stage_name,
            &located,
            self.pods.as_ref(),
            self.call_timeout,
        )
        .await?)
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> std::result::Result<T, StoreError> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .unwrap_or(Err(StoreError::Timeout(self.call_timeout)))
    }
}
