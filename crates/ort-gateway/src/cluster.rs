//! Kubernetes-backed implementations of the collaborator traits.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DynamicObject, ListParams, LogParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;
use crate::model::PodIdentity;
use crate::store::{PodLogSource, RunStore};

pub const ORT_RUN_GROUP: &str = "inocybe.io";
pub const ORT_RUN_VERSION: &str = "v1";
pub const ORT_RUN_API_VERSION: &str = "inocybe.io/v1";
pub const ORT_RUN_KIND: &str = "OrtRun";

/// `OrtRun` API resource definition.
#[must_use]
pub fn ort_run_api_resource() -> ApiResource {
    ApiResource {
        group: ORT_RUN_GROUP.to_string(),
        version: ORT_RUN_VERSION.to_string(),
        api_version: ORT_RUN_API_VERSION.to_string(),
        kind: ORT_RUN_KIND.to_string(),
        plural: "ortruns".to_string(),
    }
}

fn map_kube_error(err: kube::Error, name: &str) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(name.to_string()),
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(name.to_string()),
        other => StoreError::Api(other),
    }
}

/// `OrtRun` store over the dynamic Kubernetes API.
#[derive(Clone)]
pub struct KubeRunStore {
    api: Api<DynamicObject>,
    namespace: String,
}

impl KubeRunStore {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced_with(client, namespace, &ort_run_api_resource()),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl RunStore for KubeRunStore {
    async fn create(&self, mut object: Value) -> Result<Value, StoreError> {
        if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert(
                "namespace".to_string(),
                Value::String(self.namespace.clone()),
            );
        }

        let resource: DynamicObject = serde_json::from_value(object)?;
        let name = resource.metadata.name.clone().unwrap_or_default();
        debug!(name = %name, namespace = %self.namespace, "Creating OrtRun");

        let created = self
            .api
            .create(&PostParams::default(), &resource)
            .await
            .map_err(|e| map_kube_error(e, &name))?;
        Ok(serde_json::to_value(created)?)
    }

    async fn get(&self, name: &str) -> Result<Value, StoreError> {
        let run = self
            .api
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, name))?;
        Ok(serde_json::to_value(run)?)
    }

    async fn list(&self) -> Result<Vec<Value>, StoreError> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(StoreError::Api)?;

        list.items
            .into_iter()
            .map(|item| serde_json::to_value(item).map_err(StoreError::from))
            .collect()
    }
}

/// Pod directory and log reader for one namespace.
#[derive(Clone)]
pub struct KubePodLogs {
    pods: Api<Pod>,
}

impl KubePodLogs {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl PodLogSource for KubePodLogs {
    async fn list_pods(&self) -> Result<Vec<PodIdentity>, StoreError> {
        let pods = self
            .pods
            .list(&ListParams::default())
            .await
            .map_err(StoreError::Api)?;

        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .map(PodIdentity::new)
            .collect())
    }

    async fn fetch_log(&self, pod_name: &str) -> Result<String, StoreError> {
        self.pods
            .logs(pod_name, &LogParams::default())
            .await
            .map_err(|e| map_kube_error(e, pod_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ort_run_api_resource() {
        let ar = ort_run_api_resource();
        assert_eq!(ar.api_version, format!("{}/{}", ar.group, ar.version));
        assert_eq!(ar.kind, "OrtRun");
        assert_eq!(ar.plural, "ortruns");
    }

    #[test]
    fn test_map_kube_error_status_codes() {
        let api_error = |code| {
            kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: "nope".to_string(),
                reason: String::new(),
                code,
            })
        };

        assert!(matches!(
            map_kube_error(api_error(404), "x"),
            StoreError::NotFound(name) if name == "x"
        ));
        assert!(matches!(
            map_kube_error(api_error(409), "x"),
            StoreError::Conflict(_)
        ));
        assert!(matches!(map_kube_error(api_error(500), "x"), StoreError::Api(_)));
    }
}
