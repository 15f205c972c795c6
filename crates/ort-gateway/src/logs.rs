//! Locating the pods of a run stage and collecting their logs.
//!
//! Pods are matched by name: the pipeline executor names stage pods
//! `<stage>-<run>-...`. There is no label or owner-reference lookup, so runs
//! whose names share a prefix (`foo` and `foo-bar`) can see each other's pods.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{LogError, StoreError};
use crate::model::{LogBundle, PodIdentity, PodLogEntry};
use crate::store::PodLogSource;

/// Name prefix shared by the pods of one run stage.
#[must_use]
pub fn stage_pod_prefix(run_name: &str, stage_name: &str) -> String {
    format!("{stage_name}-{run_name}")
}

/// Pods belonging to `(run_name, stage_name)`, in the order given.
#[must_use]
pub fn locate_stage_pods(
    all_pods: &[PodIdentity],
    run_name: &str,
    stage_name: &str,
) -> Vec<PodIdentity> {
    let prefix = stage_pod_prefix(run_name, stage_name);
    all_pods
        .iter()
        .filter(|pod| pod.name.starts_with(&prefix))
        .cloned()
        .collect()
}

/// Fetch the log of every pod in `pods` and bundle them.
///
/// # Errors
///
/// Fails on the first pod whose log cannot be fetched within `deadline`;
/// no partial bundle is returned.
pub async fn build_log_bundle(
    run_name: &str,
    stage_name: &str,
    pods: &[PodIdentity],
    source: &dyn PodLogSource,
    deadline: Duration,
) -> Result<LogBundle, LogError> {
    let mut pod_logs = Vec::with_capacity(pods.len());

    for pod in pods {
        let fetched = match tokio::time::timeout(deadline, source.fetch_log(&pod.name)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(deadline)),
        };

        let logs = fetched.map_err(|err| {
            warn!(pod = %pod.name, error = %err, "Failed to fetch pod logs");
            LogError {
                pod: pod.name.clone(),
                source: err,
            }
        })?;

        debug!(pod = %pod.name, bytes = logs.len(), "Fetched pod logs");
        pod_logs.push(PodLogEntry {
            pod_name: pod.name.clone(),
            pod_logs: logs,
        });
    }

    Ok(LogBundle {
        run_name: run_name.to_string(),
        run_stage: stage_name.to_string(),
        pod_logs,
    })
}
