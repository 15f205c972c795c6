//! Error types for run operations and their collaborators.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a [`RunStore`](crate::store::RunStore) or
/// [`PodLogSource`](crate::store::PodLogSource).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// An object with the same name already exists
    #[error("{0} already exists")]
    Conflict(String),

    /// The call did not return within the configured deadline
    #[error("call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Kubernetes API failure
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Object could not be converted to or from its JSON tree
    #[error("Serialization error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failure to read the log of a located pod.
#[derive(Debug, Error)]
#[error("failed to fetch logs of pod {pod}: {source}")]
pub struct LogError {
    pub pod: String,
    #[source]
    pub source: StoreError,
}

/// A backing object is missing one of its mandatory identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed OrtRun resource: {0}")]
pub struct MalformedResource(pub String);

/// Errors surfaced to the HTTP API and chat bots.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    MalformedResource(#[from] MalformedResource),

    #[error("run {0} not found")]
    NotFound(String),

    #[error("resource store error: {0}")]
    ResourceStore(#[source] StoreError),

    #[error(transparent)]
    LogFetch(#[from] LogError),
}

impl From<StoreError> for OperationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => Self::NotFound(name),
            other => Self::ResourceStore(other),
        }
    }
}

pub type Result<T, E = OperationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_store_error_maps_to_not_found() {
        let err = OperationError::from(StoreError::NotFound("brave-turing".to_string()));
        assert!(matches!(err, OperationError::NotFound(ref name) if name == "brave-turing"));
        assert_eq!(err.to_string(), "run brave-turing not found");
    }

    #[test]
    fn test_other_store_errors_map_to_resource_store() {
        let err = OperationError::from(StoreError::Timeout(Duration::from_secs(30)));
        assert!(matches!(err, OperationError::ResourceStore(_)));
        assert_eq!(
            err.to_string(),
            "resource store error: call timed out after 30s"
        );

        let err = OperationError::from(StoreError::Conflict("brave-turing".to_string()));
        assert!(matches!(err, OperationError::ResourceStore(_)));
    }
}
