//! Read models for `OrtRun` resources and their pod logs.
//!
//! These types are rebuilt from the resource store on every request and
//! serialize to the JSON shapes served by the HTTP API.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Status of a single pipeline stage.
///
/// Unrecognized values coming from the cluster map to [`StageStatus::Pending`];
/// the resource's status vocabulary is owned by the pipeline executor, not us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl StageStatus {
    /// All stage states, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Running,
        Self::Succeeded,
        Self::Failed,
        Self::Aborted,
    ];

    /// Parse a status string. Exact, case-sensitive match; anything else is `Pending`.
    #[must_use]
    pub fn from_status_str(s: &str) -> Self {
        match s {
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Aborted" => Self::Aborted,
            _ => Self::Pending,
        }
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Aborted => "Aborted",
        }
    }
}

impl From<&str> for StageStatus {
    fn from(s: &str) -> Self {
        Self::from_status_str(s)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StageStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StageStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_status_str(&raw))
    }
}

/// Per-stage status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunStatus {
    #[serde(default)]
    pub analyzer: StageStatus,
    #[serde(default)]
    pub scanner: StageStatus,
    #[serde(default)]
    pub reporter: StageStatus,
}

/// One scan pipeline run, as reported by its backing resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    /// Resource name, unique within the namespace.
    pub name: String,
    /// Repository being scanned.
    pub repo_url: String,
    pub status: RunStatus,
    /// YAML rendering of the backing resource. Only set for single-run views.
    #[serde(
        rename = "kubernetesResource",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw_resource: Option<String>,
}

/// Wire shape for `GET /runs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunList {
    pub runs: Vec<Run>,
}

impl From<Vec<Run>> for RunList {
    fn from(runs: Vec<Run>) -> Self {
        Self { runs }
    }
}

/// Minimal pod identity used for log lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodIdentity {
    pub name: String,
}

impl PodIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Log text of a single pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodLogEntry {
    pub pod_name: String,
    pub pod_logs: String,
}

/// Logs of every pod belonging to one stage of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBundle {
    pub run_name: String,
    pub run_stage: String,
    pub pod_logs: Vec<PodLogEntry>,
}

impl LogBundle {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pod_logs.is_empty()
    }
}
