//! Conversion of raw `OrtRun` objects into [`Run`] read models.
//!
//! Objects arrive as untyped JSON trees because the resource's schema is not
//! enforced end-to-end. `metadata.name` and `spec.repoUrl` are mandatory;
//! the `status` section is optional and missing stages read as `Pending`.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::MalformedResource;
use crate::model::{Run, RunStatus, StageStatus};

/// Translate a single backing object.
///
/// # Errors
///
/// Returns [`MalformedResource`] when `metadata.name` or `spec.repoUrl` is
/// missing or not a string, or when the object cannot be rendered as YAML.
pub fn translate(raw: &Value, include_raw_resource: bool) -> Result<Run, MalformedResource> {
    let name = required_str(raw, "metadata", "name")?;
    if name.is_empty() {
        return Err(MalformedResource("empty metadata.name".to_string()));
    }
    let repo_url = required_str(raw, "spec", "repoUrl")?;

    let raw_resource = if include_raw_resource {
        let yaml = serde_yaml::to_string(raw).map_err(|e| {
            MalformedResource(format!("cannot render {name} as YAML: {e}"))
        })?;
        Some(yaml)
    } else {
        None
    };

    Ok(Run {
        name: name.to_string(),
        repo_url: repo_url.to_string(),
        status: run_status(raw),
        raw_resource,
    })
}

/// Translate a listing of backing objects, preserving order.
///
/// Items whose `metadata` section is absent or not a map, or whose `status`
/// section is present but not a map, are skipped with a warning. A missing
/// name or repository URL on an otherwise well-shaped item is an error.
///
/// # Errors
///
/// Returns the first [`MalformedResource`] encountered.
pub fn translate_list(items: &[Value]) -> Result<Vec<Run>, MalformedResource> {
    let mut runs = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        if let Some(reason) = shape_problem(item) {
            warn!(index, reason, "Skipping OrtRun with unexpected shape");
            continue;
        }
        runs.push(translate(item, false)?);
    }

    Ok(runs)
}

/// Stage statuses of a backing object. Never fails.
#[must_use]
pub fn run_status(raw: &Value) -> RunStatus {
    let Some(status) = raw.get("status").and_then(Value::as_object) else {
        return RunStatus::default();
    };

    RunStatus {
        analyzer: stage(status, "analyzer"),
        scanner: stage(status, "scanner"),
        reporter: stage(status, "reporter"),
    }
}

fn stage(status: &Map<String, Value>, key: &str) -> StageStatus {
    status
        .get(key)
        .and_then(Value::as_str)
        .map(StageStatus::from_status_str)
        .unwrap_or_default()
}

fn required_str<'a>(
    raw: &'a Value,
    section: &str,
    field: &str,
) -> Result<&'a str, MalformedResource> {
    raw.get(section)
        .and_then(|s| s.get(field))
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedResource(format!("missing string field {section}.{field}")))
}

fn shape_problem(item: &Value) -> Option<&'static str> {
    match item.get("metadata") {
        None => return Some("no metadata section"),
        Some(Value::Object(_)) => {}
        Some(_) => return Some("metadata is not a map"),
    }

    match item.get("status") {
        None | Some(Value::Null | Value::Object(_)) => None,
        Some(_) => Some("status is not a map"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ort_run(name: &str, status: Value) -> Value {
        json!({
            "apiVersion": "inocybe.io/v1",
            "kind": "OrtRun",
            "metadata": { "name": name, "namespace": "ort" },
            "spec": { "repoUrl": format!("https://example.com/{name}") },
            "status": status
        })
    }

    #[test]
    fn test_recognized_stage_strings() {
        let raw = ort_run(
            "brave-turing",
            json!({ "analyzer": "Succeeded", "scanner": "Failed", "reporter": "Aborted" }),
        );

        let run = translate(&raw, false).unwrap();
        assert_eq!(run.name, "brave-turing");
        assert_eq!(run.repo_url, "https://example.com/brave-turing");
        assert_eq!(run.status.analyzer, StageStatus::Succeeded);
        assert_eq!(run.status.scanner, StageStatus::Failed);
        assert_eq!(run.status.reporter, StageStatus::Aborted);
        assert!(run.raw_resource.is_none());
    }

    #[test]
    fn test_unrecognized_and_absent_stages_are_pending() {
        let raw = ort_run("calm-hopper", json!({ "analyzer": "Running", "scanner": "Exploded" }));

        let status = translate(&raw, false).unwrap().status;
        assert_eq!(status.analyzer, StageStatus::Running);
        assert_eq!(status.scanner, StageStatus::Pending);
        assert_eq!(status.reporter, StageStatus::Pending);
    }

    #[test]
    fn test_non_string_stage_is_pending() {
        let raw = ort_run("calm-hopper", json!({ "analyzer": 3, "scanner": ["Running"] }));
        assert_eq!(translate(&raw, false).unwrap().status, RunStatus::default());
    }

    #[test]
    fn test_missing_or_malformed_status_never_fails() {
        let mut raw = ort_run("calm-hopper", Value::Null);
        raw.as_object_mut().unwrap().remove("status");
        assert_eq!(translate(&raw, false).unwrap().status, RunStatus::default());

        let raw = ort_run("calm-hopper", json!("Running"));
        assert_eq!(translate(&raw, false).unwrap().status, RunStatus::default());
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let raw = json!({ "metadata": { "namespace": "ort" }, "spec": { "repoUrl": "https://x" } });
        let err = translate(&raw, false).unwrap_err();
        assert!(err.0.contains("metadata.name"));

        let raw = json!({ "metadata": { "name": 42 }, "spec": { "repoUrl": "https://x" } });
        assert!(translate(&raw, false).is_err());

        let raw = json!({ "spec": { "repoUrl": "https://x" } });
        assert!(translate(&raw, false).is_err());
    }

    #[test]
    fn test_missing_repo_url_is_malformed() {
        let raw = json!({ "metadata": { "name": "calm-hopper" }, "spec": {} });
        let err = translate(&raw, false).unwrap_err();
        assert!(err.0.contains("spec.repoUrl"));

        let raw = json!({ "metadata": { "name": "calm-hopper" } });
        assert!(translate(&raw, false).is_err());

        let raw = json!({ "metadata": { "name": "calm-hopper" }, "spec": { "repoUrl": true } });
        assert!(translate(&raw, false).is_err());
    }

    #[test]
    fn test_raw_resource_is_yaml() {
        let raw = ort_run("brave-turing", json!({ "analyzer": "Running" }));
        let run = translate(&raw, true).unwrap();

        let yaml = run.raw_resource.unwrap();
        assert!(yaml.contains("kind: OrtRun"));
        assert!(yaml.contains("name: brave-turing"));

        let parsed: Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, raw);
    }

    #[test]
    fn test_list_preserves_order_without_raw_resource() {
        let items = vec![
            ort_run("a-one", json!({})),
            ort_run("b-two", json!({ "scanner": "Running" })),
            ort_run("c-three", Value::Null),
        ];

        let runs = translate_list(&items).unwrap();
        let names: Vec<_> = runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a-one", "b-two", "c-three"]);
        assert!(runs.iter().all(|r| r.raw_resource.is_none()));
        assert_eq!(runs[1].status.scanner, StageStatus::Running);
    }

    #[test]
    fn test_list_skips_wrongly_shaped_items() {
        let items = vec![
            ort_run("a-one", json!({})),
            json!({ "metadata": "nope", "spec": { "repoUrl": "https://x" } }),
            json!({ "spec": { "repoUrl": "https://x" } }),
            ort_run("b-two", json!(["Running"])),
            ort_run("c-three", json!({})),
        ];

        let runs = translate_list(&items).unwrap();
        let names: Vec<_> = runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a-one", "c-three"]);
    }

    #[test]
    fn test_list_propagates_missing_identity() {
        let items = vec![
            ort_run("a-one", json!({})),
            json!({ "metadata": { "namespace": "ort" }, "spec": { "repoUrl": "https://x" } }),
        ];
        assert!(translate_list(&items).is_err());

        let items = vec![json!({ "metadata": { "name": "a-one" }, "spec": {} })];
        assert!(translate_list(&items).is_err());
    }

    #[test]
    fn test_empty_list() {
        assert!(translate_list(&[]).unwrap().is_empty());
    }
}
