//! HTTP API over [`RunOperations`].
//!
//! Routes:
//! - `GET /runs`, `POST /runs`
//! - `GET /runs/{name}`
//! - `GET /logs/{name}/{stage}`
//! - `GET /health`
//!
//! Every API response carries permissive CORS headers naming the route's
//! methods; `OPTIONS` answers `204` and other methods answer `405`. Malformed
//! paths under `/runs/` or `/logs/` answer `400`, unknown paths `404`, both
//! with the same headers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{
        header::{ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN},
        StatusCode, Uri,
    },
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, warn, Level};

use crate::error::OperationError;
use crate::model::RunList;
use crate::operations::RunOperations;

const RUNS_METHODS: &str = "GET,POST";
const READ_METHODS: &str = "GET";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    ops: RunOperations,
}

impl AppState {
    #[must_use]
    pub fn new(ops: RunOperations) -> Self {
        Self { ops }
    }

    /// Operations handle for one request.
    #[must_use]
    pub fn operations(&self) -> RunOperations {
        self.ops.clone()
    }
}

/// Payload of `POST /runs`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub repo_url: String,
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/runs",
            get(list_runs_handler)
                .post(create_run_handler)
                .options(|| async { preflight(RUNS_METHODS) })
                .fallback(|| async { status_only(StatusCode::METHOD_NOT_ALLOWED, RUNS_METHODS) }),
        )
        .route(
            "/runs/{name}",
            get(get_run_handler)
                .options(|| async { preflight(READ_METHODS) })
                .fallback(|| async { status_only(StatusCode::METHOD_NOT_ALLOWED, READ_METHODS) }),
        )
        .route(
            "/logs/{name}/{stage}",
            get(get_logs_handler)
                .options(|| async { preflight(READ_METHODS) })
                .fallback(|| async { status_only(StatusCode::METHOD_NOT_ALLOWED, READ_METHODS) }),
        )
        .route("/health", get(health_check))
        .fallback(unmatched_path)
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            ),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Incomplete or extra path segments under an API prefix are a bad request;
/// anything else is not found.
async fn unmatched_path(uri: Uri) -> Response {
    let path = uri.path();
    if path.starts_with("/runs/") || path.starts_with("/logs/") {
        status_only(StatusCode::BAD_REQUEST, READ_METHODS)
    } else {
        status_only(StatusCode::NOT_FOUND, READ_METHODS)
    }
}

async fn list_runs_handler(State(state): State<AppState>) -> Response {
    match state.operations().list_runs().await {
        Ok(runs) => json_response(StatusCode::OK, READ_METHODS, &RunList::from(runs)),
        Err(e) => error_response(&e, READ_METHODS),
    }
}

async fn create_run_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: CreateRunRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Malformed create run payload");
            return status_only(StatusCode::BAD_REQUEST, RUNS_METHODS);
        }
    };

    match state.operations().create_run(&request.repo_url).await {
        Ok(run) => json_response(StatusCode::CREATED, RUNS_METHODS, &run),
        Err(e) => error_response(&e, RUNS_METHODS),
    }
}

async fn get_run_handler(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.operations().get_run(&name).await {
        Ok(run) => json_response(StatusCode::OK, READ_METHODS, &run),
        Err(e) => error_response(&e, READ_METHODS),
    }
}

async fn get_logs_handler(
    State(state): State<AppState>,
    Path((name, stage)): Path<(String, String)>,
) -> Response {
    match state.operations().get_logs(&name, &stage).await {
        Ok(bundle) => json_response(StatusCode::OK, READ_METHODS, &bundle),
        Err(e) => error_response(&e, READ_METHODS),
    }
}

fn cors_headers(allowed_methods: &'static str) -> [(axum::http::HeaderName, &'static str); 2] {
    [
        (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (ACCESS_CONTROL_ALLOW_METHODS, allowed_methods),
    ]
}

fn preflight(allowed_methods: &'static str) -> Response {
    status_only(StatusCode::NO_CONTENT, allowed_methods)
}

fn status_only(status: StatusCode, allowed_methods: &'static str) -> Response {
    (status, cors_headers(allowed_methods)).into_response()
}

fn json_response<T: serde::Serialize>(
    status: StatusCode,
    allowed_methods: &'static str,
    body: &T,
) -> Response {
    (status, cors_headers(allowed_methods), Json(body)).into_response()
}

/// Errors become bare status codes; details stay in the log.
fn error_response(err: &OperationError, allowed_methods: &'static str) -> Response {
    let status = match err {
        OperationError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, "Run operation failed");
    } else {
        warn!(error = %err, "Run operation failed");
    }
    status_only(status, allowed_methods)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_run_request_requires_repo_url() {
        let request: CreateRunRequest =
            serde_json::from_str(r#"{"repoUrl":"https://example.com/repo"}"#).unwrap();
        assert_eq!(request.repo_url, "https://example.com/repo");

        assert!(serde_json::from_str::<CreateRunRequest>(r#"{"repo":"x"}"#).is_err());
        assert!(serde_json::from_str::<CreateRunRequest>("not json").is_err());
    }

    #[tokio::test]
    async fn test_unmatched_paths_keep_cors_headers() {
        let response = unmatched_path(Uri::from_static("/logs/brave-turing")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let response = unmatched_path(Uri::from_static("/nowhere")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn test_error_status_codes() {
        let response = error_response(&OperationError::NotFound("x".to_string()), READ_METHODS);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let err = OperationError::ResourceStore(crate::error::StoreError::Other("down".into()));
        let response = error_response(&err, RUNS_METHODS);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_METHODS], "GET,POST");
    }
}
