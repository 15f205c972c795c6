//! Slack bot over the Events API.
//!
//! `POST /slack/events` verifies the request signature and forwards
//! `app_mention` events over a channel to [`SlackBot::run`], which answers
//! them one at a time through `chat.postMessage`.

use std::fmt::Write as _;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::{dispatch, report_url, Reply, RUN_TABLE_HEADERS};
use crate::config::SlackConfig;
use crate::model::Run;
use crate::operations::RunOperations;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed request, in seconds.
const MAX_REQUEST_AGE_SECS: i64 = 300;

/// Capacity of the queue between the events endpoint and the bot worker.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Errors talking to the Slack Web API.
#[derive(Debug, Error)]
pub enum SlackError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Slack API error: {0}")]
    Api(String),
}

/// An `app_mention` event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppMention {
    pub channel: String,
    #[serde(default)]
    pub user: String,
    pub text: String,
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum EventEnvelope {
    #[serde(rename = "url_verification")]
    UrlVerification { challenge: String },
    #[serde(rename = "event_callback")]
    EventCallback { event: Value },
    #[serde(other)]
    Other,
}

/// Verify `X-Slack-Signature` for a request body.
#[must_use]
pub fn verify_signature(secret: &str, timestamp: &str, body: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("v0=") else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    computed.as_slice().ct_eq(&signature_bytes).into()
}

/// Whether a request timestamp (seconds) is recent enough to accept.
#[must_use]
pub fn validate_timestamp(timestamp_secs: i64) -> bool {
    let now = chrono::Utc::now().timestamp();
    (now - timestamp_secs).abs() <= MAX_REQUEST_AGE_SECS
}

/// Replace Slack link markup (`<https://x>`, `<https://x|label>`) with the
/// bare URL and decode the `&amp;`, `&lt;` and `&gt;` escapes Slack applies to
/// message text. User, channel and special mentions are left as they are.
#[must_use]
pub fn unwrap_links(text: &str) -> String {
    decode_entities(&unwrap_link_markup(text))
}

fn unwrap_link_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let inner = &after[..end];
        if inner.starts_with(['@', '#', '!']) {
            out.push('<');
            out.push_str(inner);
            out.push('>');
        } else {
            out.push_str(inner.split_once('|').map_or(inner, |(url, _)| url));
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

// `&amp;` goes last so `&amp;lt;` stays a literal `&lt;`.
fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// State of the events endpoint.
#[derive(Clone)]
pub struct SlackEventsState {
    signing_secret: String,
    events: mpsc::Sender<AppMention>,
}

impl SlackEventsState {
    #[must_use]
    pub fn new(signing_secret: &str, events: mpsc::Sender<AppMention>) -> Self {
        Self {
            signing_secret: signing_secret.to_string(),
            events,
        }
    }
}

/// Router serving `POST /slack/events`.
pub fn router(state: SlackEventsState) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle an Events API request.
pub async fn slack_events_handler(
    State(state): State<SlackEventsState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let (Some(timestamp), Some(signature)) = (
        header("x-slack-request-timestamp"),
        header("x-slack-signature"),
    ) else {
        warn!("Slack request without signature headers");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if !timestamp.parse::<i64>().is_ok_and(validate_timestamp) {
        warn!(timestamp, "Stale Slack request");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if !verify_signature(&state.signing_secret, timestamp, &body, signature) {
        warn!("Invalid Slack request signature");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let envelope: EventEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Failed to parse Slack event");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match envelope {
        EventEnvelope::UrlVerification { challenge } => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        EventEnvelope::EventCallback { event } => {
            if let Some(retry) = header("x-slack-retry-num") {
                debug!(retry, "Ignoring redelivered Slack event");
                return StatusCode::OK.into_response();
            }

            if event.get("type").and_then(Value::as_str) != Some("app_mention") {
                debug!("Ignoring Slack event that is not an app mention");
                return StatusCode::OK.into_response();
            }

            match serde_json::from_value::<AppMention>(event) {
                Ok(mention) => {
                    if let Err(e) = state.events.try_send(mention) {
                        warn!(error = %e, "Dropping Slack mention, bot queue unavailable");
                    }
                }
                Err(e) => warn!(error = %e, "Malformed app_mention event"),
            }
            StatusCode::OK.into_response()
        }
        EventEnvelope::Other => StatusCode::OK.into_response(),
    }
}

/// Minimal Slack Web API client.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base_url: String,
    bot_token: String,
}

impl SlackClient {
    #[must_use]
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        }
    }

    /// User id of the bot, from `auth.test`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or when Slack rejects the token.
    pub async fn bot_user_id(&self) -> Result<String, SlackError> {
        let response = self.call("auth.test", &json!({})).await?;
        response
            .get("user_id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| SlackError::Api("auth.test returned no user_id".to_string()))
    }

    /// Post a message, threaded under `thread_ts` when given.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or when Slack rejects the message.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), SlackError> {
        let mut payload = json!({ "channel": channel, "text": text });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = Value::from(ts);
        }
        self.call("chat.postMessage", &payload).await?;
        Ok(())
    }

    async fn call(&self, api_method: &str, payload: &Value) -> Result<Value, SlackError> {
        let response: Value = self
            .http
            .post(format!("{}/{api_method}", self.api_base_url))
            .bearer_auth(&self.bot_token)
            .json(payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(response)
        } else {
            let error = response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            Err(SlackError::Api(format!("{api_method}: {error}")))
        }
    }
}

/// Slack front-end for [`RunOperations`].
pub struct SlackBot {
    client: SlackClient,
    ops: RunOperations,
    handle: String,
    report_base_url: String,
}

impl SlackBot {
    /// Bot addressed as `<@bot_user_id>`.
    #[must_use]
    pub fn new(
        client: SlackClient,
        ops: RunOperations,
        bot_user_id: &str,
        report_base_url: &str,
    ) -> Self {
        Self {
            client,
            ops,
            handle: format!("<@{bot_user_id}>"),
            report_base_url: report_base_url.to_string(),
        }
    }

    /// Answer mentions in arrival order until the sending side closes.
    pub async fn run(self, mut events: mpsc::Receiver<AppMention>) {
        info!(handle = %self.handle, "Slack bot started");
        while let Some(mention) = events.recv().await {
            self.handle_mention(&mention).await;
        }
        info!("Slack event queue closed, bot stopping");
    }

    /// Answer one mention. Send failures are logged, not returned.
    pub async fn handle_mention(&self, mention: &AppMention) {
        let text = unwrap_links(&mention.text);
        let Some(reply) = dispatch(&self.ops, &self.handle, &text).await else {
            debug!(channel = %mention.channel, "Mention not addressed to the bot");
            return;
        };

        let rendered = match reply {
            Reply::Text(text) if text.contains('\n') => format!("```{text}```"),
            Reply::Text(text) => text,
            Reply::Runs(runs) => render_run_table(&runs, &self.report_base_url),
        };
        let message = if mention.user.is_empty() {
            rendered
        } else {
            format!("<@{}> {rendered}", mention.user)
        };

        let thread = mention.thread_ts.as_deref().unwrap_or(&mention.ts);
        if let Err(e) = self
            .client
            .post_message(&mention.channel, &message, Some(thread))
            .await
        {
            warn!(channel = %mention.channel, error = %e, "Failed to send Slack reply");
        }
    }
}

/// Monospaced table of runs in a code block.
#[must_use]
pub fn render_run_table(runs: &[Run], report_base_url: &str) -> String {
    let rows: Vec<[String; 6]> = runs
        .iter()
        .map(|run| {
            [
                run.name.clone(),
                run.repo_url.clone(),
                run.status.analyzer.to_string(),
                run.status.scanner.to_string(),
                run.status.reporter.to_string(),
                report_url(report_base_url, &run.name),
            ]
        })
        .collect();

    let mut widths = RUN_TABLE_HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut table = String::from("```\n");
    let mut push_row = |cells: &[&str]| {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(table, "{}", line.trim_end());
    };

    push_row(&RUN_TABLE_HEADERS);
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        push_row(&cells);
    }

    table.push_str("```");
    table
}
