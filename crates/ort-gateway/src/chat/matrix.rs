//! Matrix bot over the client-server API.
//!
//! The bot long-polls `/sync`, answers `m.room.message` events addressed to
//! it, and replies in the same room. Events are handled one at a time in
//! arrival order.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{dispatch, report_url, Reply, RUN_TABLE_HEADERS};
use crate::config::MatrixConfig;
use crate::model::Run;
use crate::operations::RunOperations;

/// Long-poll timeout passed to `/sync`.
const SYNC_TIMEOUT_MS: u64 = 30_000;

/// Pause after a failed sync.
const SYNC_BACKOFF: Duration = Duration::from_secs(5);

/// Errors talking to the homeserver.
#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("homeserver returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Response of `GET /_matrix/client/v3/sync`, reduced to what the bot reads.
#[derive(Debug, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    rooms: Rooms,
}

#[derive(Debug, Default, Deserialize)]
struct Rooms {
    #[serde(default)]
    join: BTreeMap<String, JoinedRoom>,
}

#[derive(Debug, Default, Deserialize)]
struct JoinedRoom {
    #[serde(default)]
    timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
struct Timeline {
    #[serde(default)]
    events: Vec<RoomEvent>,
}

#[derive(Debug, Deserialize)]
struct RoomEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    content: Value,
}

/// A text message received in a joined room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMessage {
    pub room_id: String,
    pub sender: String,
    pub body: String,
}

impl SyncResponse {
    /// Text messages in timeline order, room by room.
    #[must_use]
    pub fn messages(&self) -> Vec<RoomMessage> {
        self.rooms
            .join
            .iter()
            .flat_map(|(room_id, room)| {
                room.timeline.events.iter().filter_map(move |event| {
                    if event.event_type != "m.room.message" {
                        return None;
                    }
                    let body = event.content.get("body")?.as_str()?;
                    Some(RoomMessage {
                        room_id: room_id.clone(),
                        sender: event.sender.clone(),
                        body: body.to_string(),
                    })
                })
            })
            .collect()
    }
}

/// Minimal Matrix client-server API client.
#[derive(Clone)]
pub struct MatrixClient {
    http: reqwest::Client,
    server: String,
    user_id: String,
    access_token: String,
}

impl MatrixClient {
    #[must_use]
    pub fn new(config: &MatrixConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            server: config.server.trim_end_matches('/').to_string(),
            user_id: config.user.clone(),
            access_token: config.access_token.clone(),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The handle users address the bot with: its user id without the
    /// server name, e.g. `@ortbot` for `@ortbot:example.com`.
    #[must_use]
    pub fn handle(&self) -> &str {
        self.user_id
            .split_once(':')
            .map_or(self.user_id.as_str(), |(local, _)| local)
    }

    /// One `/sync` round trip.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn sync(
        &self,
        since: Option<&str>,
        timeout_ms: u64,
    ) -> Result<SyncResponse, MatrixError> {
        let mut query = vec![("timeout", timeout_ms.to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/_matrix/client/v3/sync", self.server))
            .bearer_auth(&self.access_token)
            .query(&query)
            .timeout(Duration::from_millis(timeout_ms) + Duration::from_secs(10))
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    /// Send a plain-text message.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn send_text(&self, room_id: &str, body: &str) -> Result<(), MatrixError> {
        self.send(room_id, json!({ "msgtype": "m.text", "body": body }))
            .await
    }

    /// Send a message with an HTML rendering and a plain-text fallback.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn send_html(&self, room_id: &str, body: &str, html: &str) -> Result<(), MatrixError> {
        self.send(
            room_id,
            json!({
                "msgtype": "m.text",
                "body": body,
                "format": "org.matrix.custom.html",
                "formatted_body": html,
            }),
        )
        .await
    }

    async fn send(&self, room_id: &str, content: Value) -> Result<(), MatrixError> {
        let txn_id = uuid::Uuid::new_v4().simple().to_string();
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{txn_id}",
            self.server,
            urlencoding::encode(room_id)
        );

        let response = self
            .http
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&content)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, MatrixError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(MatrixError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Matrix front-end for [`RunOperations`].
pub struct MatrixBot {
    client: MatrixClient,
    ops: RunOperations,
    report_base_url: String,
}

impl MatrixBot {
    #[must_use]
    pub fn new(client: MatrixClient, ops: RunOperations, report_base_url: &str) -> Self {
        Self {
            client,
            ops,
            report_base_url: report_base_url.to_string(),
        }
    }

    /// Sync forever. The first successful sync only records the position so
    /// that room history is not replayed.
    pub async fn run(self) {
        info!(
            user = %self.client.user_id(),
            handle = %self.client.handle(),
            "Matrix bot started"
        );

        let mut since: Option<String> = None;
        loop {
            let timeout_ms = if since.is_some() { SYNC_TIMEOUT_MS } else { 0 };
            match self.client.sync(since.as_deref(), timeout_ms).await {
                Ok(response) => {
                    if since.is_some() {
                        for message in response.messages() {
                            self.handle_message(&message).await;
                        }
                    }
                    since = Some(response.next_batch);
                }
                Err(e) => {
                    warn!(
                        server = %self.client.server,
                        error = %e,
                        "Failed to sync with Matrix homeserver"
                    );
                    tokio::time::sleep(SYNC_BACKOFF).await;
                }
            }
        }
    }

    /// Answer one message. Send failures are logged, not returned.
    pub async fn handle_message(&self, message: &RoomMessage) {
        if message.sender == self.client.user_id() {
            return;
        }

        let Some(reply) = dispatch(&self.ops, self.client.handle(), &message.body).await else {
            return;
        };
        debug!(room = %message.room_id, sender = %message.sender, "Answering Matrix command");

        let sent = match reply {
            Reply::Text(text) => {
                let body = format!("{} {text}", message.sender);
                self.client.send_text(&message.room_id, &body).await
            }
            Reply::Runs(runs) => {
                let html = format!(
                    "{} {}",
                    message.sender,
                    render_run_table_html(&runs, &self.report_base_url)
                );
                let body = format!(
                    "{} {}",
                    message.sender,
                    render_run_lines(&runs, &self.report_base_url)
                );
                self.client.send_html(&message.room_id, &body, &html).await
            }
        };

        if let Err(e) = sent {
            warn!(room = %message.room_id, error = %e, "Failed to send Matrix reply");
        }
    }
}

/// HTML table of runs.
#[must_use]
pub fn render_run_table_html(runs: &[Run], report_base_url: &str) -> String {
    let mut html = String::from("<table><tr>");
    for header in RUN_TABLE_HEADERS {
        html.push_str(&format!("<th>{header}</th>"));
    }
    html.push_str("</tr>");

    for run in runs {
        let repo = escape_html(&run.repo_url);
        let report = escape_html(&report_url(report_base_url, &run.name));
        html.push_str("<tr>");
        html.push_str(&format!("<td>{}</td>", escape_html(&run.name)));
        html.push_str(&format!("<td><a href=\"{repo}\">{repo}</a></td>"));
        html.push_str(&format!("<td>{}</td>", run.status.analyzer));
        html.push_str(&format!("<td>{}</td>", run.status.scanner));
        html.push_str(&format!("<td>{}</td>", run.status.reporter));
        html.push_str(&format!("<td><a href=\"{report}\">{report}</a></td>"));
        html.push_str("</tr>");
    }

    html.push_str("</table>");
    html
}

/// Plain-text fallback for clients without HTML support.
fn render_run_lines(runs: &[Run], report_base_url: &str) -> String {
    if runs.is_empty() {
        return "no runs".to_string();
    }
    runs.iter()
        .map(|run| {
            format!(
                "\n{} {} analyzer={} scanner={} reporter={} {}",
                run.name,
                run.repo_url,
                run.status.analyzer,
                run.status.scanner,
                run.status.reporter,
                report_url(report_base_url, &run.name)
            )
        })
        .collect()
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
