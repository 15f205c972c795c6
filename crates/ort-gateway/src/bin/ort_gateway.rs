/*
 * 5D Labs Agent Platform - ORT Gateway
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! ORT Gateway - HTTP API and chat bots for `OrtRun` resources
//!
//! Runs up to three independent front-ends over the same run operations:
//! - the HTTP JSON API (always)
//! - the Matrix bot (when `MATRIX_*` is configured)
//! - the Slack bot (when `SLACK_*` is configured)

use anyhow::{Context, Result};
use ort_gateway::chat::matrix::{MatrixBot, MatrixClient};
use ort_gateway::chat::slack::{self, SlackBot, SlackClient, SlackEventsState, EVENT_QUEUE_CAPACITY};
use ort_gateway::server::{build_router, AppState};
use ort_gateway::{Config, RunOperations};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ort_gateway=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting ORT Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!(namespace = %config.namespace, "Connected to Kubernetes cluster");

    let ops = RunOperations::for_cluster(client, &config.namespace)
        .with_call_timeout(config.call_timeout);

    let mut bots: Vec<JoinHandle<()>> = Vec::new();
    let mut app = build_router(AppState::new(ops.clone()));

    if let Some(matrix) = &config.matrix {
        let bot = MatrixBot::new(MatrixClient::new(matrix), ops.clone(), &config.report_base_url);
        bots.push(tokio::spawn(bot.run()));
        info!(server = %matrix.server, "Matrix bot enabled");
    }

    if let Some(slack_config) = &config.slack {
        let client = SlackClient::new(slack_config);
        let bot_user_id = client
            .bot_user_id()
            .await
            .context("Failed to identify Slack bot user")?;

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let bot = SlackBot::new(client, ops.clone(), &bot_user_id, &config.report_base_url);
        bots.push(tokio::spawn(bot.run(rx)));
        app = app.merge(slack::router(SlackEventsState::new(
            &slack_config.signing_secret,
            tx,
        )));
        info!(bot_user_id = %bot_user_id, "Slack bot enabled");
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("ORT Gateway HTTP server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    for bot in bots {
        bot.abort();
    }
    info!("ORT Gateway stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
