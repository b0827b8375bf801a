//! `deployer-watch` -- terminal monitor for a DockerDeployer backend.
//!
//! Lists containers over the REST API, keeps a reconnecting event socket
//! open, and refreshes the listing whenever the backend reports a change
//! or the refresh interval elapses.
//!
//! # Environment variables
//!
//! Everything [`DeployerConfig::from_env`] reads, plus:
//!
//! | Variable        | Default | Description                              |
//! |-----------------|---------|------------------------------------------|
//! | `REFRESH_SECS`  | `60`    | Seconds between unconditional refreshes  |
//! | `LOG_FORMAT`    | text    | `json` for structured log lines          |
//! | `RUST_LOG`      | --      | Standard `tracing` env filter            |

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use deployer_client::models::Container;
use deployer_client::{ApiClient, ApiError, AsyncOperation, HttpErrorClassifier, RetryPolicy};
use deployer_core::{DeployerConfig, SessionContext, TracingNotifier};
use deployer_socket::{ReconnectingSocket, SocketConfig, SocketHandlers};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_REFRESH_SECS: u64 = 60;

/// Backend event types that invalidate the container listing.
const REFRESH_EVENTS: &[&str] = &[
    "container_created",
    "container_removed",
    "container_update",
    "deployment_complete",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = DeployerConfig::from_env().context("Failed to load configuration")?;
    let refresh = Duration::from_secs(
        std::env::var("REFRESH_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REFRESH_SECS),
    );

    tracing::info!(
        api_url = %config.api_base_url,
        ws_url = %config.ws_url,
        refresh_secs = refresh.as_secs(),
        "Starting deployer-watch",
    );

    let session = Arc::new(SessionContext::from_config(&config));
    let api = ApiClient::new(Arc::clone(&session), config.request_timeout())
        .context("Failed to build HTTP client")?;

    let list_containers: AsyncOperation<(), Vec<Container>, ApiError> =
        AsyncOperation::builder("list_containers", HttpErrorClassifier, move |()| {
            let api = api.clone();
            async move { api.list_containers().await }
        })
        .notifier(Arc::new(TracingNotifier))
        .retry(RetryPolicy::from(&config))
        .build();

    let (refresh_tx, refresh_rx) = mpsc::unbounded_channel::<()>();
    let handlers = SocketHandlers::new()
        .on_message(move |event| {
            let kind = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
            tracing::debug!(event_type = kind, "Backend event");
            if REFRESH_EVENTS.contains(&kind) {
                let _ = refresh_tx.send(());
            }
        })
        .on_connect(|| tracing::info!("Event stream connected"))
        .on_disconnect(|| tracing::info!("Event stream disconnected"))
        .on_error(|e| tracing::warn!(error = %e, "Event stream error"));

    let socket = ReconnectingSocket::new(
        session.ws_endpoint(),
        SocketConfig::from(&config),
        handlers,
    );

    let refresher = tokio::spawn(refresh_loop(list_containers.clone(), refresh, refresh_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    socket.disconnect();
    list_containers.shutdown();
    refresher.abort();
    tracing::info!("deployer-watch stopped");
    Ok(())
}

/// Refresh on every tick and on every invalidating backend event.
async fn refresh_loop(
    op: AsyncOperation<(), Vec<Container>, ApiError>,
    every: Duration,
    mut events: mpsc::UnboundedReceiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            Some(()) = events.recv() => {}
        }
        render(&op).await;
    }
}

async fn render(op: &AsyncOperation<(), Vec<Container>, ApiError>) {
    let Some(containers) = op.execute(()).await else {
        return;
    };

    let running = containers.iter().filter(|c| c.is_running()).count();
    tracing::info!(total = containers.len(), running, "Containers refreshed");
    for c in &containers {
        tracing::info!(
            id = c.short_id(),
            name = %c.name,
            image = %c.image,
            status = ?c.status,
            "container",
        );
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "deployer_watch=info,deployer_client=info,deployer_socket=info".into()
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
