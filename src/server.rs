//! Local HTTP status API for the posture dashboard.
//!
//! This module provides an HTTP server that:
//! - Serves the latest [`StatusSnapshot`] via GET /api/posture/current, with
//!   the `postureScore`, `distance` and `sessionStats` fields the dashboard reads
//! - Forwards dashboard buttons (break, snooze, privacy) to the agent loop
//! - Validates settings changes (POST /api/settings/update) before the agent
//!   sees them
//!
//! # Architecture
//!
//! ```text
//! Dashboard ──→ GET  /api/posture/current ──→ [StatusSnapshot] ◀── agent loop
//!           ──→ POST /api/break|snooze|privacy ──→ [Command channel] ──→ agent loop
//!           ──→ POST /api/settings/update ──→ validate ──→ [Command channel]
//! ```

use crate::config::{Config, SettingsUpdate};
use crate::runtime::{read_status, Command, SessionStats, SharedStatus, StatusSnapshot};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Address to bind to
    pub bind: IpAddr,
    /// Snapshot published by the agent loop
    pub status: SharedStatus,
    /// Command channel into the agent loop
    pub commands: Sender<Command>,
    /// Configuration the agent started with; settings updates merge onto it
    pub settings: Config,
}

impl ServerConfig {
    /// Create a server configuration bound to localhost.
    pub fn new(port: u16, status: SharedStatus, commands: Sender<Command>) -> Self {
        Self {
            port,
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            status,
            commands,
            settings: Config::default(),
        }
    }

    /// Use the agent's running configuration as the base for settings updates.
    pub fn with_settings(mut self, settings: Config) -> Self {
        self.settings = settings;
        self
    }

    /// Bind to another address (e.g. `0.0.0.0` to serve the LAN).
    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }
}

/// Shared server state
struct ServerState {
    status: SharedStatus,
    commands: Sender<Command>,
    settings: Mutex<Config>,
}

impl ServerState {
    fn send(&self, command: Command) -> Result<Json<CommandResponse>, ApiFailure> {
        self.commands.send(command).map_err(|_| {
            tracing::warn!(?command, "Agent loop is not accepting commands");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "Agent loop is not running".to_string(),
                    code: "AGENT_UNAVAILABLE".to_string(),
                }),
            )
        })?;

        tracing::debug!(?command, "Command forwarded from status API");
        Ok(Json(CommandResponse {
            status: "ok".to_string(),
            command,
        }))
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response to a dashboard button
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
    pub command: Command,
}

/// GET /api/posture/current body: the snapshot plus the dashboard's fields
#[derive(Debug, Serialize)]
pub struct CurrentPosture {
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    /// 0-100, higher is better
    #[serde(rename = "postureScore")]
    pub posture_score: Option<u8>,
    /// Last ranger reading in cm
    pub distance: Option<i32>,
    #[serde(rename = "sessionStats")]
    pub session_stats: SessionStats,
}

impl From<StatusSnapshot> for CurrentPosture {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self {
            posture_score: snapshot.posture_score,
            distance: snapshot.posture_value,
            session_stats: snapshot.session,
            snapshot,
        }
    }
}

/// Body of POST /api/privacy. An empty body toggles privacy mode.
#[derive(Debug, Serialize, Deserialize)]
pub struct PrivacyRequest {
    pub enabled: bool,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiFailure = (StatusCode, Json<ErrorResponse>);

fn unprocessable(error: String, code: &str) -> ApiFailure {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/posture/current
async fn posture_current(State(state): State<Arc<ServerState>>) -> Json<CurrentPosture> {
    Json(read_status(&state.status).into())
}

/// POST /api/break
async fn take_break(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<CommandResponse>, ApiFailure> {
    state.send(Command::Acknowledge)
}

/// POST /api/snooze
async fn snooze(State(state): State<Arc<ServerState>>) -> Result<Json<CommandResponse>, ApiFailure> {
    state.send(Command::Snooze)
}

/// POST /api/privacy
async fn privacy(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<CommandResponse>, ApiFailure> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return state.send(Command::TogglePrivacy);
    }
    let request: PrivacyRequest = serde_json::from_slice(&body)
        .map_err(|e| unprocessable(format!("Invalid privacy request: {e}"), "INVALID_BODY"))?;
    state.send(Command::SetPrivacy {
        enabled: request.enabled,
    })
}

/// POST /api/settings/update
async fn update_settings(
    State(state): State<Arc<ServerState>>,
    Json(settings): Json<SettingsUpdate>,
) -> Result<Json<CommandResponse>, ApiFailure> {
    let mut current = state.settings.lock().unwrap_or_else(PoisonError::into_inner);
    let next = settings
        .apply_to(&current)
        .map_err(|e| unprocessable(e.to_string(), "INVALID_SETTINGS"))?;
    let response = state.send(Command::UpdateSettings { settings })?;
    *current = Config::clone(&next);
    Ok(response)
}

/// Build the router (without binding).
fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/posture/current", get(posture_current))
        .route("/api/break", post(take_break))
        .route("/api/snooze", post(snooze))
        .route("/api/privacy", post(privacy))
        .route("/api/settings/update", post(update_settings))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState {
        status: config.status,
        commands: config.commands,
        settings: Mutex::new(config.settings),
    });
    let app = router(state);

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Status API listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
