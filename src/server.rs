//! Local HTTP endpoint for in-page producers.
//!
//! A browser extension running inside AI tool pages cannot reach the agent's
//! buffer directly. It posts here instead:
//! - `POST /events` accepts one raw telemetry event or an array of them
//! - `POST /page-events` forwards page input to the prompt detector
//! - `GET /stats` reports buffer and transparency counters
//!
//! # Architecture
//!
//! ```text
//! Browser Extension ──→ POST /events ──────→ DeliveryBuffer ──→ Sink
//!                   └─→ POST /page-events ─→ InputContext ──→ PromptDetector
//! ```

use crate::delivery::{BufferStats, DeliveryBuffer};
use crate::monitor::{InputContext, PageEvent};
use crate::transparency::{SharedTransparencyLog, TransparencyStats};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to on 127.0.0.1 (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    buffer: DeliveryBuffer,
    input: Option<InputContext>,
    transparency: Option<SharedTransparencyLog>,
}

impl ServerState {
    pub fn new(buffer: DeliveryBuffer) -> Self {
        Self {
            buffer,
            input: None,
            transparency: None,
        }
    }

    /// Forward `/page-events` into `input`. Without it the route answers 404.
    pub fn with_input(mut self, input: InputContext) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = Some(log);
        self
    }
}

/// Response from the events endpoint
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
}

/// Response from the page events endpoint
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResponse {
    /// How many detectors received the event
    pub delivered_to: usize,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub buffer: BufferStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<TransparencyStats>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
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

/// POST /events
///
/// Accepts a single event object or an array of them. Invalid events are
/// counted as rejected; the valid ones in the same request are still queued.
async fn ingest_events(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<IngestResponse>, ApiError> {
    let events = match body {
        serde_json::Value::Array(events) => events,
        event @ serde_json::Value::Object(_) => vec![event],
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "INVALID_BODY",
                "expected an event object or an array of events",
            ))
        }
    };

    let total = events.len();
    let accepted = events
        .into_iter()
        .map(|event| state.buffer.add_raw(event))
        .filter(|accepted| *accepted)
        .count();

    if accepted < total {
        tracing::debug!(accepted, rejected = total - accepted, "rejected posted events");
    }

    Ok(Json(IngestResponse {
        accepted,
        rejected: total - accepted,
    }))
}

/// POST /page-events
async fn dispatch_page_event(
    State(state): State<Arc<ServerState>>,
    Json(event): Json<PageEvent>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let input = state.input.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            "NO_DETECTOR",
            "prompt detection is not enabled",
        )
    })?;

    Ok(Json(DispatchResponse {
        delivered_to: input.dispatch(event),
    }))
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        buffer: state.buffer.stats(),
        transparency: state.transparency.as_ref().map(|log| log.stats()),
    })
}

/// Build the router without binding it.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", post(ingest_events))
        .route("/page-events", post(dispatch_page_event))
        .route("/stats", get(stats))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                    // Allow chrome-extension origins
                    HeaderValue::from_static("chrome-extension://"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::new(state))
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Workflow sensor server listening on http://{}", actual_addr);

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
