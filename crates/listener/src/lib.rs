//! review-relay webhook receiver.
//!
//! Serves the HTTP surface of the relay:
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /` | service banner |
//! | `GET /health` | liveness check |
//! | `POST /api/github/webhook` | GitHub webhook intake |
//!
//! A webhook delivery is authenticated with its `X-Hub-Signature-256` header
//! (see [`signature`]), parsed as JSON, and handed to the intake queue as a
//! [`lifecycle::IntakeEvent`]. The handler answers `202 Accepted` without
//! waiting for intake; whether the event turns into a task is decided later by
//! the [`lifecycle::IntakeWorker`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP framing and signature checks live here. The
//! [`pipeline`] crate never sees headers or raw bodies.

pub mod signature;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use lifecycle::{IntakeEvent, IntakeSender, SubmitError};
use pipeline::DeliveryId;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const SERVICE_NAME: &str = "review-relay";
pub const WEBHOOK_PATH: &str = "/api/github/webhook";

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";
const DELIVERY_HEADER: &str = "x-github-delivery";

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct AppState {
    secret: Arc<str>,
    queue: IntakeSender,
}

impl AppState {
    pub fn new(secret: impl Into<Arc<str>>, queue: IntakeSender) -> Self {
        Self {
            secret: secret.into(),
            queue,
        }
    }
}

/// Builds the router for all relay routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(WEBHOOK_PATH, post(github_webhook))
        .with_state(state)
}

/// Serves the relay routes on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "Webhook server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("Webhook server stopped");
    Ok(())
}

pub async fn root() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// `POST /api/github/webhook`.
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !signature::verify(&body, header(&headers, SIGNATURE_HEADER), &state.secret) {
        warn!("Rejected webhook with invalid signature");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "invalid signature" })),
        );
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Rejected webhook with invalid JSON body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid JSON payload" })),
            );
        }
    };

    let event_type = header(&headers, EVENT_HEADER).unwrap_or("unknown").to_string();
    let delivery_id = DeliveryId::from_header_or_random(header(&headers, DELIVERY_HEADER));
    debug!(delivery_id = %delivery_id, event_type = %event_type, "Webhook accepted");

    let event = IntakeEvent {
        delivery_id,
        event_type: event_type.clone(),
        payload,
    };
    match state.queue.submit(event) {
        Ok(()) => {}
        Err(SubmitError::Full) => {
            error!(delivery_id = %delivery_id, "Intake queue full; dropping webhook event");
        }
        Err(SubmitError::Closed) => {
            error!(delivery_id = %delivery_id, "Intake worker stopped; dropping webhook event");
        }
    }

    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "event": event_type })),
    )
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
