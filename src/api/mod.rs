/// HTTP API layer
///
/// REST endpoints for saving and inspecting resource flows, reading their
/// logs (paginated or live over SSE) and feeding trigger events in.

pub mod flows;
pub mod logs;
pub mod triggers;

use crate::flow::registry::FlowRegistry;
use crate::logs::sink::LogSink;
use crate::runtime::dispatcher::TriggerDispatcher;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared handles used by every route
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FlowRegistry>,
    pub dispatcher: Arc<TriggerDispatcher>,
    pub sink: Arc<LogSink>,
}

/// All API routes
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(flows::create_flow_routes())
        .merge(logs::create_log_routes())
        .merge(triggers::create_trigger_routes())
}

/// Error response: a status code plus a JSON body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "message": message.into() }),
        }
    }

    pub fn with_body(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Log the cause and hide it from the client
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!("❌ {}: {}", context, err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
