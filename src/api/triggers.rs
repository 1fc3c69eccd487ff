/// Trigger ingress endpoints
///
/// The surrounding application posts domain events here after it has
/// authorized them. Runs start in the background; the response carries
/// their ids so callers can follow them in the logs.

use crate::api::{ApiError, AppState};
use crate::flow::types::{ResourceId, TriggerKind};
use crate::runtime::dispatcher::TriggerEvent;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub fn create_trigger_routes() -> Router<AppState> {
    Router::new()
        .route("/api/resources/{id}/events", post(post_event))
        .route("/api/resources/{id}/flow/buttons/{node_id}/press", post(press_button))
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub kind: TriggerKind,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedRunsResponse {
    pub run_ids: Vec<String>,
}

/// POST /api/resources/{id}/events
async fn post_event(
    State(state): State<AppState>,
    Path(resource_id): Path<ResourceId>,
    Json(request): Json<EventRequest>,
) -> Result<(StatusCode, Json<StartedRunsResponse>), ApiError> {
    if request.kind == TriggerKind::ButtonPressed {
        return Err(ApiError::bad_request(
            "Button presses go through /flow/buttons/{nodeId}/press",
        ));
    }

    let runs = state
        .dispatcher
        .dispatch(resource_id, &TriggerEvent::Resource(request.kind), request.context);

    Ok((
        StatusCode::ACCEPTED,
        Json(StartedRunsResponse {
            run_ids: runs.into_iter().map(|run| run.flow_run_id).collect(),
        }),
    ))
}

/// POST /api/resources/{id}/flow/buttons/{node_id}/press
///
/// An optional JSON body becomes the run context.
async fn press_button(
    State(state): State<AppState>,
    Path((resource_id, node_id)): Path<(ResourceId, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<StartedRunsResponse>), ApiError> {
    let context = if body.is_empty() {
        json!({
            "event": { "timestamp": Utc::now().to_rfc3339() },
            "resource": { "id": resource_id },
            "button": { "nodeId": node_id },
        })
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?
    };

    let run = state
        .dispatcher
        .press_button(resource_id, &node_id, context)
        .ok_or_else(|| {
            ApiError::not_found(format!("Resource {} has no button '{}'", resource_id, node_id))
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartedRunsResponse {
            run_ids: vec![run.flow_run_id],
        }),
    ))
}
