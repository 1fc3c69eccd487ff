/// Flow log endpoints: paginated history, per-run view and live SSE stream

use crate::api::{ApiError, AppState};
use crate::error::LogStoreError;
use crate::flow::types::ResourceId;
use crate::logs::types::{group_by_run, PageRequest};
use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, Sse},
        Json,
    },
    routing::get,
    Router,
};
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::StreamExt;

pub fn create_log_routes() -> Router<AppState> {
    Router::new()
        .route("/api/resources/{id}/flow/logs", get(get_logs))
        .route("/api/resources/{id}/flow/logs/live", get(live_logs))
        .route("/api/resources/{id}/flow/runs/{run_id}/logs", get(get_run_logs))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingQuery {
    #[serde(default)]
    pub group_by_run: bool,
}

/// GET /api/resources/{id}/flow/logs?page=1&limit=50[&groupByRun=true]
///
/// Ascending by id. With `groupByRun` the page's entries are returned as
/// `runs: [{flowRunId, entries}]` instead of a flat `data` list.
async fn get_logs(
    State(state): State<AppState>,
    Path(resource_id): Path<ResourceId>,
    Query(page): Query<PageRequest>,
    Query(grouping): Query<GroupingQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = state
        .sink
        .store()
        .page(resource_id, page)
        .await
        .map_err(|e| match e {
            LogStoreError::InvalidPage(message) => ApiError::bad_request(message),
            other => ApiError::internal(&format!("Failed to read logs of resource {}", resource_id), other),
        })?;

    if grouping.group_by_run {
        return Ok(Json(json!({
            "runs": group_by_run(page.data),
            "total": page.total,
            "page": page.page,
            "limit": page.limit,
        })));
    }

    Ok(Json(json!(page)))
}

/// GET /api/resources/{id}/flow/runs/{run_id}/logs
async fn get_run_logs(
    State(state): State<AppState>,
    Path((resource_id, run_id)): Path<(ResourceId, String)>,
) -> Result<Json<Value>, ApiError> {
    let entries: Vec<_> = state
        .sink
        .store()
        .run_entries(&run_id)
        .await
        .map_err(|e| ApiError::internal(&format!("Failed to read logs of run {}", run_id), e))?
        .into_iter()
        .filter(|entry| entry.resource_id == resource_id)
        .collect();

    match group_by_run(entries).into_iter().next() {
        Some(group) => Ok(Json(json!(group))),
        None => Err(ApiError::not_found(format!(
            "Run {} has no logs for resource {}",
            run_id, resource_id
        ))),
    }
}

/// GET /api/resources/{id}/flow/logs/live
///
/// One `data:` message per entry plus `{"keepalive": true}` markers. There
/// is no replay; clients fetch history through the paginated endpoint.
async fn live_logs(
    State(state): State<AppState>,
    Path(resource_id): Path<ResourceId>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::info!("📡 Live log stream opened for resource {}", resource_id);

    let stream = state
        .sink
        .subscribe(resource_id)
        .map(|message| Event::default().json_data(message.to_json()));

    Sse::new(stream)
}
