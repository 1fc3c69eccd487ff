/// Flow management endpoints
///
/// Saving replaces the whole graph of a resource. Structural errors reject
/// the save with 422; node configuration issues are saved and reported back
/// as `validationErrors`.

use crate::api::{ApiError, AppState};
use crate::error::SaveError;
use crate::flow::catalog::{node_schemas, NodeSchema, CATALOG_VERSION};
use crate::flow::types::{ResourceId, ResourceKind, StoredEdge, StoredFlow, StoredNode};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn create_flow_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/resources/{id}/flow",
            get(get_flow).put(save_flow).delete(delete_flow),
        )
        .route("/api/resources/{id}/flow/node-schemas", get(get_node_schemas))
}

/// Body of a save; a missing version means the current catalog
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFlowRequest {
    #[serde(default)]
    pub catalog_version: Option<u32>,
    #[serde(default)]
    pub nodes: Vec<StoredNode>,
    #[serde(default)]
    pub edges: Vec<StoredEdge>,
}

impl From<SaveFlowRequest> for StoredFlow {
    fn from(request: SaveFlowRequest) -> Self {
        StoredFlow {
            catalog_version: request.catalog_version.unwrap_or(CATALOG_VERSION),
            nodes: request.nodes,
            edges: request.edges,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSchemaQuery {
    pub resource_kind: Option<ResourceKind>,
}

/// GET /api/resources/{id}/flow
async fn get_flow(
    State(state): State<AppState>,
    Path(resource_id): Path<ResourceId>,
) -> Result<Json<StoredFlow>, ApiError> {
    let flow = state
        .registry
        .load(resource_id)
        .await
        .map_err(|e| ApiError::internal(&format!("Failed to load flow of resource {}", resource_id), e))?;

    Ok(Json(flow.unwrap_or(StoredFlow {
        catalog_version: CATALOG_VERSION,
        ..Default::default()
    })))
}

/// PUT /api/resources/{id}/flow
async fn save_flow(
    State(state): State<AppState>,
    Path(resource_id): Path<ResourceId>,
    Json(request): Json<SaveFlowRequest>,
) -> Result<Json<Value>, ApiError> {
    match state.registry.save(resource_id, request.into()).await {
        Ok(saved) => {
            let mut body = json!({
                "catalogVersion": saved.flow.catalog_version,
                "nodes": saved.flow.nodes,
                "edges": saved.flow.edges,
            });
            if !saved.issues.is_empty() {
                body["validationErrors"] = json!(saved.issues);
            }
            Ok(Json(body))
        }
        Err(SaveError::Invalid(errors)) => {
            tracing::info!(
                "Rejected flow for resource {} with {} structural error(s)",
                resource_id,
                errors.len()
            );
            Err(ApiError::with_body(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "errors": errors }),
            ))
        }
        Err(SaveError::Migration(e)) => Err(ApiError::with_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "errors": [{ "kind": "migration", "message": e.to_string() }] }),
        )),
        Err(SaveError::Storage(e)) => Err(ApiError::internal(
            &format!("Failed to save flow of resource {}", resource_id),
            e,
        )),
    }
}

/// DELETE /api/resources/{id}/flow
async fn delete_flow(
    State(state): State<AppState>,
    Path(resource_id): Path<ResourceId>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .registry
        .delete(resource_id)
        .await
        .map_err(|e| ApiError::internal(&format!("Failed to delete flow of resource {}", resource_id), e))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("Resource {} has no flow", resource_id)))
    }
}

/// GET /api/resources/{id}/flow/node-schemas?resourceKind=machine|door
async fn get_node_schemas(
    Path(_resource_id): Path<ResourceId>,
    Query(query): Query<NodeSchemaQuery>,
) -> Json<Vec<NodeSchema>> {
    Json(node_schemas(query.resource_kind))
}
