use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use eph_core::{ConnectionInfo, WorkspaceId, WorkspaceSpec};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{auth::Caller, error::ApiResult, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/api/backends", get(list_backends))
        .route("/v1/api/workspaces", get(list_workspaces))
        .route("/v1/api/workspace", post(create_workspace))
        .route(
            "/v1/api/workspace/{id}",
            get(get_workspace).delete(delete_workspace),
        )
        .route("/v1/api/workspace/{id}/expired", get(workspace_expired))
}

/// `?backend=` selector shared by every workspace route. Missing means the
/// default backend.
#[derive(Debug, Default, Deserialize)]
pub struct BackendQuery {
    pub backend: Option<String>,
}

impl BackendQuery {
    fn name(&self) -> &str {
        self.backend.as_deref().unwrap_or_default()
    }
}

async fn list_backends(State(state): State<AppState>) -> Json<Value> {
    let backends: Vec<String> = state
        .lifecycle
        .backends()
        .iter()
        .map(ToString::to_string)
        .collect();
    Json(json!({ "backends": backends }))
}

async fn list_workspaces(
    State(state): State<AppState>,
    Query(query): Query<BackendQuery>,
) -> ApiResult<Json<Value>> {
    let ids = state.lifecycle.list(query.name()).await?;
    Ok(Json(json!({ "workspaces": ids })))
}

async fn create_workspace(
    State(state): State<AppState>,
    Query(query): Query<BackendQuery>,
    Extension(caller): Extension<Caller>,
    Json(mut spec): Json<WorkspaceSpec>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let backend = query
        .backend
        .clone()
        .or_else(|| spec.backend.clone())
        .unwrap_or_default();

    // The proxy's identity wins over whatever the body claims.
    if caller.email.is_some() {
        spec.created_by = caller.email;
    }

    // Provisioning keeps running after the response is sent.
    let pending = state.lifecycle.create(&backend, spec).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": pending.id, "backend": pending.backend })),
    ))
}

async fn get_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<BackendQuery>,
) -> ApiResult<Json<ConnectionInfo>> {
    let info = state
        .lifecycle
        .get(query.name(), &WorkspaceId::existing(id))
        .await?;
    Ok(Json(info))
}

async fn delete_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<BackendQuery>,
) -> ApiResult<Json<Value>> {
    let id = WorkspaceId::existing(id);
    state.lifecycle.delete(query.name(), &id).await?;
    Ok(Json(json!({ "id": id, "message": "Workspace deleted" })))
}

async fn workspace_expired(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<BackendQuery>,
) -> ApiResult<Json<Value>> {
    let id = WorkspaceId::existing(id);
    let expired = state.lifecycle.is_expired(query.name(), &id).await?;
    Ok(Json(json!({ "id": id, "expired": expired })))
}
