use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/healthz", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let backends: Vec<String> = state
        .lifecycle
        .backends()
        .iter()
        .map(ToString::to_string)
        .collect();

    Json(json!({
        "status": "ok",
        "service": "eph-api",
        "version": env!("CARGO_PKG_VERSION"),
        "backends": backends,
    }))
}
