pub mod health;
pub mod workspaces;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::{auth::auth_middleware, state::AppState};

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(health::routes()) // Health routes don't need auth
        .merge(
            workspaces::routes()
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
