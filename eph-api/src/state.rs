use std::sync::Arc;

use eph_orchestrator::Lifecycle;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Lifecycle,
    /// Bearer token required on `/v1/api/*`; `None` leaves the API open.
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(lifecycle: Lifecycle, api_token: Option<String>) -> Self {
        Self {
            lifecycle,
            api_token: api_token.map(Arc::from),
        }
    }
}
