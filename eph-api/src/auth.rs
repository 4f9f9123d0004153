use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{error::ApiError, state::AppState};

/// Identity of whoever sent the request, as forwarded by the auth proxy in
/// front of the service.
#[derive(Clone, Debug, Default)]
pub struct Caller {
    pub email: Option<String>,
}

/// Auth middleware for `/v1/api/*`.
///
/// When an API token is configured, requests must carry
/// `Authorization: Bearer <token>`. The caller's email is read from
/// `X-Forwarded-Email` and recorded as the workspace creator.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.api_token.as_deref() {
        let presented = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim);

        if presented != Some(expected) {
            return Err(ApiError::Unauthorized(
                "missing or invalid bearer token".to_string(),
            ));
        }
    }

    let email = req
        .headers()
        .get("x-forwarded-email")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    req.extensions_mut().insert(Caller { email });

    Ok(next.run(req).await)
}
