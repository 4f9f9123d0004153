//! Integration tests for authentication middleware
//!
//! Tests bearer token enforcement and creator identity extraction.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Extension, Json, Router,
};
use common::{extract_json_body, test_app};
use eph_api::auth::{auth_middleware, Caller};
use eph_api::AppState;
use tower::ServiceExt; // for `oneshot`

async fn whoami(Extension(caller): Extension<Caller>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "email": caller.email }))
}

fn protected_app(token: Option<&str>) -> Router {
    let state = AppState::new(test_app(None).lifecycle, token.map(str::to_string));
    Router::new()
        .route("/protected", get(whoami))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_open_api_without_token() {
    let response = protected_app(None)
        .oneshot(request("/protected", &[]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_json_body(response).await["email"].is_null());
}

#[tokio::test]
async fn test_forwarded_email_is_the_caller() {
    let response = protected_app(None)
        .oneshot(request(
            "/protected",
            &[("x-forwarded-email", "dev@example.com")],
        ))
        .await
        .unwrap();

    assert_eq!(extract_json_body(response).await["email"], "dev@example.com");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let response = protected_app(Some("s3cret"))
        .oneshot(request("/protected", &[]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn test_wrong_token_is_unauthorized() {
    let response = protected_app(Some("s3cret"))
        .oneshot(request("/protected", &[("authorization", "Bearer nope")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_token_passes() {
    let response = protected_app(Some("s3cret"))
        .oneshot(request("/protected", &[("authorization", "Bearer s3cret")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_guards_api_but_not_health() {
    let app = test_app(Some("s3cret"));

    let response = app.send(request("/healthz", &[])).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(request("/v1/api/backends", &[])).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(request(
            "/v1/api/backends",
            &[("authorization", "Bearer s3cret")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
