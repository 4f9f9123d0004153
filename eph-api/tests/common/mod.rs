//! Shared helpers for eph-api tests
//!
//! Every test app runs the real stack backends on top of the in-memory
//! engine with a fixed clock, so no cloud or CLI is needed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use chrono::NaiveDate;
use eph_api::{create_app, AppState};
use eph_config::ProvisioningSettings;
use eph_core::{BackendKind, ExpiryPolicy, FixedClock, WorkspaceId};
use eph_orchestrator::Lifecycle;
use eph_provider::{BackendRegistry, MemoryEngine, StackBackend};
use tower::ServiceExt; // for `oneshot`

pub struct TestApp {
    pub app: Router,
    pub engine: Arc<MemoryEngine>,
    pub clock: Arc<FixedClock>,
    pub lifecycle: Lifecycle,
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
}

/// Build an app with every backend kind registered.
pub fn test_app(api_token: Option<&str>) -> TestApp {
    let engine = Arc::new(MemoryEngine::new());
    let clock = Arc::new(FixedClock::new(today()));
    let provisioning = ProvisioningSettings {
        base_domain: "ws.example.com".into(),
        ..ProvisioningSettings::default()
    };

    let mut registry = BackendRegistry::new();
    for kind in BackendKind::ALL {
        registry
            .register(Arc::new(StackBackend::new(
                kind,
                engine.clone(),
                clock.clone(),
                ExpiryPolicy::default(),
                provisioning.clone(),
            )))
            .expect("kinds are unique");
    }

    let lifecycle = Lifecycle::new(registry);
    let state = AppState::new(lifecycle.clone(), api_token.map(str::to_string));

    TestApp {
        app: create_app(state),
        engine,
        clock,
        lifecycle,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// POST a workspace spec and wait for provisioning to finish.
    pub async fn create(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        let response = self.send(post_json(uri, &body)).await;
        if let Some(id) = body.get("name").and_then(|n| n.as_str()) {
            self.wait_idle(id).await;
        }
        response
    }

    /// Wait until no operation holds `id`.
    pub async fn wait_idle(&self, id: &str) {
        let id = WorkspaceId::existing(id);
        for _ in 0..500 {
            if !self.lifecycle.locks().is_locked(&id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("workspace {id} still busy");
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}
