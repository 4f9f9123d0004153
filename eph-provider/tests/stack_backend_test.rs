//! StackBackend behaviour against the in-memory engine.

use std::sync::Arc;

use chrono::NaiveDate;
use eph_config::{EngineValue, ProvisioningSettings};
use eph_core::{
    BackendKind, ExpiryDate, ExpiryPolicy, FixedClock, WorkspaceError, WorkspaceId,
    WorkspaceSpec, WorkspaceStatus,
};
use eph_provider::{
    AutomationEngine, ConnectionInfoGetter, Creator, Destroyer, ExpiryChecker, Lister,
    MemoryEngine, StackBackend, StackRef,
};
use serde_json::json;

struct Fixture {
    engine: Arc<MemoryEngine>,
    clock: Arc<FixedClock>,
    backend: StackBackend,
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn fixture() -> Fixture {
    let engine = Arc::new(MemoryEngine::new());
    let clock = Arc::new(FixedClock::new(date(2024, 3, 10)));
    let provisioning = ProvisioningSettings {
        base_domain: "ws.example.com".into(),
        gcp_project: "demo-project".into(),
        ..ProvisioningSettings::default()
    };
    let backend = StackBackend::new(
        BackendKind::GcpNamespaceOnly,
        engine.clone(),
        clock.clone(),
        ExpiryPolicy::default(),
        provisioning,
    );
    Fixture {
        engine,
        clock,
        backend,
    }
}

fn stack(name: &str) -> StackRef {
    StackRef::new("gcp_namespace_only", name)
}

fn id(name: &str) -> WorkspaceId {
    WorkspaceId::existing(name)
}

#[test]
fn test_create_without_expiry_stores_tomorrow() {
    let f = fixture();
    let created = f.backend.create(&WorkspaceSpec::named("demo-1")).unwrap();
    assert_eq!(created.as_str(), "demo-1");

    let config = f.engine.config(&stack("demo-1")).unwrap();
    assert_eq!(config["expiry"], EngineValue::from("2024-03-11"));

    let info = f.backend.connection_info(&created).unwrap();
    assert_eq!(info.expiry, Some(ExpiryDate::new(date(2024, 3, 11))));
}

#[test]
fn test_create_clamps_far_expiry() {
    let f = fixture();
    let mut spec = WorkspaceSpec::named("demo-1");
    spec.expiry = Some(ExpiryDate::new(date(2030, 1, 1)));
    f.backend.create(&spec).unwrap();

    let config = f.engine.config(&stack("demo-1")).unwrap();
    assert_eq!(config["expiry"], EngineValue::from("2024-06-08"));
}

#[test]
fn test_create_rejects_bad_name_before_touching_engine() {
    let f = fixture();
    let err = f.backend.create(&WorkspaceSpec::named("My_Bad Name!")).unwrap_err();
    assert!(matches!(err, WorkspaceError::InvalidName(_)));
    assert!(f.engine.calls().is_empty());
}

#[test]
fn test_create_writes_merged_values() {
    let f = fixture();
    let mut spec = WorkspaceSpec::named("demo-1");
    spec.versions.pachd = Some("2.8.1".into());
    spec.values_override = Some("pachd:\n  image:\n    tag: 2.9.0\nconsole:\n  enabled: false\n".into());
    spec.created_by = Some("dev@example.com".into());
    f.backend.create(&spec).unwrap();

    let config = f.engine.config(&stack("demo-1")).unwrap();
    let EngineValue::Map(values) = &config["values"] else {
        panic!("values should be a map");
    };
    let EngineValue::Map(pachd) = &values["pachd"] else {
        panic!("pachd should be a map");
    };
    let EngineValue::Map(image) = &pachd["image"] else {
        panic!("image should be a map");
    };
    assert_eq!(image["tag"], EngineValue::from("2.9.0"));
    assert_eq!(config["pachd-version"], EngineValue::from("2.8.1"));
    assert_eq!(config["created-by"], EngineValue::from("dev@example.com"));
    assert_eq!(config["gcp:project"], EngineValue::from("demo-project"));
    assert_eq!(config["cleanup-on-failure"], EngineValue::Bool(true));
}

#[test]
fn test_create_rejects_malformed_override() {
    let f = fixture();
    let mut spec = WorkspaceSpec::named("demo-1");
    spec.values_override = Some("- not\n- a mapping\n".into());
    assert!(matches!(f.backend.create(&spec), Err(WorkspaceError::Config(_))));

    let mut spec = WorkspaceSpec::named("demo-2");
    spec.infra_sizing = Some("{not json".into());
    assert!(matches!(f.backend.create(&spec), Err(WorkspaceError::InvalidSpec(_))));
    assert!(f.backend.list().unwrap().is_empty());
}

#[test]
fn test_failed_deploy_is_marked_and_visible() {
    let f = fixture();
    f.engine.fail_up("demo-1", true);

    assert!(f.backend.create(&WorkspaceSpec::named("demo-1")).is_err());

    let config = f.engine.config(&stack("demo-1")).unwrap();
    assert_eq!(config["status"], EngineValue::from("failed"));
    assert_eq!(f.backend.list().unwrap(), vec![id("demo-1")]);
    assert_eq!(
        f.backend.connection_info(&id("demo-1")).unwrap().status,
        WorkspaceStatus::Failed
    );
    assert!(f.backend.is_expired(&id("demo-1")).unwrap_err().is_missing_expiry());
}

#[test]
fn test_connection_info_reads_outputs() {
    let f = fixture();
    let mut spec = WorkspaceSpec::named("demo-1");
    spec.created_by = Some("dev@example.com".into());
    f.backend.create(&spec).unwrap();

    let info = f.backend.connection_info(&id("demo-1")).unwrap();
    assert_eq!(info.status, WorkspaceStatus::Ready);
    assert_eq!(info.access.k8s_namespace, "demo-1");
    assert_eq!(info.access.console_url, "https://demo-1.ws.example.com");
    assert_eq!(info.access.notebooks_url, "https://jh-demo-1.ws.example.com");
    assert_eq!(info.access.pachd_address, "grpcs://demo-1.ws.example.com:443");
    assert!(info.access.pachctl.contains("set context demo-1"));
    assert_eq!(info.created_by, "dev@example.com");
    assert_eq!(info.backend, "gcp_namespace_only");
    assert_eq!(info.engine_url, "memory://gcp_namespace_only/demo-1/updates/1");
}

#[test]
fn test_connection_info_while_updating_is_creating() {
    let f = fixture();
    f.backend.create(&WorkspaceSpec::named("demo-1")).unwrap();
    f.engine.set_update_in_progress(&stack("demo-1"), true);

    let info = f.backend.connection_info(&id("demo-1")).unwrap();
    assert_eq!(info.status, WorkspaceStatus::Creating);
    assert!(info.access.console_url.is_empty());
    assert!(info.expiry.is_none());
}

#[test]
fn test_connection_info_unknown_is_not_found() {
    let f = fixture();
    let err = f.backend.connection_info(&id("nope")).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_expiry_is_monotonic_and_ignores_updates() {
    let f = fixture();
    let mut spec = WorkspaceSpec::named("demo-1");
    spec.expiry = Some(ExpiryDate::new(date(2024, 3, 15)));
    f.backend.create(&spec).unwrap();

    f.clock.set(date(2024, 3, 14));
    assert!(!f.backend.is_expired(&id("demo-1")).unwrap());

    f.clock.set(date(2024, 3, 15));
    assert!(f.backend.is_expired(&id("demo-1")).unwrap());

    f.engine.set_update_in_progress(&stack("demo-1"), true);
    assert!(!f.backend.is_expired(&id("demo-1")).unwrap());
}

#[test]
fn test_missing_expiry_output_is_distinct() {
    let f = fixture();
    f.backend.create(&WorkspaceSpec::named("demo-1")).unwrap();
    f.engine.remove_output(&stack("demo-1"), "helium-expiry");

    let err = f.backend.is_expired(&id("demo-1")).unwrap_err();
    assert!(matches!(err, WorkspaceError::MissingExpiry(name) if name == "demo-1"));
}

#[test]
fn test_destroy_then_forget() {
    let f = fixture();
    f.backend.create(&WorkspaceSpec::named("demo-1")).unwrap();

    f.backend.destroy(&id("demo-1")).unwrap();

    assert!(f.backend.list().unwrap().is_empty());
    let calls = f.engine.calls();
    let tail: Vec<&str> = calls.iter().rev().take(3).rev().map(String::as_str).collect();
    assert_eq!(tail, ["refresh:demo-1", "destroy:demo-1", "remove:demo-1"]);
}

#[test]
fn test_failed_teardown_keeps_workspace_listed() {
    let f = fixture();
    f.backend.create(&WorkspaceSpec::named("demo-1")).unwrap();
    f.engine.fail_destroy("demo-1", true);

    assert!(f.backend.destroy(&id("demo-1")).is_err());

    assert_eq!(f.backend.list().unwrap(), vec![id("demo-1")]);
    assert!(!f.engine.calls().contains(&"remove:demo-1".to_string()));
}

#[test]
fn test_refresh_failure_does_not_block_destroy() {
    let f = fixture();
    f.backend.create(&WorkspaceSpec::named("demo-1")).unwrap();
    f.engine.fail_refresh("demo-1", true);

    f.backend.destroy(&id("demo-1")).unwrap();
    assert!(f.backend.list().unwrap().is_empty());
}

#[test]
fn test_destroy_unknown_is_not_found() {
    let f = fixture();
    assert!(f.backend.destroy(&id("nope")).unwrap_err().is_not_found());
}

#[test]
fn test_list_sees_only_its_own_family() {
    let f = fixture();
    f.engine.insert_stack(
        &StackRef::new("aws_cluster", "eks-1"),
        Default::default(),
        [("status".to_string(), json!("ready"))].into_iter().collect(),
    );
    f.backend.create(&WorkspaceSpec::named("demo-1")).unwrap();

    assert_eq!(f.backend.list().unwrap(), vec![id("demo-1")]);
    assert_eq!(
        f.engine.list_stacks("aws_cluster").unwrap(),
        vec!["eks-1".to_string()]
    );
}

#[test]
fn test_validate_checks_spec_without_touching_engine() {
    let f = fixture();

    let mut spec = WorkspaceSpec::named("demo-1");
    spec.values_override = Some("- a\n- b\n".into());
    assert!(matches!(f.backend.validate(&spec), Err(WorkspaceError::Config(_))));

    let mut spec = WorkspaceSpec::named("demo-1");
    spec.infra_sizing = Some("{not json".into());
    assert!(matches!(f.backend.validate(&spec), Err(WorkspaceError::InvalidSpec(_))));

    assert!(matches!(
        f.backend.validate(&WorkspaceSpec::named("Bad Name!")),
        Err(WorkspaceError::InvalidName(_))
    ));

    let mut spec = WorkspaceSpec::named("demo-1");
    spec.values_override = Some("pachd:\n  enabled: true\n".into());
    f.backend.validate(&spec).unwrap();

    assert!(f.engine.calls().is_empty());
}
