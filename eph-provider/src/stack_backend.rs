//! The reference backend: one engine stack per workspace.

use std::sync::Arc;

use eph_config::{merge_layers, parse_document, to_engine, EngineValue, ProvisioningSettings};
use eph_core::{
    BackendKind, Clock, ConnectionInfo, ExpiryDate, ExpiryPolicy, Result, WorkspaceError,
    WorkspaceId, WorkspaceSpec, WorkspaceStatus,
};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::backend::{Backend, ConnectionInfoGetter, Creator, Destroyer, ExpiryChecker, Lister};
use crate::engine::{AutomationEngine, Outputs, StackConfig, StackRef};
use crate::family::{Cloud, StackFamily};

/// Output holding the workspace's expiry date.
pub const EXPIRY_OUTPUT: &str = "helium-expiry";

/// Port pachd listens on behind a raw load balancer address.
const PACHD_GRPC_PORT: u16 = 30651;

/// Shared cluster a namespace workspace lands in when none is named.
const DEFAULT_CLUSTER_STACK: &str = "pachyderm/helium/default-cluster";

pub struct StackBackend {
    family: StackFamily,
    engine: Arc<dyn AutomationEngine>,
    clock: Arc<dyn Clock>,
    expiry: ExpiryPolicy,
    provisioning: ProvisioningSettings,
}

impl StackBackend {
    pub fn new(
        kind: BackendKind,
        engine: Arc<dyn AutomationEngine>,
        clock: Arc<dyn Clock>,
        expiry: ExpiryPolicy,
        provisioning: ProvisioningSettings,
    ) -> Self {
        Self {
            family: StackFamily::new(kind),
            engine,
            clock,
            expiry,
            provisioning,
        }
    }

    pub fn family(&self) -> &StackFamily {
        &self.family
    }

    pub fn stack_ref(&self, id: &WorkspaceId) -> StackRef {
        StackRef::new(self.family.project(), id.as_str())
    }

    /// Everything written into the stack config for a new workspace.
    pub fn stack_config(&self, id: &WorkspaceId, spec: &WorkspaceSpec) -> Result<StackConfig> {
        let expiry = self.expiry.resolve(spec.expiry, self.clock.today());

        let user = parse_document(spec.values_override.as_deref().unwrap_or_default())?;
        let values = merge_layers(
            &self.family.default_values(id, &self.provisioning),
            &self.family.computed_values(id, spec, &self.provisioning),
            &user,
        );
        let values = to_engine(&values)?;

        let infra = match spec.infra_sizing.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                serde_json::from_str::<Json>(raw).map_err(|e| {
                    WorkspaceError::InvalidSpec(format!("infrastructure sizing is not JSON: {e}"))
                })?;
                raw.to_string()
            }
            _ => String::new(),
        };

        let versions = &spec.versions;
        let p = &self.provisioning;
        let text = |value: &Option<String>| EngineValue::from(value.clone().unwrap_or_default());

        let mut config = StackConfig::new();
        config.insert("id".into(), id.as_str().into());
        config.insert("expiry".into(), expiry.to_string().into());
        config.insert("created-by".into(), text(&spec.created_by));
        config.insert("backend".into(), self.family.project().into());
        config.insert("helm-chart-version".into(), text(&versions.helm_chart));
        config.insert("pachd-version".into(), text(&versions.pachd));
        config.insert("console-version".into(), text(&versions.console));
        config.insert("notebooks-version".into(), text(&versions.notebooks));
        config.insert("mount-server-version".into(), text(&versions.mount_server));
        config.insert("disable-notebooks".into(), spec.disable_notebooks.into());
        config.insert("cleanup-on-failure".into(), spec.cleanup_on_failure().into());
        config.insert(
            "cluster-stack".into(),
            spec.cluster_stack
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_CLUSTER_STACK.to_string())
                .into(),
        );
        config.insert("infra-json-content".into(), infra.into());
        config.insert("workspace-base-url".into(), p.base_domain.as_str().into());
        config.insert("values".into(), values);
        if self.family.cloud() == Cloud::Google {
            config.insert("gcp:project".into(), p.gcp_project.as_str().into());
            config.insert("gcp:zone".into(), p.gcp_zone.as_str().into());
        }
        Ok(config)
    }
}

fn output_str<'a>(outputs: &'a Outputs, key: &str) -> Option<&'a str> {
    outputs
        .get(key)
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
}

fn https(host: Option<&str>) -> String {
    host.map(|h| format!("https://{h}")).unwrap_or_default()
}

/// Address pachd is reachable at, from the first output that has one.
fn pachd_address(outputs: &Outputs) -> String {
    if let Some(address) = output_str(outputs, "pachd-address") {
        return address.to_string();
    }
    let raw = output_str(outputs, "pachd-lb-url").or_else(|| {
        outputs
            .get("pachdip")
            .and_then(|ip| ip.get("ip"))
            .and_then(Json::as_str)
    });
    raw.map(|host| format!("grpc://{host}:{PACHD_GRPC_PORT}"))
        .unwrap_or_default()
}

fn pachctl_command(outputs: &Outputs, address: &str, namespace: &str) -> String {
    if let Some(connection) = output_str(outputs, "pachd-connection-string") {
        return connection.to_string();
    }
    if address.is_empty() || namespace.is_empty() {
        return String::new();
    }
    format!(
        "echo '{{\"pachd_address\": \"{address}\"}}' | pachctl config set context {namespace} --overwrite && pachctl config set active-context {namespace}"
    )
}

fn status_from_output(status: &str) -> WorkspaceStatus {
    match status {
        "failed" => WorkspaceStatus::Failed,
        "creating" => WorkspaceStatus::Creating,
        _ => WorkspaceStatus::Ready,
    }
}

impl Lister for StackBackend {
    fn list(&self) -> Result<Vec<WorkspaceId>> {
        let names = self.engine.list_stacks(self.family.project())?;
        debug!(backend = %self.family.kind(), count = names.len(), "listed workspaces");
        Ok(names.into_iter().map(WorkspaceId::existing).collect())
    }
}

impl ConnectionInfoGetter for StackBackend {
    fn connection_info(&self, id: &WorkspaceId) -> Result<ConnectionInfo> {
        let stack = self.stack_ref(id);
        let summary = self.engine.summary(&stack)?;

        let mut info = ConnectionInfo::new(id.clone(), WorkspaceStatus::Creating);
        info.backend = self.family.kind().to_string();
        info.last_updated = summary.last_update;
        if !summary.url.is_empty() {
            info.engine_url = format!("{}/updates/1", summary.url);
        }
        if summary.update_in_progress {
            return Ok(info);
        }

        let outputs = self.engine.outputs(&stack)?;
        let Some(status) = output_str(&outputs, "status") else {
            info.status = WorkspaceStatus::Failed;
            return Ok(info);
        };
        info.status = status_from_output(status);

        let access = &mut info.access;
        access.k8s = output_str(&outputs, "k8sConnection").unwrap_or_default().to_string();
        access.k8s_namespace = output_str(&outputs, "k8sNamespace").unwrap_or_default().to_string();
        access.console_url = https(output_str(&outputs, "consoleUrl"));
        access.notebooks_url = https(
            output_str(&outputs, "juypterUrl").or_else(|| output_str(&outputs, "jupyterUrl")),
        );
        access.bucket = output_str(&outputs, "bucket").unwrap_or_default().to_string();
        access.pachd_address = pachd_address(&outputs);
        access.pachctl = pachctl_command(&outputs, &access.pachd_address, &access.k8s_namespace);

        info.expiry = output_str(&outputs, EXPIRY_OUTPUT).and_then(|raw| ExpiryDate::parse(raw).ok());
        info.created_by = output_str(&outputs, "createdBy").unwrap_or_default().to_string();
        if let Some(backend) = output_str(&outputs, "backend") {
            info.backend = backend.to_string();
        }
        Ok(info)
    }
}

impl Creator for StackBackend {
    fn validate(&self, spec: &WorkspaceSpec) -> Result<()> {
        let id = WorkspaceId::resolve(spec.name.as_deref())?;
        self.stack_config(&id, spec).map(|_| ())
    }

    fn create(&self, spec: &WorkspaceSpec) -> Result<WorkspaceId> {
        let id = WorkspaceId::resolve(spec.name.as_deref())?;
        let stack = self.stack_ref(&id);
        let config = self.stack_config(&id, spec)?;

        info!(workspace = %id, backend = %self.family.kind(), "creating workspace");
        self.engine.select_or_create(&stack, &config)?;

        if let Err(err) = self.engine.up(&stack) {
            warn!(workspace = %id, error = %err, "deployment failed, marking workspace failed");
            if let Err(mark_err) = self.engine.set_config(&stack, "status", &"failed".into()) {
                warn!(workspace = %id, error = %mark_err, "could not record failed status");
            }
            return Err(err);
        }

        info!(workspace = %id, "workspace deployed");
        Ok(id)
    }
}

impl Destroyer for StackBackend {
    fn destroy(&self, id: &WorkspaceId) -> Result<()> {
        let stack = self.stack_ref(id);
        self.engine.summary(&stack)?;

        if let Err(err) = self.engine.refresh(&stack) {
            warn!(workspace = %id, error = %err, "refresh before destroy failed, destroying anyway");
        }

        self.engine.destroy_and_forget(&stack)?;
        info!(workspace = %id, backend = %self.family.kind(), "workspace destroyed and forgotten");
        Ok(())
    }
}

impl ExpiryChecker for StackBackend {
    fn is_expired(&self, id: &WorkspaceId) -> Result<bool> {
        let stack = self.stack_ref(id);
        if self.engine.summary(&stack)?.update_in_progress {
            return Ok(false);
        }

        let outputs = self.engine.outputs(&stack)?;
        let raw = output_str(&outputs, EXPIRY_OUTPUT)
            .ok_or_else(|| WorkspaceError::MissingExpiry(id.to_string()))?;
        let expiry = ExpiryDate::parse(raw)?;
        Ok(expiry.is_expired_on(self.clock.today()))
    }
}

impl Backend for StackBackend {
    fn kind(&self) -> BackendKind {
        self.family.kind()
    }
}
