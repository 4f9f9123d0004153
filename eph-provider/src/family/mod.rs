//! Backend families: one engine program per [`BackendKind`].
//!
//! A family knows where its program lives and which chart values it starts
//! from. Everything else about a workspace comes from the request.

use eph_config::ProvisioningSettings;
use eph_core::{BackendKind, WorkspaceId, WorkspaceSpec};
use serde_yaml_ng::Value;

mod values;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cloud {
    Google,
    Amazon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFamily {
    kind: BackendKind,
}

impl StackFamily {
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Engine project, which is also the program's directory name.
    pub fn project(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn cloud(&self) -> Cloud {
        match self.kind {
            BackendKind::AwsCluster => Cloud::Amazon,
            _ => Cloud::Google,
        }
    }

    /// Bare clusters carry no chart, so they get no chart values.
    pub fn installs_chart(&self) -> bool {
        !matches!(self.kind, BackendKind::GcpClusterOnly)
    }

    /// Host name the workspace is served under.
    pub fn host(&self, id: &WorkspaceId, provisioning: &ProvisioningSettings) -> String {
        format!("{id}.{}", provisioning.base_domain)
    }

    /// Lowest-precedence chart values.
    pub fn default_values(&self, id: &WorkspaceId, provisioning: &ProvisioningSettings) -> Value {
        if !self.installs_chart() {
            return values::empty();
        }
        values::defaults(self.cloud(), &self.host(id, provisioning), provisioning)
    }

    /// Chart values derived from the request: redirect URIs, bucket, image
    /// tags.
    pub fn computed_values(
        &self,
        id: &WorkspaceId,
        spec: &WorkspaceSpec,
        provisioning: &ProvisioningSettings,
    ) -> Value {
        if !self.installs_chart() {
            return values::empty();
        }
        values::computed(
            self.cloud(),
            id,
            &self.host(id, provisioning),
            spec,
            provisioning,
        )
    }
}
