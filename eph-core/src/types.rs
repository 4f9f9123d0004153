use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;
use crate::expiry::ExpiryDate;
use crate::workspace_id::WorkspaceId;

/// Registered provisioning strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A namespace inside a shared cluster.
    #[default]
    GcpNamespaceOnly,
    /// A dedicated GKE cluster with the chart installed.
    GcpCluster,
    /// A bare GKE cluster, used for long-lived shared infrastructure.
    GcpClusterOnly,
    /// A dedicated EKS cluster with the chart installed.
    AwsCluster,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::GcpNamespaceOnly,
        BackendKind::GcpCluster,
        BackendKind::GcpClusterOnly,
        BackendKind::AwsCluster,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::GcpNamespaceOnly => "gcp_namespace_only",
            BackendKind::GcpCluster => "gcp_cluster",
            BackendKind::GcpClusterOnly => "gcp_cluster_only",
            BackendKind::AwsCluster => "aws_cluster",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = WorkspaceError;

    /// Case-insensitive; `-` and `_` are interchangeable; blank means default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        if normalized.is_empty() {
            return Ok(BackendKind::default());
        }
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| WorkspaceError::BackendUnmatched(s.to_string()))
    }
}

/// Independently versioned components of the demoed system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentVersions {
    pub pachd: Option<String>,
    pub console: Option<String>,
    pub notebooks: Option<String>,
    pub mount_server: Option<String>,
    pub helm_chart: Option<String>,
}

/// Create-time request for a workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSpec {
    pub name: Option<String>,
    pub expiry: Option<ExpiryDate>,
    pub versions: ComponentVersions,
    /// Backend selector; resolved by the dispatcher, not by the backend.
    pub backend: Option<String>,
    /// Raw YAML document layered over the computed chart values.
    pub values_override: Option<String>,
    /// Raw JSON document describing infrastructure sizing.
    pub infra_sizing: Option<String>,
    pub created_by: Option<String>,
    pub disable_notebooks: bool,
    /// Tear down partially created resources when provisioning fails.
    pub cleanup_on_failure: Option<bool>,
    /// Stack that owns the shared cluster a namespace workspace lands in.
    pub cluster_stack: Option<String>,
}

impl WorkspaceSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn cleanup_on_failure(&self) -> bool {
        self.cleanup_on_failure.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Creating,
    Ready,
    Failed,
}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkspaceStatus::Creating => "creating",
            WorkspaceStatus::Ready => "ready",
            WorkspaceStatus::Failed => "failed",
        })
    }
}

/// How to reach a workspace. Every field is empty when the stack did not
/// export it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessInfo {
    pub k8s: String,
    pub k8s_namespace: String,
    pub console_url: String,
    pub notebooks_url: String,
    pub bucket: String,
    pub pachd_address: String,
    pub pachctl: String,
}

/// Read-time view of a workspace, rebuilt from the engine on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: WorkspaceId,
    pub status: WorkspaceStatus,
    #[serde(default)]
    pub access: AccessInfo,
    pub expiry: Option<ExpiryDate>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub engine_url: String,
    #[serde(default)]
    pub last_updated: String,
}

impl ConnectionInfo {
    pub fn new(id: WorkspaceId, status: WorkspaceStatus) -> Self {
        Self {
            id,
            status,
            access: AccessInfo::default(),
            expiry: None,
            created_by: String::new(),
            backend: String::new(),
            engine_url: String::new(),
            last_updated: String::new(),
        }
    }
}
