use std::sync::Arc;

use eph_core::{
    BackendKind, ConnectionInfo, Result, WorkspaceError, WorkspaceId, WorkspaceSpec,
};
use eph_provider::BackendRegistry;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::blocking::run_blocking;
use crate::locks::WorkspaceLocks;

/// Entry point for every workspace operation.
///
/// Creates and deletes hold the workspace's lock for their whole duration.
/// Reads never lock: a workspace that is being created must still answer
/// `creating`.
#[derive(Clone)]
pub struct Lifecycle {
    registry: Arc<BackendRegistry>,
    locks: WorkspaceLocks,
}

/// A create that has been accepted and is provisioning in the background.
pub struct PendingCreate {
    pub id: WorkspaceId,
    pub backend: BackendKind,
    pub task: JoinHandle<Result<WorkspaceId>>,
}

impl Lifecycle {
    pub fn new(registry: BackendRegistry) -> Self {
        Self::with_locks(Arc::new(registry), WorkspaceLocks::new())
    }

    pub fn with_locks(registry: Arc<BackendRegistry>, locks: WorkspaceLocks) -> Self {
        Self { registry, locks }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn locks(&self) -> &WorkspaceLocks {
        &self.locks
    }

    pub fn backends(&self) -> Vec<BackendKind> {
        self.registry.kinds()
    }

    /// Validate the request, claim the id and start provisioning.
    ///
    /// Returns as soon as provisioning has started. A spec the backend
    /// rejects fails here, before any id is handed out. Fails with
    /// `UpdateInProgress` if another operation holds the id.
    pub async fn create(&self, backend: &str, mut spec: WorkspaceSpec) -> Result<PendingCreate> {
        let id = WorkspaceId::resolve(spec.name.as_deref())?;
        let target = self.registry.resolve(backend)?;
        let kind = target.kind();

        let guard = self
            .locks
            .try_lock(&id)
            .ok_or_else(|| WorkspaceError::UpdateInProgress(id.to_string()))?;

        spec.name = Some(id.to_string());
        spec.backend = Some(kind.to_string());

        let check = target.clone();
        let candidate = spec.clone();
        run_blocking(move || check.validate(&candidate)).await?;

        info!(workspace = %id, backend = %kind, "accepted create request");

        let task_id = id.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let result = run_blocking(move || target.create(&spec)).await;
            match &result {
                Ok(_) => info!(workspace = %task_id, backend = %kind, "workspace created"),
                Err(e) => error!(workspace = %task_id, backend = %kind, error = %e, "workspace creation failed"),
            }
            result
        });

        Ok(PendingCreate {
            id,
            backend: kind,
            task,
        })
    }

    pub async fn list(&self, backend: &str) -> Result<Vec<WorkspaceId>> {
        let target = self.registry.resolve(backend)?;
        run_blocking(move || target.list()).await
    }

    pub async fn get(&self, backend: &str, id: &WorkspaceId) -> Result<ConnectionInfo> {
        let target = self.registry.resolve(backend)?;
        let id = id.clone();
        run_blocking(move || target.connection_info(&id)).await
    }

    /// Destroy a workspace, waiting for any operation already holding it.
    pub async fn delete(&self, backend: &str, id: &WorkspaceId) -> Result<()> {
        let target = self.registry.resolve(backend)?;
        let _guard = self.locks.lock(id).await;

        info!(workspace = %id, backend = %target.kind(), "deleting workspace");
        let id = id.clone();
        run_blocking(move || target.destroy(&id)).await
    }

    pub async fn is_expired(&self, backend: &str, id: &WorkspaceId) -> Result<bool> {
        let target = self.registry.resolve(backend)?;
        let id = id.clone();
        run_blocking(move || target.is_expired(&id)).await
    }
}
