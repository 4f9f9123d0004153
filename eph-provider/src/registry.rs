//! Backend registry and dispatcher.
//!
//! Built once at startup and read-only afterwards. Requests name a backend
//! by string; the registry resolves it to exactly one registered backend or
//! fails with `BackendUnmatched`.

use std::sync::Arc;

use eph_core::{
    BackendKind, ConnectionInfo, Result, WorkspaceError, WorkspaceId, WorkspaceSpec,
};
use tracing::debug;

use crate::backend::Backend;

#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend. Two backends with the same kind are a startup error.
    pub fn register(&mut self, backend: Arc<dyn Backend>) -> Result<()> {
        let kind = backend.kind();
        if self.backends.iter().any(|b| b.kind() == kind) {
            return Err(WorkspaceError::DuplicateBackend(kind.to_string()));
        }
        debug!(backend = %kind, "registered backend");
        self.backends.push(backend);
        Ok(())
    }

    pub fn with(mut self, backend: Arc<dyn Backend>) -> Result<Self> {
        self.register(backend)?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Registered kinds, in registration order.
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    pub fn backends(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.backends.iter()
    }

    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn Backend>> {
        self.backends
            .iter()
            .find(|b| b.kind() == kind)
            .cloned()
            .ok_or_else(|| WorkspaceError::BackendUnmatched(kind.to_string()))
    }

    /// Resolve a request's backend selector. Blank selects the default kind.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Backend>> {
        let kind: BackendKind = name.parse()?;
        self.get(kind)
    }

    pub fn list(&self, backend: &str) -> Result<Vec<WorkspaceId>> {
        self.resolve(backend)?.list()
    }

    pub fn connection_info(&self, backend: &str, id: &WorkspaceId) -> Result<ConnectionInfo> {
        self.resolve(backend)?.connection_info(id)
    }

    pub fn create(&self, backend: &str, spec: &WorkspaceSpec) -> Result<WorkspaceId> {
        self.resolve(backend)?.create(spec)
    }

    pub fn destroy(&self, backend: &str, id: &WorkspaceId) -> Result<()> {
        self.resolve(backend)?.destroy(id)
    }

    pub fn is_expired(&self, backend: &str, id: &WorkspaceId) -> Result<bool> {
        self.resolve(backend)?.is_expired(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockCall, MockExpiry};

    fn registry() -> BackendRegistry {
        BackendRegistry::new()
            .with(Arc::new(MockBackend::new(BackendKind::GcpNamespaceOnly)))
            .unwrap()
            .with(Arc::new(
                MockBackend::new(BackendKind::AwsCluster).with_workspace("eks-1", MockExpiry::Fresh),
            ))
            .unwrap()
    }

    #[test]
    fn test_duplicate_kind_is_rejected() {
        let err = registry()
            .with(Arc::new(MockBackend::new(BackendKind::AwsCluster)))
            .err()
            .unwrap();
        assert!(matches!(err, WorkspaceError::DuplicateBackend(kind) if kind == "aws_cluster"));
    }

    #[test]
    fn test_resolve_by_name() {
        let registry = registry();
        assert_eq!(registry.resolve("aws-cluster").unwrap().kind(), BackendKind::AwsCluster);
        assert_eq!(registry.resolve("").unwrap().kind(), BackendKind::GcpNamespaceOnly);
        assert_eq!(registry.kinds(), vec![BackendKind::GcpNamespaceOnly, BackendKind::AwsCluster]);
    }

    #[test]
    fn test_unknown_or_unregistered_names_are_unmatched() {
        let registry = registry();
        assert!(matches!(registry.resolve("azure"), Err(WorkspaceError::BackendUnmatched(_))));
        assert!(matches!(
            registry.list("gcp_cluster"),
            Err(WorkspaceError::BackendUnmatched(_))
        ));
    }

    #[test]
    fn test_calls_are_forwarded_to_the_matched_backend() {
        let aws = Arc::new(
            MockBackend::new(BackendKind::AwsCluster).with_workspace("eks-1", MockExpiry::Expired),
        );
        let gcp = Arc::new(MockBackend::new(BackendKind::GcpNamespaceOnly));
        let registry = BackendRegistry::new()
            .with(gcp.clone())
            .unwrap()
            .with(aws.clone())
            .unwrap();

        let id = WorkspaceId::existing("eks-1");
        assert!(registry.is_expired("aws_cluster", &id).unwrap());
        registry.destroy("aws_cluster", &id).unwrap();

        assert_eq!(
            aws.calls(),
            vec![MockCall::IsExpired("eks-1".into()), MockCall::Destroy("eks-1".into())]
        );
        assert!(gcp.calls().is_empty());
    }
}
