//! Workspace backends.
//!
//! This crate defines the capability traits every provisioning strategy
//! implements, the automation-engine seam those strategies run on, the
//! reference [`StackBackend`], and the registry that routes requests to a
//! backend by name.

// Standard library
use std::sync::Arc;

// External crates
use eph_config::{EngineKind, EngineSettings, Settings};
use eph_core::{BackendKind, Clock, Result};
use tracing::info;

pub mod backend;
pub mod engine;
pub mod family;
pub mod registry;
pub mod stack_backend;

// When the `test-helpers` feature is enabled, include the mock backend.
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use backend::{Backend, ConnectionInfoGetter, Creator, Destroyer, ExpiryChecker, Lister, Reapable};
pub use engine::{AutomationEngine, MemoryEngine, PulumiCli, StackRef};
pub use registry::BackendRegistry;
pub use stack_backend::StackBackend;

/// Build the automation engine the settings ask for.
pub fn build_engine(settings: &EngineSettings) -> Result<Arc<dyn AutomationEngine>> {
    let engine: Arc<dyn AutomationEngine> = match settings.kind {
        EngineKind::Pulumi => Arc::new(PulumiCli::detect(
            &settings.binary,
            settings.programs_dir.clone(),
        )?),
        EngineKind::Memory => Arc::new(MemoryEngine::new()),
    };
    info!(engine = engine.name(), "automation engine ready");
    Ok(engine)
}

/// Register a [`StackBackend`] for every backend kind on `engine`.
pub fn build_registry(
    engine: Arc<dyn AutomationEngine>,
    clock: Arc<dyn Clock>,
    settings: &Settings,
) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    for kind in BackendKind::ALL {
        registry.register(Arc::new(StackBackend::new(
            kind,
            engine.clone(),
            clock.clone(),
            settings.expiry.policy(),
            settings.provisioning.clone(),
        )))?;
    }
    Ok(registry)
}
