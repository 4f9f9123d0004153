//! Capability traits for workspace backends.
//!
//! Each capability is its own trait so callers can ask for only what they
//! use; the reaper needs [`Reapable`], the HTTP layer needs a full
//! [`Backend`]. All methods block on the automation engine.

use eph_core::{BackendKind, ConnectionInfo, Result, WorkspaceId, WorkspaceSpec};

pub trait Lister {
    /// Every workspace this backend knows about, in no particular order.
    fn list(&self) -> Result<Vec<WorkspaceId>>;
}

pub trait ConnectionInfoGetter {
    fn connection_info(&self, id: &WorkspaceId) -> Result<ConnectionInfo>;
}

pub trait Creator {
    /// Reject a spec the engine would never accept, without touching the
    /// engine. Runs before a create is acknowledged to the caller.
    fn validate(&self, _spec: &WorkspaceSpec) -> Result<()> {
        Ok(())
    }

    /// Provision a workspace and return its id once the engine is done.
    fn create(&self, spec: &WorkspaceSpec) -> Result<WorkspaceId>;
}

pub trait Destroyer {
    /// Tear down and forget a workspace. A failed teardown leaves it listed.
    fn destroy(&self, id: &WorkspaceId) -> Result<()>;
}

pub trait ExpiryChecker {
    /// Always `false` while an update is in progress.
    fn is_expired(&self, id: &WorkspaceId) -> Result<bool>;
}

/// One provisioning strategy with every capability.
pub trait Backend:
    Lister + ConnectionInfoGetter + Creator + Destroyer + ExpiryChecker + Send + Sync
{
    fn kind(&self) -> BackendKind;
}

/// What the reaper needs from a backend.
pub trait Reapable: Lister + ExpiryChecker + Destroyer + Creator + Send + Sync {}

impl<T> Reapable for T where T: Lister + ExpiryChecker + Destroyer + Creator + Send + Sync + ?Sized {}
