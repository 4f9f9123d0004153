//! Foundation types for ephemeral workspaces.
//!
//! Everything above this crate speaks in these types: the id that names a
//! workspace (and its stack), the create-time spec, the read-time connection
//! info, expiry dates, and the shared error enum.

pub mod error;
pub mod expiry;
pub mod types;
pub mod workspace_id;

pub use error::{Result, WorkspaceError};
pub use expiry::{Clock, ExpiryDate, ExpiryPolicy, FixedClock, SystemClock, EXPIRY_FORMAT};
pub use types::{
    AccessInfo, BackendKind, ComponentVersions, ConnectionInfo, WorkspaceSpec, WorkspaceStatus,
};
pub use workspace_id::WorkspaceId;
