//! Workspace lifecycle orchestration
//!
//! The [`Lifecycle`] facade is the only entry point the HTTP service uses;
//! the [`Reaper`] runs beside it, one per backend, destroying expired
//! workspaces. Both share a [`WorkspaceLocks`] table so no two operations
//! mutate the same workspace at once.

mod blocking;
pub mod lifecycle;
pub mod locks;
pub mod reaper;

pub use lifecycle::{Lifecycle, PendingCreate};
pub use locks::{WorkspaceGuard, WorkspaceLocks};
pub use reaper::{spawn_reapers, PassReport, Reaper, ReaperConfig};
