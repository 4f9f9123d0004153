//! Configuration for ephemeral workspaces.
//!
//! Two unrelated kinds of configuration live here: the layered chart-values
//! documents that are merged and handed to the automation engine
//! ([`merge`], [`value`]), and the service's own [`Settings`].

pub mod merge;
pub mod settings;
pub mod value;

pub use merge::{deep_merge, merge, merge_layers, parse_document};
pub use settings::{
    EngineKind, EngineSettings, ExpirySettings, Mode, PinnedWorkspace, ProvisioningSettings,
    ReaperSettings, Settings,
};
pub use value::{to_engine, EngineValue};
