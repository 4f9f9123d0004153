use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Errors shared by every layer of the workspace lifecycle.
///
/// Backends return these unchanged to their callers; only the reaper
/// interprets them (see [`WorkspaceError::is_missing_expiry`]).
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Workspace not found: {0}")]
    NotFound(String),

    #[error("Update in progress for workspace: {0}")]
    UpdateInProgress(String),

    #[error("Expected stack output 'helium-expiry' not found for workspace: {0}")]
    MissingExpiry(String),

    #[error("No backend registered for: {0}")]
    BackendUnmatched(String),

    #[error("Backend registered more than once: {0}")]
    DuplicateBackend(String),

    #[error(
        "Invalid workspace name '{0}': must match ^[a-z0-9]([-a-z0-9]{{1,61}}[a-z0-9])$"
    )]
    InvalidName(String),

    #[error("Invalid workspace spec: {0}")]
    InvalidSpec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WorkspaceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True for the one error kind the reaper treats as "destroy regardless".
    pub fn is_missing_expiry(&self) -> bool {
        matches!(self, Self::MissingExpiry(_))
    }
}

impl From<serde_json::Error> for WorkspaceError {
    fn from(err: serde_json::Error) -> Self {
        WorkspaceError::Serialization(err.to_string())
    }
}

impl From<serde_yaml_ng::Error> for WorkspaceError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        WorkspaceError::Serialization(err.to_string())
    }
}
