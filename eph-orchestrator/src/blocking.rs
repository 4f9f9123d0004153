use eph_core::{Result, WorkspaceError};

/// Run a synchronous backend call on the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WorkspaceError::Upstream(format!("backend task failed: {e}")))?
}
