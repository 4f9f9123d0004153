//! Per-workspace mutual exclusion.
//!
//! Entries are created on first use and pruned when the last holder or
//! waiter lets go, so the table only holds workspaces with work in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use eph_core::WorkspaceId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Table = HashMap<String, Arc<AsyncMutex<()>>>;

#[derive(Clone, Default)]
pub struct WorkspaceLocks {
    table: Arc<Mutex<Table>>,
}

/// Exclusive hold on one workspace id. Released on drop.
pub struct WorkspaceGuard {
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<Mutex<Table>>,
}

impl WorkspaceGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        // Release first so a queued waiter is not counted as a holder.
        self.guard.take();
        let mut table = lock_table(&self.table);
        if let Some(entry) = table.get(&self.id) {
            if Arc::strong_count(entry) == 1 {
                table.remove(&self.id);
            }
        }
    }
}

/// Prunes the entry when a `lock` call ends, acquired or cancelled.
struct Waiting<'a> {
    locks: &'a WorkspaceLocks,
    id: &'a WorkspaceId,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.locks.prune(self.id);
    }
}

fn lock_table(table: &Mutex<Table>) -> MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &WorkspaceId) -> Arc<AsyncMutex<()>> {
        lock_table(&self.table)
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Wait for exclusive access to `id`. Waiters are served in order.
    pub async fn lock(&self, id: &WorkspaceId) -> WorkspaceGuard {
        // Declared before the wait so a cancelled waiter still prunes.
        let _waiting = Waiting { locks: self, id };
        let guard = self.entry(id).lock_owned().await;
        WorkspaceGuard {
            id: id.to_string(),
            guard: Some(guard),
            table: self.table.clone(),
        }
    }

    /// Take `id` only if nothing else holds it.
    pub fn try_lock(&self, id: &WorkspaceId) -> Option<WorkspaceGuard> {
        // `try_lock_owned` consumes our handle, so `prune` only sees the
        // table entry and other holders or waiters.
        match self.entry(id).try_lock_owned() {
            Ok(guard) => Some(WorkspaceGuard {
                id: id.to_string(),
                guard: Some(guard),
                table: self.table.clone(),
            }),
            Err(_) => {
                self.prune(id);
                None
            }
        }
    }

    pub fn is_locked(&self, id: &WorkspaceId) -> bool {
        lock_table(&self.table)
            .get(id.as_str())
            .is_some_and(|entry| entry.try_lock().is_err())
    }

    /// Number of ids with a holder or waiter.
    pub fn len(&self) -> usize {
        lock_table(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, id: &WorkspaceId) {
        let mut table = lock_table(&self.table);
        if let Some(entry) = table.get(id.as_str()) {
            if Arc::strong_count(entry) == 1 && entry.try_lock().is_ok() {
                table.remove(id.as_str());
            }
        }
    }
}
