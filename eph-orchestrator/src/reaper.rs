//! Expiry-driven reconciliation.
//!
//! One reaper per backend wakes on a fixed interval, lists every workspace,
//! and destroys the expired ones. Errors on one workspace never stop the
//! pass; a failed list skips the whole pass. The next tick is the only
//! retry.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use eph_config::ReaperSettings;
use eph_core::{BackendKind, Result, WorkspaceError, WorkspaceId, WorkspaceSpec};
use eph_provider::{Backend, BackendRegistry, Reapable};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::blocking::run_blocking;
use crate::locks::WorkspaceLocks;

/// Creator identity recorded on workspaces the reaper recreates.
const REAPER_IDENTITY: &str = "reaper";

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub interval: Duration,
    pub destroy_cooldown: Duration,
    pub pinned_cooldown: Duration,
    pub force_delete_all: bool,
    /// Workspaces kept alive by recreating them after they are reaped.
    pub pinned: Vec<WorkspaceId>,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1800),
            destroy_cooldown: Duration::from_secs(10),
            pinned_cooldown: Duration::from_secs(300),
            force_delete_all: false,
            pinned: Vec::new(),
        }
    }
}

impl ReaperConfig {
    /// Settings for the reaper of `kind`; only its own pinned workspaces
    /// are kept.
    pub fn from_settings(settings: &ReaperSettings, kind: BackendKind) -> Result<Self> {
        let mut pinned = Vec::new();
        for entry in &settings.pinned {
            let entry_kind: BackendKind = entry.backend.parse()?;
            if entry_kind == kind {
                pinned.push(WorkspaceId::parse(&entry.name)?);
            }
        }

        Ok(Self {
            interval: Duration::from_secs(settings.interval_secs),
            destroy_cooldown: Duration::from_secs(settings.destroy_cooldown_secs),
            pinned_cooldown: Duration::from_secs(settings.pinned_cooldown_secs),
            force_delete_all: settings.force_delete_all,
            pinned,
        })
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub listed: usize,
    pub destroyed: Vec<WorkspaceId>,
    /// Ids whose evaluation failed or that were busy.
    pub skipped: Vec<WorkspaceId>,
    /// Ids whose destroy failed; they stay for the next pass.
    pub failed: Vec<WorkspaceId>,
    pub recreated: Vec<WorkspaceId>,
    /// The list call failed and nothing was evaluated.
    pub aborted: bool,
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.aborted {
            return f.write_str("aborted");
        }
        write!(
            f,
            "listed={} destroyed={} skipped={} failed={} recreated={}",
            self.listed,
            self.destroyed.len(),
            self.skipped.len(),
            self.failed.len(),
            self.recreated.len()
        )
    }
}

pub struct Reaper<B: Reapable + ?Sized> {
    name: String,
    backend: Arc<B>,
    config: ReaperConfig,
    locks: WorkspaceLocks,
}

impl<B: Reapable + ?Sized + 'static> Reaper<B> {
    pub fn new(name: impl Into<String>, backend: Arc<B>, config: ReaperConfig) -> Self {
        Self {
            name: name.into(),
            backend,
            config,
            locks: WorkspaceLocks::new(),
        }
    }

    /// Share the lock table with the lifecycle facade.
    pub fn with_locks(mut self, locks: WorkspaceLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    /// Run one full list, evaluate, destroy cycle.
    pub async fn pass(&self) -> PassReport {
        let mut report = PassReport::default();

        let backend = self.backend.clone();
        let ids = match run_blocking(move || backend.list()).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(backend = %self.name, error = %e, "listing workspaces failed, skipping pass");
                report.aborted = true;
                return report;
            }
        };
        report.listed = ids.len();
        debug!(backend = %self.name, count = ids.len(), "evaluating workspaces");

        let mut seen: HashSet<WorkspaceId> = HashSet::new();
        for id in ids {
            seen.insert(id.clone());
            self.evaluate(id, &mut report).await;
        }

        for id in &self.config.pinned {
            if seen.contains(id) {
                continue;
            }
            let Some(_guard) = self.locks.try_lock(id) else {
                report.skipped.push(id.clone());
                continue;
            };
            info!(backend = %self.name, workspace = %id, "pinned workspace missing, creating it");
            if self.recreate(id).await {
                report.recreated.push(id.clone());
            }
        }

        report
    }

    async fn evaluate(&self, id: WorkspaceId, report: &mut PassReport) {
        let Some(_guard) = self.locks.try_lock(&id) else {
            debug!(backend = %self.name, workspace = %id, "workspace busy, skipping");
            report.skipped.push(id);
            return;
        };

        let backend = self.backend.clone();
        let check_id = id.clone();
        let expired = match run_blocking(move || backend.is_expired(&check_id)).await {
            Ok(expired) => expired,
            Err(WorkspaceError::MissingExpiry(_)) => {
                warn!(backend = %self.name, workspace = %id, "workspace has no expiry, destroying");
                true
            }
            Err(e) => {
                warn!(backend = %self.name, workspace = %id, error = %e, "could not evaluate expiry, skipping");
                report.skipped.push(id);
                return;
            }
        };

        if !expired && !self.config.force_delete_all {
            return;
        }

        info!(backend = %self.name, workspace = %id, forced = !expired, "destroying workspace");
        let backend = self.backend.clone();
        let destroy_id = id.clone();
        if let Err(e) = run_blocking(move || backend.destroy(&destroy_id)).await {
            error!(backend = %self.name, workspace = %id, error = %e, "destroy failed");
            report.failed.push(id);
            return;
        }
        report.destroyed.push(id.clone());
        sleep(self.config.destroy_cooldown).await;

        if self.config.pinned.contains(&id) {
            info!(
                backend = %self.name,
                workspace = %id,
                cooldown_secs = self.config.pinned_cooldown.as_secs(),
                "recreating pinned workspace after cooldown"
            );
            sleep(self.config.pinned_cooldown).await;
            if self.recreate(&id).await {
                report.recreated.push(id);
            }
        }
    }

    async fn recreate(&self, id: &WorkspaceId) -> bool {
        let spec = WorkspaceSpec {
            name: Some(id.to_string()),
            created_by: Some(REAPER_IDENTITY.to_string()),
            ..WorkspaceSpec::default()
        };
        let backend = self.backend.clone();
        match run_blocking(move || backend.create(&spec)).await {
            Ok(_) => {
                info!(backend = %self.name, workspace = %id, "pinned workspace created");
                true
            }
            Err(e) => {
                error!(backend = %self.name, workspace = %id, error = %e, "pinned workspace creation failed");
                false
            }
        }
    }

    /// Tick until `shutdown` flips to true or its sender is dropped. A pass
    /// that has started always finishes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            backend = %self.name,
            interval_secs = self.config.interval.as_secs(),
            "reaper running"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.pass().await;
                    info!(backend = %self.name, %report, "reconciliation pass finished");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(backend = %self.name, "reaper stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// Start one reaper per registered backend.
pub fn spawn_reapers(
    registry: &BackendRegistry,
    settings: &ReaperSettings,
    locks: WorkspaceLocks,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::new();
    for backend in registry.backends() {
        let kind = backend.kind();
        let config = ReaperConfig::from_settings(settings, kind)?;
        let reaper: Reaper<dyn Backend> = Reaper::new(kind.to_string(), backend.clone(), config)
            .with_locks(locks.clone());
        handles.push(tokio::spawn(reaper.run(shutdown.clone())));
    }
    Ok(handles)
}
