use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use eph_core::{
    BackendKind, ConnectionInfo, Result, WorkspaceError, WorkspaceId, WorkspaceSpec,
    WorkspaceStatus,
};

use crate::backend::{Backend, ConnectionInfoGetter, Creator, Destroyer, ExpiryChecker, Lister};

/// How a mock workspace answers `is_expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockExpiry {
    Fresh,
    Expired,
    /// The expiry output is missing.
    Missing,
    /// The engine call fails.
    Broken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    List,
    ConnectionInfo(String),
    Create(String),
    Destroy(String),
    IsExpired(String),
}

#[derive(Debug, Default)]
struct MockState {
    workspaces: BTreeMap<String, MockExpiry>,
    calls: Vec<MockCall>,
    fail_list: bool,
    fail_create: HashSet<String>,
    reject: HashSet<String>,
    fail_destroy: HashSet<String>,
    delay: Option<Duration>,
}

/// In-memory backend that records every call.
#[derive(Debug)]
pub struct MockBackend {
    kind: BackendKind,
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_workspace(self, id: &str, expiry: MockExpiry) -> Self {
        self.state().workspaces.insert(id.to_string(), expiry);
        self
    }

    pub fn set_expiry(&self, id: &str, expiry: MockExpiry) {
        self.state().workspaces.insert(id.to_string(), expiry);
    }

    pub fn fail_list(&self, fail: bool) {
        self.state().fail_list = fail;
    }

    pub fn fail_create(&self, id: &str) {
        self.state().fail_create.insert(id.to_string());
    }

    /// Make `validate` reject the spec named `id`.
    pub fn reject_spec(&self, id: &str) {
        self.state().reject.insert(id.to_string());
    }

    pub fn fail_destroy(&self, id: &str) {
        self.state().fail_destroy.insert(id.to_string());
    }

    /// Make create and destroy block for `delay`, like a real engine.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Create(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Destroy(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Current workspaces, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.state().workspaces.keys().cloned().collect()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pause(&self) {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
    }
}

impl Lister for MockBackend {
    fn list(&self) -> Result<Vec<WorkspaceId>> {
        let mut state = self.state();
        state.calls.push(MockCall::List);
        if state.fail_list {
            return Err(WorkspaceError::Upstream("mock list failure".into()));
        }
        Ok(state.workspaces.keys().cloned().map(WorkspaceId::existing).collect())
    }
}

impl ConnectionInfoGetter for MockBackend {
    fn connection_info(&self, id: &WorkspaceId) -> Result<ConnectionInfo> {
        let mut state = self.state();
        state.calls.push(MockCall::ConnectionInfo(id.to_string()));
        if !state.workspaces.contains_key(id.as_str()) {
            return Err(WorkspaceError::NotFound(id.to_string()));
        }
        let mut info = ConnectionInfo::new(id.clone(), WorkspaceStatus::Ready);
        info.backend = self.kind.to_string();
        Ok(info)
    }
}

impl Creator for MockBackend {
    fn validate(&self, spec: &WorkspaceSpec) -> Result<()> {
        let id = WorkspaceId::resolve(spec.name.as_deref())?;
        if self.state().reject.contains(id.as_str()) {
            return Err(WorkspaceError::InvalidSpec(format!("mock rejected spec: {id}")));
        }
        Ok(())
    }

    fn create(&self, spec: &WorkspaceSpec) -> Result<WorkspaceId> {
        let id = WorkspaceId::resolve(spec.name.as_deref())?;
        self.state().calls.push(MockCall::Create(id.to_string()));
        self.pause();

        let mut state = self.state();
        if state.fail_create.contains(id.as_str()) {
            return Err(WorkspaceError::Upstream(format!("mock create failure: {id}")));
        }
        state.workspaces.insert(id.to_string(), MockExpiry::Fresh);
        Ok(id)
    }
}

impl Destroyer for MockBackend {
    fn destroy(&self, id: &WorkspaceId) -> Result<()> {
        self.state().calls.push(MockCall::Destroy(id.to_string()));
        self.pause();

        let mut state = self.state();
        if state.fail_destroy.contains(id.as_str()) {
            return Err(WorkspaceError::Upstream(format!("mock destroy failure: {id}")));
        }
        state
            .workspaces
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| WorkspaceError::NotFound(id.to_string()))
    }
}

impl ExpiryChecker for MockBackend {
    fn is_expired(&self, id: &WorkspaceId) -> Result<bool> {
        let mut state = self.state();
        state.calls.push(MockCall::IsExpired(id.to_string()));
        match state.workspaces.get(id.as_str()) {
            None => Err(WorkspaceError::NotFound(id.to_string())),
            Some(MockExpiry::Fresh) => Ok(false),
            Some(MockExpiry::Expired) => Ok(true),
            Some(MockExpiry::Missing) => Err(WorkspaceError::MissingExpiry(id.to_string())),
            Some(MockExpiry::Broken) => {
                Err(WorkspaceError::Upstream(format!("mock engine failure: {id}")))
            }
        }
    }
}

impl Backend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }
}
