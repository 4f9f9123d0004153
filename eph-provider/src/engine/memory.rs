//! An automation engine that keeps stacks in process memory.
//!
//! `up` runs a per-project program closure over the stack config instead of
//! touching any cloud. Used for local development and for tests, which can
//! inject failures into individual stacks.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use eph_config::EngineValue;
use eph_core::{Result, WorkspaceError};
use serde_json::json;
use tracing::debug;

use super::{AutomationEngine, Outputs, StackConfig, StackRef, StackSummary};

/// Turns a stack's config into its outputs, or fails the deployment.
pub type Program = Arc<dyn Fn(&StackRef, &StackConfig) -> Result<Outputs> + Send + Sync>;

#[derive(Debug, Default)]
struct MemoryStack {
    config: StackConfig,
    outputs: Outputs,
    update_in_progress: bool,
    last_update: String,
}

#[derive(Debug, Default)]
struct Faults {
    up: HashSet<String>,
    refresh: HashSet<String>,
    destroy: HashSet<String>,
    list: bool,
}

pub struct MemoryEngine {
    stacks: Mutex<BTreeMap<StackRef, MemoryStack>>,
    programs: RwLock<HashMap<String, Program>>,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<String>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn config_str<'a>(config: &'a StackConfig, key: &str) -> &'a str {
    config.get(key).and_then(EngineValue::as_str).unwrap_or("")
}

/// Exports what a real workspace program exports, derived from the config.
pub fn default_program() -> Program {
    Arc::new(|stack: &StackRef, config: &StackConfig| -> Result<Outputs> {
        let id = stack.name.as_str();
        let domain = match config_str(config, "workspace-base-url") {
            "" => "workspaces.local",
            domain => domain,
        };
        let mut outputs = Outputs::new();
        outputs.insert("status".into(), json!("ready"));
        outputs.insert("helium-expiry".into(), json!(config_str(config, "expiry")));
        outputs.insert("k8sNamespace".into(), json!(id));
        outputs.insert("consoleUrl".into(), json!(format!("{id}.{domain}")));
        if config.get("disable-notebooks") != Some(&EngineValue::Bool(true)) {
            outputs.insert("juypterUrl".into(), json!(format!("jh-{id}.{domain}")));
        }
        outputs.insert("bucket".into(), json!(id));
        outputs.insert(
            "pachd-address".into(),
            json!(format!("grpcs://{id}.{domain}:443")),
        );
        outputs.insert("createdBy".into(), json!(config_str(config, "created-by")));
        outputs.insert("backend".into(), json!(config_str(config, "backend")));
        Ok(outputs)
    })
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            stacks: Mutex::new(BTreeMap::new()),
            programs: RwLock::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Use `program` for every stack of `project`. Projects without a
    /// program run [`default_program`].
    pub fn with_program(self, project: impl Into<String>, program: Program) -> Self {
        self.programs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(project.into(), program);
        self
    }

    /// Seed a stack as if it had been deployed.
    pub fn insert_stack(&self, stack: &StackRef, config: StackConfig, outputs: Outputs) {
        lock(&self.stacks).insert(
            stack.clone(),
            MemoryStack {
                config,
                outputs,
                update_in_progress: false,
                last_update: Utc::now().to_rfc3339(),
            },
        );
    }

    pub fn set_update_in_progress(&self, stack: &StackRef, in_progress: bool) {
        if let Some(entry) = lock(&self.stacks).get_mut(stack) {
            entry.update_in_progress = in_progress;
        }
    }

    pub fn set_output(&self, stack: &StackRef, key: &str, value: serde_json::Value) {
        if let Some(entry) = lock(&self.stacks).get_mut(stack) {
            entry.outputs.insert(key.to_string(), value);
        }
    }

    pub fn remove_output(&self, stack: &StackRef, key: &str) {
        if let Some(entry) = lock(&self.stacks).get_mut(stack) {
            entry.outputs.shift_remove(key);
        }
    }

    pub fn config(&self, stack: &StackRef) -> Option<StackConfig> {
        lock(&self.stacks).get(stack).map(|entry| entry.config.clone())
    }

    pub fn contains(&self, stack: &StackRef) -> bool {
        lock(&self.stacks).contains_key(stack)
    }

    pub fn fail_up(&self, name: &str, fail: bool) {
        toggle(&mut lock(&self.faults).up, name, fail);
    }

    pub fn fail_refresh(&self, name: &str, fail: bool) {
        toggle(&mut lock(&self.faults).refresh, name, fail);
    }

    pub fn fail_destroy(&self, name: &str, fail: bool) {
        toggle(&mut lock(&self.faults).destroy, name, fail);
    }

    pub fn fail_list(&self, fail: bool) {
        lock(&self.faults).list = fail;
    }

    /// Every mutating call made so far, as `op:stack`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, op: &str, stack: &StackRef) {
        lock(&self.calls).push(format!("{op}:{}", stack.name));
    }

    fn injected(&self, pick: impl Fn(&Faults) -> &HashSet<String>, stack: &StackRef) -> bool {
        pick(&lock(&self.faults)).contains(&stack.name)
    }

    fn program_for(&self, project: &str) -> Program {
        self.programs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(project)
            .cloned()
            .unwrap_or_else(default_program)
    }

    fn with_stack<T>(
        &self,
        stack: &StackRef,
        f: impl FnOnce(&mut MemoryStack) -> T,
    ) -> Result<T> {
        lock(&self.stacks)
            .get_mut(stack)
            .map(f)
            .ok_or_else(|| WorkspaceError::NotFound(stack.name.clone()))
    }
}

fn toggle(set: &mut HashSet<String>, name: &str, on: bool) {
    if on {
        set.insert(name.to_string());
    } else {
        set.remove(name);
    }
}

impl AutomationEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn select_or_create(&self, stack: &StackRef, config: &StackConfig) -> Result<()> {
        self.record("select", stack);
        let mut stacks = lock(&self.stacks);
        let entry = stacks.entry(stack.clone()).or_default();
        for (key, value) in config {
            entry.config.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn set_config(&self, stack: &StackRef, key: &str, value: &EngineValue) -> Result<()> {
        self.with_stack(stack, |entry| {
            entry.config.insert(key.to_string(), value.clone());
        })
    }

    fn summary(&self, stack: &StackRef) -> Result<StackSummary> {
        self.with_stack(stack, |entry| StackSummary {
            name: stack.name.clone(),
            update_in_progress: entry.update_in_progress,
            url: format!("memory://{}/{}", stack.project, stack.name),
            last_update: entry.last_update.clone(),
        })
    }

    fn outputs(&self, stack: &StackRef) -> Result<Outputs> {
        self.with_stack(stack, |entry| entry.outputs.clone())
    }

    fn up(&self, stack: &StackRef) -> Result<Outputs> {
        self.record("up", stack);
        let config = self.with_stack(stack, |entry| entry.config.clone())?;

        let result = if self.injected(|f| &f.up, stack) {
            Err(WorkspaceError::Upstream(format!("{stack}: injected up failure")))
        } else {
            (self.program_for(&stack.project))(stack, &config)
        };

        self.with_stack(stack, |entry| {
            entry.last_update = Utc::now().to_rfc3339();
            match &result {
                Ok(outputs) => entry.outputs = outputs.clone(),
                Err(_) => entry.outputs.clear(),
            }
        })?;
        debug!(engine_op = "up", stack = %stack, ok = result.is_ok(), "memory up finished");
        result
    }

    fn refresh(&self, stack: &StackRef) -> Result<()> {
        self.record("refresh", stack);
        self.with_stack(stack, |_| ())?;
        if self.injected(|f| &f.refresh, stack) {
            return Err(WorkspaceError::Upstream(format!(
                "{stack}: injected refresh failure"
            )));
        }
        Ok(())
    }

    fn destroy(&self, stack: &StackRef) -> Result<()> {
        self.record("destroy", stack);
        self.with_stack(stack, |_| ())?;
        if self.injected(|f| &f.destroy, stack) {
            return Err(WorkspaceError::Upstream(format!(
                "{stack}: injected destroy failure"
            )));
        }
        self.with_stack(stack, |entry| {
            entry.outputs.clear();
            entry.last_update = Utc::now().to_rfc3339();
        })
    }

    fn remove(&self, stack: &StackRef) -> Result<()> {
        self.record("remove", stack);
        lock(&self.stacks)
            .remove(stack)
            .map(|_| ())
            .ok_or_else(|| WorkspaceError::NotFound(stack.name.clone()))
    }

    fn list_stacks(&self, project: &str) -> Result<Vec<String>> {
        if lock(&self.faults).list {
            return Err(WorkspaceError::Upstream(format!(
                "{project}: injected list failure"
            )));
        }
        Ok(lock(&self.stacks)
            .keys()
            .filter(|stack| stack.project == project)
            .map(|stack| stack.name.clone())
            .collect())
    }
}
