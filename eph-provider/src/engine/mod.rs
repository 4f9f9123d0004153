//! The infrastructure-automation engine seam.
//!
//! Every workspace is one engine stack. The engine owns all state: config,
//! outputs and update history are read back from it on every call.

use eph_config::EngineValue;
use eph_core::Result;
use indexmap::IndexMap;
use std::fmt;

mod command;
pub mod memory;
pub mod pulumi;

pub use memory::{default_program, MemoryEngine, Program};
pub use pulumi::PulumiCli;

/// Stack outputs, as exported by the stack's program.
pub type Outputs = IndexMap<String, serde_json::Value>;

/// Config entries written to a stack before it is deployed.
pub type StackConfig = IndexMap<String, EngineValue>;

/// A stack inside one engine project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackRef {
    pub project: String,
    pub name: String,
}

impl StackRef {
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.name)
    }
}

/// What the engine knows about a stack without running anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackSummary {
    pub name: String,
    pub update_in_progress: bool,
    pub url: String,
    pub last_update: String,
}

/// Operations the workspace backends need from an automation engine.
///
/// All methods block until the engine finishes; `up` and `destroy` can take
/// many minutes. A stack the engine does not know is reported as
/// `WorkspaceError::NotFound`.
pub trait AutomationEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Select the stack, creating it if needed, and write `config` into it.
    fn select_or_create(&self, stack: &StackRef, config: &StackConfig) -> Result<()>;

    /// Write a single config entry into an existing stack.
    fn set_config(&self, stack: &StackRef, key: &str, value: &EngineValue) -> Result<()>;

    fn summary(&self, stack: &StackRef) -> Result<StackSummary>;

    fn outputs(&self, stack: &StackRef) -> Result<Outputs>;

    /// Deploy the stack's program with its current config.
    fn up(&self, stack: &StackRef) -> Result<Outputs>;

    fn refresh(&self, stack: &StackRef) -> Result<()>;

    /// Tear down every resource the stack declares. The stack itself stays.
    fn destroy(&self, stack: &StackRef) -> Result<()>;

    /// Forget the stack: its config, history and outputs.
    fn remove(&self, stack: &StackRef) -> Result<()>;

    /// Tear down, then forget. Nothing is forgotten if the teardown fails.
    fn destroy_and_forget(&self, stack: &StackRef) -> Result<()> {
        self.destroy(stack)?;
        self.remove(stack)
    }

    fn list_stacks(&self, project: &str) -> Result<Vec<String>>;
}
