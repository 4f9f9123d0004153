//! Pulumi CLI adapter.
//!
//! Each backend family's program lives in its own directory under
//! `programs_dir`; the directory name is the stack's project.

use std::path::{Path, PathBuf};

use eph_config::EngineValue;
use eph_core::{Result, WorkspaceError};
use serde::Deserialize;
use tracing::{debug, info};

use super::command::{self, Finished};
use super::{AutomationEngine, Outputs, StackConfig, StackRef, StackSummary};

/// Lets refresh drop resources of clusters that no longer answer, so a
/// half-deleted workspace can still be torn down.
const DELETE_UNREACHABLE: (&str, &str) = ("PULUMI_K8S_DELETE_UNREACHABLE", "true");

pub struct PulumiCli {
    binary: String,
    programs_dir: PathBuf,
    env: Vec<(String, String)>,
}

/// One entry of `pulumi stack ls --json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StackListEntry {
    name: String,
    #[serde(default)]
    update_in_progress: bool,
    #[serde(default)]
    last_update: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl PulumiCli {
    pub fn new(binary: impl Into<String>, programs_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            programs_dir: programs_dir.into(),
            env: vec![(
                DELETE_UNREACHABLE.0.to_string(),
                DELETE_UNREACHABLE.1.to_string(),
            )],
        }
    }

    /// Fails when the binary is not on PATH.
    pub fn detect(binary: &str, programs_dir: impl Into<PathBuf>) -> Result<Self> {
        if !command::is_tool_installed(binary) {
            return Err(WorkspaceError::Config(format!(
                "automation engine binary '{binary}' not found in PATH"
            )));
        }
        Ok(Self::new(binary, programs_dir))
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn project_dir(&self, project: &str) -> PathBuf {
        self.programs_dir.join(project)
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<Finished> {
        debug!(args = ?args, "pulumi");
        command::capture(
            command::build(&self.binary, args, dir, &self.env),
            &self.binary,
        )
    }

    fn run_checked(&self, stack: &StackRef, args: &[&str]) -> Result<String> {
        let finished = self.run(&self.project_dir(&stack.project), args)?;
        check(stack, &finished)?;
        Ok(finished.stdout)
    }

    fn stream_checked(&self, stack: &StackRef, op: &str, args: &[&str]) -> Result<()> {
        let expression =
            command::build(&self.binary, args, &self.project_dir(&stack.project), &self.env);
        let finished = command::stream(expression, &self.binary, op)?;
        check(stack, &finished)
    }

    fn list_entries(&self, project: &str) -> Result<Vec<StackListEntry>> {
        let finished = self.run(&self.project_dir(project), &["stack", "ls", "--json"])?;
        if !finished.success {
            return Err(WorkspaceError::Upstream(format!(
                "listing stacks of {project}: {}",
                finished.stderr.trim()
            )));
        }
        Ok(serde_json::from_str(&finished.stdout)?)
    }
}

fn check(stack: &StackRef, finished: &Finished) -> Result<()> {
    if finished.success {
        return Ok(());
    }
    let message = finished.stderr.trim();
    if is_missing_stack(message) {
        return Err(WorkspaceError::NotFound(stack.name.clone()));
    }
    Err(WorkspaceError::Upstream(format!("{stack}: {message}")))
}

fn is_missing_stack(stderr: &str) -> bool {
    stderr.contains("no stack named") || stderr.contains("could not find stack")
}

impl AutomationEngine for PulumiCli {
    fn name(&self) -> &'static str {
        "pulumi"
    }

    fn select_or_create(&self, stack: &StackRef, config: &StackConfig) -> Result<()> {
        self.run_checked(stack, &["stack", "select", "--create", &stack.name])?;
        for (key, value) in config {
            self.set_config(stack, key, value)?;
        }
        info!(stack = %stack, entries = config.len(), "stack selected and configured");
        Ok(())
    }

    fn set_config(&self, stack: &StackRef, key: &str, value: &EngineValue) -> Result<()> {
        let rendered = value.to_config_string();
        self.run_checked(
            stack,
            &["config", "set", "--stack", &stack.name, "--", key, &rendered],
        )?;
        Ok(())
    }

    fn summary(&self, stack: &StackRef) -> Result<StackSummary> {
        let entry = self
            .list_entries(&stack.project)?
            .into_iter()
            .find(|entry| entry.name == stack.name)
            .ok_or_else(|| WorkspaceError::NotFound(stack.name.clone()))?;

        Ok(StackSummary {
            name: entry.name,
            update_in_progress: entry.update_in_progress,
            url: entry.url.unwrap_or_default(),
            last_update: entry.last_update.unwrap_or_default(),
        })
    }

    fn outputs(&self, stack: &StackRef) -> Result<Outputs> {
        let stdout = self.run_checked(
            stack,
            &["stack", "output", "--json", "--stack", &stack.name],
        )?;
        if stdout.trim().is_empty() {
            return Ok(Outputs::new());
        }
        Ok(serde_json::from_str(&stdout)?)
    }

    fn up(&self, stack: &StackRef) -> Result<Outputs> {
        info!(stack = %stack, "deploying stack");
        self.stream_checked(
            stack,
            "up",
            &["up", "--yes", "--skip-preview", "--stack", &stack.name],
        )?;
        self.outputs(stack)
    }

    fn refresh(&self, stack: &StackRef) -> Result<()> {
        self.stream_checked(stack, "refresh", &["refresh", "--yes", "--stack", &stack.name])
    }

    fn destroy(&self, stack: &StackRef) -> Result<()> {
        info!(stack = %stack, "destroying stack resources");
        self.stream_checked(stack, "destroy", &["destroy", "--yes", "--stack", &stack.name])
    }

    fn remove(&self, stack: &StackRef) -> Result<()> {
        self.run_checked(stack, &["stack", "rm", "--yes", "--stack", &stack.name])?;
        info!(stack = %stack, "removed stack history and config");
        Ok(())
    }

    fn list_stacks(&self, project: &str) -> Result<Vec<String>> {
        Ok(self
            .list_entries(project)?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }
}
