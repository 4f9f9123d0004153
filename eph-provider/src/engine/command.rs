// Standard library
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::path::Path;

// External crates
use duct::{cmd, Expression};
use tracing::debug;
use which::which;

// Internal imports
use eph_core::{Result, WorkspaceError};

/// Lines kept from a streamed command for its error message.
const TAIL_LINES: usize = 20;

/// Output of a command that ran to completion, successfully or not.
#[derive(Debug)]
pub(crate) struct Finished {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

pub(crate) fn build<A: AsRef<OsStr>>(
    program: &str,
    args: &[A],
    dir: &Path,
    env: &[(String, String)],
) -> Expression {
    let mut expression = cmd(program, args).dir(dir);
    for (key, value) in env {
        expression = expression.env(key, value);
    }
    expression
}

/// Run a command and capture both streams.
pub(crate) fn capture(expression: Expression, program: &str) -> Result<Finished> {
    let output = expression
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .map_err(|e| spawn_error(program, e))?;

    Ok(Finished {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command, forwarding every output line to the log as it arrives.
///
/// The last lines are returned as `stderr` so failures carry their cause.
pub(crate) fn stream(expression: Expression, program: &str, op: &str) -> Result<Finished> {
    let reader = expression
        .stderr_to_stdout()
        .unchecked()
        .reader()
        .map_err(|e| spawn_error(program, e))?;

    // Progress output is not guaranteed to be UTF-8. Bailing out here would
    // drop the reader and kill the child mid-run.
    let mut output = BufReader::new(&reader);
    let mut buf = Vec::new();
    let mut tail = VecDeque::with_capacity(TAIL_LINES);
    loop {
        buf.clear();
        if output.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        debug!(engine_op = op, "{}", line);
        if tail.len() == TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    let success = match reader.try_wait()? {
        Some(output) => output.status.success(),
        None => false,
    };

    Ok(Finished {
        success,
        stdout: String::new(),
        stderr: Vec::from(tail).join("\n"),
    })
}

/// Checks if a command-line tool is available in the system's PATH.
pub(crate) fn is_tool_installed(tool_name: &str) -> bool {
    which(tool_name).is_ok()
}

fn spawn_error(program: &str, err: std::io::Error) -> WorkspaceError {
    WorkspaceError::Upstream(format!("failed to execute '{program}': {err}"))
}
