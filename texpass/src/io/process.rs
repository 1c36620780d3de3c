//! Launching external tools and applying their exit-code policy.
//!
//! The child inherits stdout/stderr so compiler diagnostics reach the user
//! unmodified. Stdin is closed; every tool here runs non-interactively.

use std::io;
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::task::{ExitPolicy, ProcessSpec};

/// Failures surfaced by a [`ProcessRunner`].
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to launch '{program}'")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' {}", describe_exit(.exit_code))]
    Execution {
        program: String,
        exit_code: Option<i32>,
    },

    #[error("'{program}' timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("failed waiting for '{program}'")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

/// Exit status of a process that finished without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    /// True when the exit was non-zero and tolerated by [`ExitPolicy::Ignore`].
    pub ignored: bool,
}

/// Runs a [`ProcessSpec`] to completion.
pub trait ProcessRunner {
    fn run(&self, spec: &ProcessSpec) -> Result<ProcessExit, ProcessError>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn run(&self, spec: &ProcessSpec) -> Result<ProcessExit, ProcessError> {
        (**self).run(spec)
    }
}

/// Runner that spawns real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    #[instrument(skip_all, fields(program = %spec.program, policy = ?spec.policy))]
    fn run(&self, spec: &ProcessSpec) -> Result<ProcessExit, ProcessError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        debug!(
            command = %spec.command_line(),
            workdir = %spec.workdir.display(),
            "spawning child process"
        );
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(err = %e, "failed to spawn command");
                return Err(ProcessError::Launch {
                    program: spec.program.clone(),
                    source: e,
                });
            }
        };

        let wait_error = |source: io::Error| ProcessError::Wait {
            program: spec.program.clone(),
            source,
        };
        let status = match spec.timeout {
            Some(timeout) => match child.wait_timeout(timeout).map_err(wait_error)? {
                Some(status) => status,
                None => {
                    warn!(
                        timeout_secs = timeout.as_secs(),
                        "command timed out, killing"
                    );
                    child.kill().map_err(wait_error)?;
                    child.wait().map_err(wait_error)?;
                    return Err(ProcessError::TimedOut {
                        program: spec.program.clone(),
                        timeout,
                    });
                }
            },
            None => child.wait().map_err(wait_error)?,
        };

        debug!(exit_code = ?status.code(), "command finished");
        apply_exit_policy(spec, status.success(), status.code())
    }
}

/// Decide whether a finished process counts as a failure under `spec.policy`.
pub fn apply_exit_policy(
    spec: &ProcessSpec,
    success: bool,
    code: Option<i32>,
) -> Result<ProcessExit, ProcessError> {
    if success {
        return Ok(ProcessExit {
            code,
            ignored: false,
        });
    }
    match spec.policy {
        ExitPolicy::Ignore => {
            warn!(program = %spec.program, exit_code = ?code, "ignoring non-zero exit");
            Ok(ProcessExit {
                code,
                ignored: true,
            })
        }
        ExitPolicy::FailOnNonZero => Err(ProcessError::Execution {
            program: spec.program.clone(),
            exit_code: code,
        }),
    }
}
