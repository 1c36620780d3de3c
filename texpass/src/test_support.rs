//! Test-only helpers: task constructors and a process runner that records
//! invocations instead of spawning them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::task::{ProcessSpec, Task};
use crate::io::config::{BuildConfig, CONFIG_FILE_NAME, write_config};
use crate::io::process::{ProcessError, ProcessExit, ProcessRunner, apply_exit_policy};

/// Create a lifecycle task with no relations.
pub fn lifecycle(name: &str) -> Task {
    Task::lifecycle(name)
}

/// Task names of a resolved plan, in order.
pub fn names<'a>(plan: &[&'a Task]) -> Vec<&'a str> {
    plan.iter().map(|task| task.name.as_str()).collect()
}

#[derive(Debug, Clone, Copy)]
enum Scripted {
    Exit(i32),
    LaunchFailure,
}

/// Process runner that records every spec and answers from a script.
///
/// Programs without a scripted outcome exit with status 0. Exit policies are
/// applied exactly as the real runner applies them.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    outcomes: HashMap<String, Scripted>,
    calls: RefCell<Vec<ProcessSpec>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every run of `program` exit with `code`.
    pub fn with_exit(mut self, program: &str, code: i32) -> Self {
        self.outcomes
            .insert(program.to_string(), Scripted::Exit(code));
        self
    }

    /// Make every run of `program` fail to launch.
    pub fn with_launch_failure(mut self, program: &str) -> Self {
        self.outcomes
            .insert(program.to_string(), Scripted::LaunchFailure);
        self
    }

    /// Every spec passed to `run`, in call order.
    pub fn calls(&self) -> Vec<ProcessSpec> {
        self.calls.borrow().clone()
    }

    /// Program names of every call, in call order.
    pub fn programs(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|spec| spec.program.clone())
            .collect()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, spec: &ProcessSpec) -> Result<ProcessExit, ProcessError> {
        self.calls.borrow_mut().push(spec.clone());
        match self.outcomes.get(&spec.program) {
            Some(Scripted::LaunchFailure) => Err(ProcessError::Launch {
                program: spec.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted launch failure"),
            }),
            Some(Scripted::Exit(code)) => apply_exit_policy(spec, *code == 0, Some(*code)),
            None => apply_exit_policy(spec, true, Some(0)),
        }
    }
}

/// Write an executable shell script to `dir/name` that appends its name and
/// arguments to `log` and exits with `exit_code`.
#[cfg(unix)]
pub fn write_stub_tool(
    dir: &Path,
    name: &str,
    log: &Path,
    exit_code: i32,
) -> io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\necho \"{name} $*\" >> '{}'\nexit {exit_code}\n",
        log.display()
    );
    std::fs::write(&path, script)?;
    let mut perms = std::fs::metadata(&path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms)?;
    Ok(path)
}

/// Temporary project root with the default `src/`, `auxil/` and `out/` layout.
pub struct TestProject {
    temp: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> io::Result<Self> {
        let temp = tempfile::tempdir()?;
        let defaults = BuildConfig::default();
        for dir in [&defaults.src_dir, &defaults.auxil_dir, &defaults.out_dir] {
            std::fs::create_dir_all(temp.path().join(dir))?;
        }
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Write `cfg` to `texpass.toml` under the root.
    pub fn write_config(&self, cfg: &BuildConfig) -> anyhow::Result<PathBuf> {
        let path = self.root().join(CONFIG_FILE_NAME);
        write_config(&path, cfg)?;
        Ok(path)
    }
}
