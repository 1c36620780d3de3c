//! Plain data records describing tasks and the processes they launch.
//!
//! Tasks are built by ordinary functions (see [`crate::protocol`]) and handed
//! to a [`TaskGraphBuilder`](crate::core::graph::TaskGraphBuilder). Nothing
//! here performs I/O.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// How a non-zero exit status of a child process is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitPolicy {
    /// Non-zero exit (or death by signal) is a fatal error.
    #[serde(rename = "fail-on-nonzero")]
    FailOnNonZero,
    /// Non-zero exit is recorded and returned, never raised.
    #[serde(rename = "ignore-exit-code")]
    Ignore,
}

/// Whether a task may be skipped once it has succeeded in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Skipped when it already succeeded earlier in the same session.
    Cacheable,
    /// Always stale: every invocation re-runs the action.
    AlwaysRun,
}

/// An external command with its working directory and exit policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub policy: ExitPolicy,
    /// Kill the child if it is still running after this long.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            policy: ExitPolicy::FailOnNonZero,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn policy(mut self, policy: ExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Render as a shell-like command line for logs and `plan` output.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// The unit of work a task performs when it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Action {
    /// Launch an external process.
    Process(ProcessSpec),
    /// No work of its own; only orders dependencies and finalizers.
    Lifecycle,
}

/// A named unit of work with its ordering relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub depends_on: Vec<String>,
    pub finalized_by: Vec<String>,
    pub cache: CachePolicy,
    pub action: Action,
}

impl Task {
    /// A task that runs `spec`. Defaults to [`CachePolicy::AlwaysRun`].
    pub fn process(name: impl Into<String>, spec: ProcessSpec) -> Self {
        Self::with_action(name, Action::Process(spec))
    }

    /// A task without an action of its own.
    pub fn lifecycle(name: impl Into<String>) -> Self {
        Self::with_action(name, Action::Lifecycle)
    }

    fn with_action(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            depends_on: Vec::new(),
            finalized_by: Vec::new(),
            cache: CachePolicy::AlwaysRun,
            action,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn finalized_by(mut self, name: impl Into<String>) -> Self {
        self.finalized_by.push(name.into());
        self
    }

    pub fn cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// Every task name this task refers to, dependencies first.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.depends_on
            .iter()
            .chain(self.finalized_by.iter())
            .map(String::as_str)
    }
}
