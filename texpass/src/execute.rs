//! Running resolved task plans.
//!
//! A [`Session`] borrows an immutable [`TaskGraph`] and executes targets
//! strictly in resolved order. The first failing task stops the run; nothing
//! is rolled back, so tool outputs stay on disk for inspection.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::core::graph::{GraphError, TaskGraph};
use crate::core::state::{ExecutionReport, TaskRecord, TaskState};
use crate::core::task::{Action, CachePolicy, Task};
use crate::io::process::{ProcessError, ProcessRunner};

#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("task '{task}' failed")]
    TaskFailed {
        task: String,
        #[source]
        source: ProcessError,
        /// State of every scheduled task at the moment of failure.
        report: Box<ExecutionReport>,
    },
}

/// Hooks for surfacing task progress to the user.
pub trait TaskObserver {
    fn task_started(&mut self, _task: &Task) {}
    fn task_finished(&mut self, _task: &Task, _record: &TaskRecord) {}
}

/// Observer that reports nothing.
impl TaskObserver for () {}

/// One build session: every `execute` call shares the set of tasks that
/// already succeeded, which is consulted for [`CachePolicy::Cacheable`] tasks.
pub struct Session<'g, R, O = ()> {
    graph: &'g TaskGraph,
    runner: R,
    observer: O,
    succeeded: HashSet<String>,
}

impl<'g, R: ProcessRunner> Session<'g, R> {
    pub fn new(graph: &'g TaskGraph, runner: R) -> Self {
        Self::with_observer(graph, runner, ())
    }
}

impl<'g, R: ProcessRunner, O: TaskObserver> Session<'g, R, O> {
    pub fn with_observer(graph: &'g TaskGraph, runner: R, observer: O) -> Self {
        Self {
            graph,
            runner,
            observer,
            succeeded: HashSet::new(),
        }
    }

    /// Resolve `target` and run every scheduled task in order.
    ///
    /// Graph faults are returned before any process is launched.
    #[instrument(skip(self))]
    pub fn execute(&mut self, target: &str) -> Result<ExecutionReport, ExecuteError> {
        let plan = self.graph.resolve(target)?;
        let mut report = ExecutionReport::new(target);
        report.tasks = plan
            .iter()
            .map(|task| TaskRecord::pending(task.name.as_str()))
            .collect();

        for (idx, task) in plan.iter().enumerate() {
            if task.cache == CachePolicy::Cacheable && self.succeeded.contains(&task.name) {
                debug!(task = %task.name, "task up to date");
                advance(&mut report.tasks[idx], TaskState::UpToDate);
                self.observer.task_finished(task, &report.tasks[idx]);
                continue;
            }

            advance(&mut report.tasks[idx], TaskState::Running);
            info!(task = %task.name, "task started");
            self.observer.task_started(task);

            match self.run_action(task) {
                Ok(exit) => {
                    let record = &mut report.tasks[idx];
                    if let Some((code, ignored)) = exit {
                        record.exit_code = code;
                        record.exit_ignored = ignored;
                    }
                    advance(record, TaskState::Succeeded);
                    self.succeeded.insert(task.name.clone());
                    info!(task = %task.name, "task succeeded");
                    self.observer.task_finished(task, record);
                }
                Err(source) => {
                    advance(&mut report.tasks[idx], TaskState::Failed);
                    error!(task = %task.name, err = ?source, "task failed");
                    self.observer.task_finished(task, &report.tasks[idx]);
                    return Err(ExecuteError::TaskFailed {
                        task: task.name.clone(),
                        source,
                        report: Box::new(report),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Give back the observer, e.g. to inspect what it collected.
    pub fn into_observer(self) -> O {
        self.observer
    }

    fn run_action(&self, task: &Task) -> Result<Option<(Option<i32>, bool)>, ProcessError> {
        match &task.action {
            Action::Lifecycle => Ok(None),
            Action::Process(spec) => {
                let exit = self.runner.run(spec)?;
                Ok(Some((exit.code, exit.ignored)))
            }
        }
    }
}

/// Resolve and run `target` in a fresh session.
pub fn execute<R: ProcessRunner>(
    graph: &TaskGraph,
    target: &str,
    runner: R,
) -> Result<ExecutionReport, ExecuteError> {
    Session::new(graph, runner).execute(target)
}

fn advance(record: &mut TaskRecord, next: TaskState) {
    debug_assert!(
        record.state.can_transition_to(next),
        "illegal transition {:?} -> {:?} for {}",
        record.state,
        next,
        record.name
    );
    record.state = next;
}
