//! Per-task execution states and the report produced by one execution.

use serde::Serialize;

/// Lifecycle of a task within a single execution.
///
/// `Pending -> Running -> {Succeeded, Failed}`. `UpToDate` is reached directly
/// from `Pending` and only by cacheable tasks that already succeeded in the
/// current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    UpToDate,
}

impl TaskState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::UpToDate)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

/// Outcome of one task in an execution, in resolved order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub state: TaskState,
    /// Exit code of the task's process, when it ran one and it exited normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// True when a non-zero exit was tolerated by the exit policy.
    pub exit_ignored: bool,
}

impl TaskRecord {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: TaskState::Pending,
            exit_code: None,
            exit_ignored: false,
        }
    }
}

/// Every task visited by one execution, in the order it was scheduled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub target: String,
    pub tasks: Vec<TaskRecord>,
}

impl ExecutionReport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            tasks: Vec::new(),
        }
    }

    pub fn task(&self, name: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|record| record.name == name)
    }

    /// Names of tasks whose action actually ran, in order.
    pub fn executed(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|record| matches!(record.state, TaskState::Succeeded | TaskState::Failed))
            .map(|record| record.name.as_str())
            .collect()
    }

    /// Tasks whose non-zero exit was tolerated.
    pub fn ignored_exits(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(|record| record.exit_ignored)
    }

    pub fn succeeded(&self) -> bool {
        self.tasks.iter().all(|record| {
            matches!(record.state, TaskState::Succeeded | TaskState::UpToDate)
        })
    }
}
