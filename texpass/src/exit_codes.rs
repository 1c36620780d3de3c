//! Stable exit codes for texpass CLI commands.

/// Every requested target ran to completion.
pub const OK: i32 = 0;
/// A task failed: a tool could not be launched, exited non-zero under a
/// strict policy, or timed out.
pub const TASK_FAILED: i32 = 1;
/// Invalid configuration or task graph (unknown target, cycle, duplicate,
/// unreadable config). Reported before any tool runs.
pub const INVALID: i32 = 2;
