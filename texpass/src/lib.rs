//! Dependency-ordered task runner for multi-pass LaTeX builds.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (task records, graph resolution,
//!   execution states). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (process execution, configuration
//!   files). Isolated behind traits to enable fakes in tests.
//!
//! [`execute`] runs resolved plans against a process runner, and [`protocol`]
//! wires the compiler/bibliography passes into a task graph.

pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod protocol;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
