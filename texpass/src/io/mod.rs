//! I/O helpers for texpass commands.

pub mod config;
pub mod init;
pub mod process;
