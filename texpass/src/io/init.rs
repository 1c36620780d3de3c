//! Scaffolding for `texpass init`.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use super::config::{BuildConfig, write_config};

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config file.
    pub force: bool,
}

/// Write a default config to `config_path`.
///
/// Fails if the file already exists unless `options.force` is set.
pub fn init_project(config_path: &Path, options: &InitOptions) -> Result<PathBuf> {
    if config_path.is_dir() {
        return Err(anyhow!(
            "texpass init: {} is a directory",
            config_path.display()
        ));
    }
    if config_path.exists() && !options.force {
        return Err(anyhow!(
            "texpass init: {} already exists (use --force to overwrite)",
            config_path.display()
        ));
    }
    write_config(config_path, &BuildConfig::default())?;
    Ok(config_path.to_path_buf())
}
