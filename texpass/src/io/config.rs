//! Project configuration stored in `texpass.toml` at the project root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::task::ExitPolicy;

/// File name looked up under the project root when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "texpass.toml";

/// Build configuration (TOML).
///
/// Directory fields are relative to the project root. Missing fields fall back
/// to the layout of a typical single-document LaTeX project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Directory for auxiliary files (`.aux`, `.log`, `.bbl`, ...).
    pub auxil_dir: String,

    /// Directory where the final PDF is written.
    pub out_dir: String,

    /// Directory holding `<main_file>.tex` and the `.bib` database.
    pub src_dir: String,

    /// Base name of the main document, without the `.tex` extension.
    pub main_file: String,

    /// Typesetting compiler executable.
    pub compiler: String,

    /// Bibliography processor executable.
    pub bibliography: String,

    /// Exit policy of compiler passes. The compiler reports warnings with a
    /// non-zero status, so the default ignores it.
    pub compiler_exit: CompilerExit,

    /// Kill any single tool invocation that runs longer than this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompilerExit {
    Ignore,
    Fail,
}

impl From<CompilerExit> for ExitPolicy {
    fn from(value: CompilerExit) -> Self {
        match value {
            CompilerExit::Ignore => ExitPolicy::Ignore,
            CompilerExit::Fail => ExitPolicy::FailOnNonZero,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            auxil_dir: "auxil".to_string(),
            out_dir: "out".to_string(),
            src_dir: "src".to_string(),
            main_file: "main".to_string(),
            compiler: "pdflatex".to_string(),
            bibliography: "bibtex".to_string(),
            compiler_exit: CompilerExit::Ignore,
            process_timeout_secs: None,
        }
    }
}

impl BuildConfig {
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("auxil_dir", &self.auxil_dir),
            ("out_dir", &self.out_dir),
            ("src_dir", &self.src_dir),
            ("main_file", &self.main_file),
            ("compiler", &self.compiler),
            ("bibliography", &self.bibliography),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{key} must be non-empty"));
            }
        }
        if self.main_file.ends_with(".tex") {
            return Err(anyhow!(
                "main_file must not include the .tex extension (got '{}')",
                self.main_file
            ));
        }
        if self.process_timeout_secs == Some(0) {
            return Err(anyhow!("process_timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }

    /// Resolve the configured directories against `root`.
    pub fn paths(&self, root: &Path) -> ProjectPaths {
        ProjectPaths {
            root: root.to_path_buf(),
            auxil_dir: root.join(&self.auxil_dir),
            out_dir: root.join(&self.out_dir),
            src_dir: root.join(&self.src_dir),
        }
    }
}

/// Absolute locations of the directories shared by every tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub auxil_dir: PathBuf,
    pub out_dir: PathBuf,
    pub src_dir: PathBuf,
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BuildConfig::default()`.
pub fn load_config(path: &Path) -> Result<BuildConfig> {
    if !path.exists() {
        let cfg = BuildConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BuildConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BuildConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
