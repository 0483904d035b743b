//! Selector configuration stored in `testsel.toml` at the repository root.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use super::git::{DEFAULT_GIT_TIMEOUT, DEFAULT_OUTPUT_LIMIT_BYTES};
use crate::core::matrix::{Assignment, MatrixAxis, MatrixDesign};
use crate::core::paths::{IgnoreRules, NameGlobs};
use crate::core::types::Mode;

pub const CONFIG_FILE: &str = "testsel.toml";

/// Selector configuration (TOML).
///
/// Edited by humans; missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SelectorConfig {
    /// Selection mode used when the CLI does not override it.
    pub mode: Mode,

    /// Reference that changes are measured against (`WORKTREE` for uncommitted only).
    pub base_ref: String,

    /// Wall-clock budget for each git invocation.
    pub vcs_timeout_secs: u64,

    /// Fail change detection when git output exceeds this many bytes.
    pub vcs_output_limit_bytes: usize,

    pub project: ProjectConfig,

    pub matrix: MatrixConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directories whose Python files form importable modules (`.` = repo root).
    pub source_roots: Vec<String>,

    /// File-name globs identifying test modules.
    pub test_patterns: Vec<String>,

    /// Changed paths matching these patterns never affect selection.
    pub ignore: Vec<String>,
}

impl ProjectConfig {
    pub fn test_globs(&self) -> Result<NameGlobs> {
        NameGlobs::new(&self.test_patterns).context("invalid glob in project.test_patterns")
    }

    pub fn ignore_rules(&self) -> Result<IgnoreRules> {
        IgnoreRules::new(&self.ignore).context("invalid glob in project.ignore")
    }
}

/// Declarative parameter matrix.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MatrixConfig {
    pub axes: Vec<MatrixAxis>,
    pub excludes: Vec<Assignment>,
    pub includes: Vec<Assignment>,
}

impl MatrixConfig {
    /// Validate and expand into the case list.
    pub fn design(&self) -> Result<MatrixDesign> {
        MatrixDesign::new(self.axes.clone(), &self.excludes, &self.includes)
            .context("invalid matrix")
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            source_roots: vec![".".to_string()],
            test_patterns: vec!["test_*.py".to_string(), "*_test.py".to_string()],
            ignore: vec![
                "docs/".to_string(),
                "*.md".to_string(),
                "*.rst".to_string(),
                ".gitignore".to_string(),
            ],
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            base_ref: "origin/main".to_string(),
            vcs_timeout_secs: DEFAULT_GIT_TIMEOUT.as_secs(),
            vcs_output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            project: ProjectConfig::default(),
            matrix: MatrixConfig::default(),
        }
    }
}

impl SelectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_ref.trim().is_empty() {
            return Err(anyhow!("base_ref must be non-empty"));
        }
        if self.vcs_timeout_secs == 0 {
            return Err(anyhow!("vcs_timeout_secs must be > 0"));
        }
        if self.vcs_output_limit_bytes == 0 {
            return Err(anyhow!("vcs_output_limit_bytes must be > 0"));
        }
        if self.project.source_roots.is_empty() {
            return Err(anyhow!("project.source_roots must be a non-empty array"));
        }
        if self.project.test_patterns.is_empty() {
            return Err(anyhow!("project.test_patterns must be a non-empty array"));
        }
        self.project.test_globs()?;
        self.project.ignore_rules()?;
        self.matrix.design()?;
        Ok(())
    }

    pub fn vcs_timeout(&self) -> Duration {
        Duration::from_secs(self.vcs_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SelectorConfig::default()`. Matrix
/// declaration errors surface here rather than at selection time.
pub fn load_config(path: &Path) -> Result<SelectorConfig> {
    if !path.exists() {
        let cfg = SelectorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SelectorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SelectorConfig) -> Result<()> {
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
