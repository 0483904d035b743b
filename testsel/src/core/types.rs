//! Shared deterministic types for selection core logic.
//!
//! These types define stable contracts between the change detector, the
//! dependency mapper, the matrix expander and the selection engine. They must
//! not depend on external state and must order deterministically.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::matrix::MatrixCase;

/// Revision marker recorded for changes that only exist in the working tree.
pub const WORKTREE_REVISION: &str = "worktree";

/// How a file differs between the base reference and the working state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Untracked,
}

impl ChangeKind {
    /// Map a `git diff --name-status` letter to a change kind.
    pub fn from_status_letter(letter: char) -> Option<Self> {
        match letter {
            'A' | 'C' => Some(Self::Added),
            // `U` (unmerged) appears mid-merge; the file's content is in flux.
            'M' | 'T' | 'U' => Some(Self::Modified),
            'D' => Some(Self::Deleted),
            'R' => Some(Self::Renamed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::Untracked => "untracked",
        }
    }
}

/// A changed file in the repository.
///
/// Identity is the repository-relative path; two entries with the same path
/// are the same file even when the recorded change kind differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// Repository-relative path using `/` separators.
    pub path: String,
    pub kind: ChangeKind,
    /// Short HEAD sha for committed changes, `worktree` otherwise.
    pub revision: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, kind: ChangeKind, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            revision: revision.into(),
        }
    }
}

impl PartialEq for SourceFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for SourceFile {}

impl PartialOrd for SourceFile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SourceFile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path)
    }
}

/// A discovered test module and the project modules it imports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestModule {
    /// Repository-relative path of the test file.
    pub path: String,
    /// Dotted module id of the test file itself.
    pub module: String,
    /// Dotted ids of project modules imported by the test.
    pub imports: Vec<String>,
}

/// Selection mode requested by the harness.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Every test module with every matrix case.
    Full,
    /// Only impacted test modules; change detection failures are fatal.
    ChangedOnly,
    /// Like `ChangedOnly`, but falls back to `Full` when change detection fails.
    #[default]
    ChangedOnlyFallback,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::ChangedOnly => write!(f, "changed-only"),
            Self::ChangedOnlyFallback => write!(f, "changed-only-fallback"),
        }
    }
}

/// Non-fatal signal that changed files could not be mapped onto the module graph.
///
/// When raised, the mapper widens the impacted set to every test module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleGraphWarning {
    /// Changed paths with no counterpart in the static graph, sorted.
    pub unmapped: Vec<String>,
}

impl fmt::Display for StaleGraphWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "module graph is stale for {} changed path(s): {}",
            self.unmapped.len(),
            self.unmapped.join(", ")
        )
    }
}

/// One unit of work for the harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntry {
    /// Repository-relative path of the test module.
    pub test: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case: Option<MatrixCase>,
}

impl SelectionEntry {
    /// Stable harness-facing label, `path` or `path[case-id]`.
    pub fn label(&self) -> String {
        match &self.case {
            Some(case) => format!("{}[{}]", self.test, case.id()),
            None => self.test.clone(),
        }
    }
}

/// Ordered, duplicate-free selection produced for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub requested_mode: Mode,
    /// Mode that actually produced `entries` (differs after a fallback).
    pub effective_mode: Mode,
    pub base_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<StaleGraphWarning>,
    /// Hex SHA-256 over entry labels of the unsharded selection; equal for
    /// identical selections, so shard workers can cross-check their inputs.
    pub fingerprint: String,
    pub entries: Vec<SelectionEntry>,
}

impl SelectionResult {
    pub fn fell_back(&self) -> bool {
        self.requested_mode != self.effective_mode
    }

    /// Distinct test module paths, in selection order.
    pub fn test_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if paths.last() != Some(&entry.test.as_str()) {
                paths.push(entry.test.as_str());
            }
        }
        paths
    }
}
