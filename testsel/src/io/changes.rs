//! Change detection against a version-control reference.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use super::git::Git;
use crate::core::types::{ChangeKind, SourceFile, WORKTREE_REVISION};
use crate::error::ChangeError;

/// Base reference meaning "uncommitted changes relative to `HEAD`".
pub const WORKTREE_REF: &str = "WORKTREE";

/// Produces the set of files changed since a base reference.
pub trait ChangeDetector {
    fn detect_changes(&self, base_ref: &str) -> Result<BTreeSet<SourceFile>, ChangeError>;
}

/// Git-backed change detector.
///
/// Lists files whose content differs between `base_ref` and the working tree,
/// including staged, unstaged and untracked files. Files whose working-tree
/// content differs from `HEAD` are stamped `worktree`; the rest carry the
/// short `HEAD` sha.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    git: Git,
}

impl GitChangeDetector {
    pub fn new(git: Git) -> Self {
        Self { git }
    }
}

impl ChangeDetector for GitChangeDetector {
    #[instrument(skip(self))]
    fn detect_changes(&self, base_ref: &str) -> Result<BTreeSet<SourceFile>, ChangeError> {
        let head = self.git.resolve("HEAD")?;
        let base = if base_ref == WORKTREE_REF {
            head.clone()
        } else {
            self.git.resolve(base_ref)?
        };
        let untracked = self.git.untracked()?;

        // Paths whose working-tree content differs from HEAD.
        let worktree: BTreeSet<String> = if base == head {
            BTreeSet::new()
        } else {
            self.git
                .diff_against_worktree(&head)?
                .into_iter()
                .map(|entry| entry.path)
                .collect()
        };
        let head_short = self.git.head_short_sha(12)?;

        let mut files: BTreeMap<String, SourceFile> = BTreeMap::new();
        for entry in self.git.diff_against_worktree(&base)? {
            let revision = if base == head || worktree.contains(&entry.path) {
                WORKTREE_REVISION
            } else {
                head_short.as_str()
            };
            let file = SourceFile::new(entry.path.clone(), entry.kind, revision);
            files.insert(entry.path, file);
        }
        for path in untracked {
            files.insert(
                path.clone(),
                SourceFile::new(path, ChangeKind::Untracked, WORKTREE_REVISION),
            );
        }

        debug!(base_ref, changed = files.len(), "change detection complete");
        Ok(files.into_values().collect())
    }
}
