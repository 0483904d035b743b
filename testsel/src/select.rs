//! Selection engine: the single entry point consumed by a test harness.
//!
//! Composes change detection, dependency mapping and matrix expansion into an
//! ordered [`SelectionResult`]. Under [`Mode::ChangedOnlyFallback`] any change
//! detection failure degrades to a full selection instead of under-testing.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::graph::DependencyMapper;
use crate::core::matrix::MatrixDesign;
use crate::core::paths::IgnoreRules;
use crate::core::selection::{cross_with_matrix, fingerprint};
use crate::core::types::{Mode, SelectionResult, SourceFile, StaleGraphWarning, TestModule};
use crate::error::ChangeError;
use crate::io::changes::{ChangeDetector, GitChangeDetector};
use crate::io::config::SelectorConfig;
use crate::io::git::Git;
use crate::io::scan::{Project, scan_project};

/// Read-only selection context for one test session.
///
/// The reverse-dependency index is built once here and reused by every call
/// to [`Selector::select`].
pub struct Selector<'p, D> {
    project: &'p Project,
    mapper: DependencyMapper<'p>,
    matrix: &'p MatrixDesign,
    ignore: &'p IgnoreRules,
    detector: D,
}

impl<'p, D: ChangeDetector> Selector<'p, D> {
    pub fn new(
        project: &'p Project,
        matrix: &'p MatrixDesign,
        ignore: &'p IgnoreRules,
        detector: D,
    ) -> Self {
        Self {
            project,
            mapper: DependencyMapper::new(&project.graph),
            matrix,
            ignore,
            detector,
        }
    }

    /// Select the tests to run for `mode`, measuring changes against `base_ref`.
    ///
    /// Only `Mode::ChangedOnly` can fail; the other modes always produce a
    /// complete result.
    pub fn select(&self, mode: Mode, base_ref: &str) -> Result<SelectionResult, ChangeError> {
        if mode == Mode::Full {
            let tests = &self.project.tests;
            return Ok(self.finish(mode, Mode::Full, base_ref, None, Vec::new(), tests));
        }

        let changed = match self.detector.detect_changes(base_ref) {
            Ok(changed) => changed,
            Err(err) if mode == Mode::ChangedOnlyFallback => {
                warn!(%err, base_ref, "change detection failed, falling back to full selection");
                return Ok(self.finish(
                    mode,
                    Mode::Full,
                    base_ref,
                    Some(err.to_string()),
                    Vec::new(),
                    &self.project.tests,
                ));
            }
            Err(err) => return Err(err),
        };

        let relevant: BTreeSet<SourceFile> = changed
            .into_iter()
            .filter(|file| !self.ignore.is_ignored(&file.path))
            .collect();
        let impact = self.mapper.impacted_tests(&relevant, &self.project.tests);
        let warnings: Vec<StaleGraphWarning> = impact.stale.into_iter().collect();
        Ok(self.finish(mode, mode, base_ref, None, warnings, &impact.tests))
    }

    fn finish(
        &self,
        requested: Mode,
        effective: Mode,
        base_ref: &str,
        fallback_reason: Option<String>,
        warnings: Vec<StaleGraphWarning>,
        tests: &[TestModule],
    ) -> SelectionResult {
        let entries = cross_with_matrix(tests, self.matrix);
        info!(
            %requested,
            %effective,
            modules = tests.len(),
            entries = entries.len(),
            "selection complete"
        );
        SelectionResult {
            requested_mode: requested,
            effective_mode: effective,
            base_ref: base_ref.to_string(),
            fallback_reason,
            warnings,
            fingerprint: fingerprint(&entries),
            entries,
        }
    }
}

/// Static inputs loaded from a repository checkout.
#[derive(Debug)]
pub struct Workspace {
    pub project: Project,
    pub matrix: MatrixDesign,
    pub ignore: IgnoreRules,
    pub config: SelectorConfig,
}

impl Workspace {
    /// Scan the project and expand the matrix declared in `config`.
    pub fn load(root: &Path, config: SelectorConfig) -> Result<Self> {
        let matrix = config.matrix.design()?;
        let ignore = config.project.ignore_rules()?;
        let project = scan_project(root, &config.project)
            .with_context(|| format!("scan project {}", root.display()))?;
        Ok(Self {
            project,
            matrix,
            ignore,
            config,
        })
    }

    /// Selector backed by git in `root`, honoring the configured limits.
    pub fn git_selector(&self, root: &Path) -> Selector<'_, GitChangeDetector> {
        let git = Git::new(root)
            .with_limits(self.config.vcs_timeout(), self.config.vcs_output_limit_bytes);
        Selector::new(
            &self.project,
            &self.matrix,
            &self.ignore,
            GitChangeDetector::new(git),
        )
    }
}

/// Load the workspace at `root` and run one selection against git.
pub fn select_from_root(
    root: &Path,
    config: SelectorConfig,
    mode: Mode,
    base_ref: &str,
) -> Result<SelectionResult> {
    let workspace = Workspace::load(root, config)?;
    let selection = workspace
        .git_selector(root)
        .select(mode, base_ref)
        .with_context(|| format!("select tests changed since {base_ref}"))?;
    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matrix::MatrixAxis;
    use crate::core::types::{ChangeKind, WORKTREE_REVISION};
    use crate::test_support::{ScriptedDetector, sample_project};

    fn modified(paths: &[&str]) -> BTreeSet<SourceFile> {
        paths
            .iter()
            .map(|p| SourceFile::new(*p, ChangeKind::Modified, WORKTREE_REVISION))
            .collect()
    }

    fn matrix() -> MatrixDesign {
        MatrixDesign::new(
            vec![
                MatrixAxis::new("dtype", ["i32", "f64"]),
                MatrixAxis::new("platform", ["linux", "mac"]),
            ],
            &[],
            &[],
        )
        .expect("matrix")
    }

    fn labels(result: &SelectionResult) -> Vec<String> {
        result.entries.iter().map(|e| e.label()).collect()
    }

    #[test]
    fn full_mode_selects_everything_without_detection() {
        let project = sample_project();
        let matrix = matrix();
        let ignore = IgnoreRules::default();
        let detector = ScriptedDetector::failing(ChangeError::Vcs("unused".to_string()));
        let selector = Selector::new(&project, &matrix, &ignore, detector);

        let result = selector.select(Mode::Full, "main").expect("select");
        assert_eq!(result.entries.len(), project.tests.len() * 4);
        assert!(!result.fell_back());
        assert_eq!(selector.detector.calls(), 0);
    }

    #[test]
    fn changed_only_applies_full_matrix_to_impacted_modules() {
        let project = sample_project();
        let matrix = matrix();
        let ignore = IgnoreRules::default();
        let selector = Selector::new(
            &project,
            &matrix,
            &ignore,
            ScriptedDetector::returning(modified(&["pkg/core.py"])),
        );

        let result = selector.select(Mode::ChangedOnly, "main").expect("select");
        assert_eq!(
            labels(&result),
            vec![
                "tests/test_api.py[i32-linux]",
                "tests/test_api.py[i32-mac]",
                "tests/test_api.py[f64-linux]",
                "tests/test_api.py[f64-mac]",
                "tests/test_core.py[i32-linux]",
                "tests/test_core.py[i32-mac]",
                "tests/test_core.py[f64-linux]",
                "tests/test_core.py[f64-mac]",
            ]
        );
        assert_eq!(result.effective_mode, Mode::ChangedOnly);
    }

    #[test]
    fn changed_only_propagates_missing_reference() {
        let project = sample_project();
        let matrix = MatrixDesign::default();
        let ignore = IgnoreRules::default();
        let missing = ChangeError::ReferenceNotFound {
            reference: "nope".to_string(),
        };
        let detector = ScriptedDetector::failing(missing.clone());
        let selector = Selector::new(&project, &matrix, &ignore, detector);
        assert_eq!(selector.select(Mode::ChangedOnly, "nope").unwrap_err(), missing);
    }

    #[test]
    fn fallback_matches_full_when_reference_missing() {
        let project = sample_project();
        let matrix = matrix();
        let ignore = IgnoreRules::default();
        let selector = Selector::new(
            &project,
            &matrix,
            &ignore,
            ScriptedDetector::failing(ChangeError::ReferenceNotFound {
                reference: "nope".to_string(),
            }),
        );

        let fallback = selector
            .select(Mode::ChangedOnlyFallback, "nope")
            .expect("fallback");
        let full = selector.select(Mode::Full, "nope").expect("full");
        assert_eq!(fallback.entries, full.entries);
        assert_eq!(fallback.fingerprint, full.fingerprint);
        assert!(fallback.fell_back());
        assert_eq!(
            fallback.fallback_reason.as_deref(),
            Some("reference not found: nope")
        );
    }

    #[test]
    fn fallback_on_timeout() {
        let project = sample_project();
        let matrix = MatrixDesign::default();
        let ignore = IgnoreRules::default();
        let selector = Selector::new(
            &project,
            &matrix,
            &ignore,
            ScriptedDetector::failing(ChangeError::Timeout {
                command: "diff".to_string(),
                timeout_secs: 1,
            }),
        );
        let result = selector.select(Mode::ChangedOnlyFallback, "main").expect("select");
        assert_eq!(result.effective_mode, Mode::Full);
        assert_eq!(result.entries.len(), project.tests.len());
    }

    #[test]
    fn ignored_paths_do_not_widen_selection() {
        let project = sample_project();
        let matrix = MatrixDesign::default();
        let ignore =
            IgnoreRules::new(&["docs/".to_string(), "*.md".to_string()]).expect("ignore rules");
        let selector = Selector::new(
            &project,
            &matrix,
            &ignore,
            ScriptedDetector::returning(modified(&[
                "docs/index.rst",
                "README.md",
                "pkg/lonely.py",
            ])),
        );
        let result = selector.select(Mode::ChangedOnlyFallback, "main").expect("select");
        assert_eq!(result.test_paths(), vec!["tests/test_lonely.py"]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn stale_graph_widens_and_reports() {
        let project = sample_project();
        let matrix = MatrixDesign::default();
        let ignore = IgnoreRules::default();
        let selector = Selector::new(
            &project,
            &matrix,
            &ignore,
            ScriptedDetector::returning(modified(&["pyproject.toml"])),
        );
        let result = selector.select(Mode::ChangedOnly, "main").expect("select");
        assert_eq!(result.entries.len(), project.tests.len());
        assert_eq!(result.effective_mode, Mode::ChangedOnly);
        assert_eq!(result.warnings[0].unmapped, vec!["pyproject.toml"]);
    }

    #[test]
    fn repeated_selection_is_identical() {
        let project = sample_project();
        let matrix = matrix();
        let ignore = IgnoreRules::default();
        let selector = Selector::new(
            &project,
            &matrix,
            &ignore,
            ScriptedDetector::returning(modified(&["pkg/utils.py", "pkg/a.py"])),
        );
        let first = selector.select(Mode::ChangedOnlyFallback, "main").expect("first");
        let second = selector.select(Mode::ChangedOnlyFallback, "main").expect("second");
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).expect("json"),
            serde_json::to_string(&second).expect("json")
        );
    }

    #[test]
    fn no_changes_selects_nothing() {
        let project = sample_project();
        let matrix = matrix();
        let ignore = IgnoreRules::default();
        let detector = ScriptedDetector::returning(BTreeSet::new());
        let selector = Selector::new(&project, &matrix, &ignore, detector);
        let result = selector.select(Mode::ChangedOnlyFallback, "main").expect("select");
        assert!(result.entries.is_empty());
        assert!(!result.fell_back());
    }
}
