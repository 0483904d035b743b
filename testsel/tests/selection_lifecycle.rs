//! End-to-end selection tests against real git repositories.
//!
//! Each test seeds the sample Python project (see
//! `TestRepo::seed_python_project`), mutates the working tree or history, and
//! checks which test modules the selector picks.

use std::collections::BTreeMap;

use testsel::core::matrix::MatrixAxis;
use testsel::core::types::{ChangeKind, Mode, SelectionResult, WORKTREE_REVISION};
use testsel::error::ChangeError;
use testsel::io::changes::{ChangeDetector, GitChangeDetector, WORKTREE_REF};
use testsel::io::config::SelectorConfig;
use testsel::io::git::{DEFAULT_GIT_TIMEOUT, Git};
use testsel::select::{Workspace, select_from_root};
use testsel::test_support::TestRepo;

fn seeded() -> TestRepo {
    let repo = TestRepo::new().expect("repo");
    repo.seed_python_project().expect("seed");
    repo
}

fn select(repo: &TestRepo, mode: Mode, base: &str) -> SelectionResult {
    select_from_root(repo.path(), SelectorConfig::default(), mode, base).expect("select")
}

fn selected(repo: &TestRepo, mode: Mode, base: &str) -> Vec<String> {
    let result = select(repo, mode, base);
    result.test_paths().into_iter().map(str::to_string).collect()
}

#[test]
fn modified_module_selects_direct_and_transitive_tests() {
    let repo = seeded();
    repo.write("pkg/core.py", "VALUE = 2\n").expect("write");

    assert_eq!(
        selected(&repo, Mode::ChangedOnly, WORKTREE_REF),
        vec!["tests/test_api.py", "tests/test_core.py"]
    );
}

#[test]
fn conftest_change_selects_every_test_in_directory() {
    let repo = seeded();
    repo.write("tests/conftest.py", "import pytest\nFIXTURE = 1\n").expect("write");

    assert_eq!(
        selected(&repo, Mode::ChangedOnly, "main"),
        vec!["tests/test_api.py", "tests/test_core.py", "tests/test_misc.py"]
    );
}

#[test]
fn committed_changes_since_base_are_selected() {
    let repo = seeded();
    repo.git(&["branch", "base"]).expect("branch");
    repo.write("pkg/misc.py", "import os\nimport sys\n").expect("write");
    repo.commit_all("touch misc").expect("commit");

    assert_eq!(selected(&repo, Mode::ChangedOnly, "base"), vec!["tests/test_misc.py"]);
    assert!(selected(&repo, Mode::ChangedOnly, "main").is_empty());
}

#[test]
fn committed_changes_carry_head_revision() {
    let repo = seeded();
    repo.write("pkg/misc.py", "import os\nimport sys\n").expect("write");
    repo.commit_all("touch misc").expect("commit");
    repo.write("pkg/core.py", "VALUE = 3\n").expect("write");
    let head = repo.git(&["rev-parse", "--short=12", "HEAD"]).expect("rev-parse");

    let changed = GitChangeDetector::new(Git::new(repo.path()))
        .detect_changes("HEAD~1")
        .expect("detect");
    let by_path: BTreeMap<&str, (&ChangeKind, &str)> = changed
        .iter()
        .map(|f| (f.path.as_str(), (&f.kind, f.revision.as_str())))
        .collect();
    assert_eq!(by_path["pkg/misc.py"], (&ChangeKind::Modified, head.as_str()));
    assert_eq!(by_path["pkg/core.py"], (&ChangeKind::Modified, WORKTREE_REVISION));
}

#[test]
fn staged_rename_maps_to_new_path() {
    let repo = seeded();
    repo.git(&["mv", "pkg/misc.py", "pkg/extra.py"]).expect("git mv");
    repo.write("tests/test_misc.py", "from pkg.extra import *\n").expect("write");

    let changed = GitChangeDetector::new(Git::new(repo.path()))
        .detect_changes(WORKTREE_REF)
        .expect("detect");
    let renamed: Vec<&str> = changed
        .iter()
        .filter(|f| f.kind == ChangeKind::Renamed)
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(renamed, vec!["pkg/extra.py"]);

    assert_eq!(selected(&repo, Mode::ChangedOnly, WORKTREE_REF), vec!["tests/test_misc.py"]);
}

#[test]
fn untracked_test_file_is_selected() {
    let repo = seeded();
    repo.write("tests/test_new.py", "import pkg.misc\n").expect("write");

    assert_eq!(
        selected(&repo, Mode::ChangedOnlyFallback, WORKTREE_REF),
        vec!["tests/test_new.py"]
    );
}

#[test]
fn ignored_files_select_nothing() {
    let repo = seeded();
    repo.write("README.md", "# changed\n").expect("write");
    repo.write("docs/guide.rst", "guide\n").expect("write");

    let result = select(&repo, Mode::ChangedOnly, "main");
    assert!(result.entries.is_empty());
    assert!(result.warnings.is_empty());
}

#[test]
fn unmapped_change_widens_to_every_test() {
    let repo = seeded();
    repo.write("pyproject.toml", "[project]\nname = \"sample\"\n").expect("write");

    let result = select(&repo, Mode::ChangedOnly, "main");
    assert_eq!(result.test_paths().len(), 3);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].unmapped, vec!["pyproject.toml"]);
}

#[test]
fn missing_reference_fails_changed_only_and_falls_back_otherwise() {
    let repo = seeded();
    let workspace = Workspace::load(repo.path(), SelectorConfig::default()).expect("load");
    let selector = workspace.git_selector(repo.path());

    let err = selector.select(Mode::ChangedOnly, "no-such-branch").unwrap_err();
    assert_eq!(
        err,
        ChangeError::ReferenceNotFound {
            reference: "no-such-branch".to_string()
        }
    );

    let fallback = selector
        .select(Mode::ChangedOnlyFallback, "no-such-branch")
        .expect("fallback");
    let full = selector.select(Mode::Full, "no-such-branch").expect("full");
    assert_eq!(fallback.effective_mode, Mode::Full);
    assert_eq!(fallback.entries, full.entries);
    assert!(fallback.fallback_reason.is_some());
}

#[test]
fn matrix_is_applied_to_each_selected_module() {
    let repo = seeded();
    repo.write("pkg/misc.py", "import os\nimport re\n").expect("write");
    let mut config = SelectorConfig::default();
    config.matrix.axes = vec![
        MatrixAxis::new("python", ["3.11", "3.12"]),
        MatrixAxis::new("os", ["linux", "mac"]),
    ];
    config.matrix.excludes = vec![BTreeMap::from([
        ("python".to_string(), "3.11".to_string()),
        ("os".to_string(), "mac".to_string()),
    ])];

    let result = select_from_root(repo.path(), config, Mode::ChangedOnly, "main").expect("select");
    let labels: Vec<String> = result.entries.iter().map(|e| e.label()).collect();
    assert_eq!(
        labels,
        vec![
            "tests/test_misc.py[3.11-linux]",
            "tests/test_misc.py[3.12-linux]",
            "tests/test_misc.py[3.12-mac]",
        ]
    );
}

#[test]
fn selection_is_deterministic_across_workspaces() {
    let repo = seeded();
    repo.write("pkg/core.py", "VALUE = 5\n").expect("write");
    repo.write("tests/test_new.py", "import pkg.api\n").expect("write");

    let first = select(&repo, Mode::ChangedOnly, "main");
    let second = select(&repo, Mode::ChangedOnly, "main");
    assert_eq!(first, second);
    assert_eq!(
        first.test_paths(),
        vec!["tests/test_api.py", "tests/test_core.py", "tests/test_new.py"]
    );
}

#[test]
fn semicolon_and_guarded_imports_are_followed() {
    let repo = seeded();
    repo.write("tests/test_semi.py", "import os; import pkg.core\n").expect("write");
    repo.write(
        "tests/test_guarded.py",
        "from typing import TYPE_CHECKING\nif TYPE_CHECKING: import pkg.core\n",
    )
    .expect("write");
    repo.write("tests/test_optional.py", "try: import pkg.core\nexcept ImportError: pass\n")
        .expect("write");
    repo.commit_all("more tests").expect("commit");
    repo.write("pkg/core.py", "VALUE = 9\n").expect("write");

    assert_eq!(
        selected(&repo, Mode::ChangedOnly, WORKTREE_REF),
        vec![
            "tests/test_api.py",
            "tests/test_core.py",
            "tests/test_guarded.py",
            "tests/test_optional.py",
            "tests/test_semi.py",
        ]
    );
}

#[test]
fn dependency_manifest_change_widens_to_every_test() {
    let repo = seeded();
    repo.write("requirements.txt", "numpy==1.26.0\n").expect("write");
    repo.commit_all("pin numpy").expect("commit");
    repo.write("requirements.txt", "numpy==2.0.0\n").expect("write");

    let result = select(&repo, Mode::ChangedOnly, WORKTREE_REF);
    assert_eq!(result.test_paths().len(), 3);
    assert_eq!(result.warnings[0].unmapped, vec!["requirements.txt"]);
}

#[test]
fn oversized_git_output_fails_detection_and_falls_back() {
    let repo = seeded();
    repo.write("pkg/core.py", "VALUE = 11\n").expect("write");

    let git = Git::new(repo.path()).with_limits(DEFAULT_GIT_TIMEOUT, 1);
    let err = GitChangeDetector::new(git)
        .detect_changes(WORKTREE_REF)
        .unwrap_err();
    assert!(matches!(&err, ChangeError::Vcs(msg) if msg.contains("exceeded")), "{err}");

    let config = SelectorConfig {
        vcs_output_limit_bytes: 1,
        ..SelectorConfig::default()
    };
    let limited = select_from_root(repo.path(), config.clone(), Mode::ChangedOnlyFallback, "main")
        .expect("fallback");
    assert_eq!(limited.effective_mode, Mode::Full);
    assert_eq!(limited.test_paths().len(), 3);
    assert!(limited.fallback_reason.is_some());

    assert!(select_from_root(repo.path(), config, Mode::ChangedOnly, "main").is_err());
}
