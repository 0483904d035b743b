//! Test-only helpers: scripted change detectors, sample graphs, and throwaway
//! git repositories.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::core::graph::ModuleGraph;
use crate::core::types::{SourceFile, TestModule};
use crate::error::ChangeError;
use crate::io::changes::ChangeDetector;
use crate::io::scan::Project;

/// Change detector returning a fixed outcome and counting calls.
#[derive(Debug)]
pub struct ScriptedDetector {
    outcome: Result<BTreeSet<SourceFile>, ChangeError>,
    calls: Cell<usize>,
}

impl ScriptedDetector {
    pub fn returning(changed: BTreeSet<SourceFile>) -> Self {
        Self {
            outcome: Ok(changed),
            calls: Cell::new(0),
        }
    }

    pub fn failing(err: ChangeError) -> Self {
        Self {
            outcome: Err(err),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ChangeDetector for ScriptedDetector {
    fn detect_changes(&self, _base_ref: &str) -> Result<BTreeSet<SourceFile>, ChangeError> {
        self.calls.set(self.calls.get() + 1);
        self.outcome.clone()
    }
}

/// Deterministic in-memory project:
///
/// ```text
/// pkg.api -> pkg.utils -> pkg.core      tests/test_api.py   -> pkg.api
/// pkg.a <-> pkg.b (cycle)               tests/test_core.py  -> pkg.core
/// pkg.lonely                            tests/test_cycle.py -> pkg.a
///                                       tests/test_lonely.py -> pkg.lonely
/// ```
pub fn sample_project() -> Project {
    let mut graph = ModuleGraph::new();
    for (id, path) in [
        ("pkg.core", "pkg/core.py"),
        ("pkg.utils", "pkg/utils.py"),
        ("pkg.api", "pkg/api.py"),
        ("pkg.a", "pkg/a.py"),
        ("pkg.b", "pkg/b.py"),
        ("pkg.lonely", "pkg/lonely.py"),
    ] {
        graph.add_module(id, Some(path));
    }
    graph.add_dependency("pkg.utils", "pkg.core");
    graph.add_dependency("pkg.api", "pkg.utils");
    graph.add_dependency("pkg.a", "pkg.b");
    graph.add_dependency("pkg.b", "pkg.a");

    let tests: Vec<TestModule> = [
        ("tests/test_api.py", "pkg.api"),
        ("tests/test_core.py", "pkg.core"),
        ("tests/test_cycle.py", "pkg.a"),
        ("tests/test_lonely.py", "pkg.lonely"),
    ]
    .into_iter()
    .map(|(path, import)| TestModule {
        path: path.to_string(),
        module: path.trim_end_matches(".py").replace('/', "."),
        imports: vec![import.to_string()],
    })
    .collect();
    for test in &tests {
        graph.add_module(&test.module, Some(&test.path));
        for import in &test.imports {
            graph.add_dependency(&test.module, import);
        }
    }
    Project { graph, tests }
}

/// Temporary git repository on branch `main` with a configured identity.
pub struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        repo.git(&["config", "user.name", "Selector Test"])?;
        repo.git(&["config", "user.email", "selector-test@local.invalid"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Run git in the repository and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Lay out a small Python package with tests and commit it.
    ///
    /// `pkg.api` imports `pkg.core`; `tests/test_api.py` imports `pkg.api`,
    /// `tests/test_core.py` imports `pkg.core`, `tests/test_misc.py` imports
    /// `pkg.misc`, and `tests/conftest.py` is shared by all three.
    pub fn seed_python_project(&self) -> Result<()> {
        self.write("pkg/__init__.py", "")?;
        self.write("pkg/core.py", "VALUE = 1\n")?;
        self.write("pkg/api.py", "from pkg.core import VALUE\n")?;
        self.write("pkg/misc.py", "import os\n")?;
        self.write("tests/conftest.py", "import pytest\n")?;
        self.write("tests/test_api.py", "from pkg import api\n")?;
        self.write("tests/test_core.py", "import pkg.core\n")?;
        self.write("tests/test_misc.py", "from pkg.misc import *\n")?;
        self.write("README.md", "# sample\n")?;
        self.commit_all("seed project")
    }
}
