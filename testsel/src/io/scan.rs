//! Project scanner: builds the module graph and test inventory from disk.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use super::config::ProjectConfig;
use crate::core::graph::ModuleGraph;
use crate::core::imports::{parse_imports, resolve_imports};
use crate::core::paths::{file_name, is_package_init, module_id, parent_dir};
use crate::core::types::TestModule;

const CONFTEST: &str = "conftest.py";
const SKIPPED_DIRS: &[&str] = &["__pycache__", "node_modules", "venv", "build", "dist"];

/// Static project metadata consumed by the selector.
#[derive(Debug, Clone, Default)]
pub struct Project {
    pub graph: ModuleGraph,
    /// Test modules sorted by path.
    pub tests: Vec<TestModule>,
}

#[derive(Debug)]
struct PyFile {
    path: String,
    module: String,
}

/// Scan the configured source roots under `root`.
///
/// Every `.py` file becomes a graph node; files without an importable dotted
/// name are keyed by their path. A `conftest.py` counts as a dependency of
/// every test module in its directory subtree.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn scan_project(root: &Path, cfg: &ProjectConfig) -> Result<Project> {
    let test_globs = cfg.test_globs()?;
    let files = discover_files(root, &cfg.source_roots)?;
    let known: BTreeSet<&str> = files.iter().map(|f| f.module.as_str()).collect();
    let conftests: BTreeMap<&str, &str> = files
        .iter()
        .filter(|f| file_name(&f.path) == CONFTEST)
        .map(|f| (parent_dir(&f.path), f.module.as_str()))
        .collect();

    let mut graph = ModuleGraph::new();
    for file in &files {
        graph.add_module(&file.module, Some(&file.path));
    }

    let mut tests = Vec::new();
    for file in &files {
        let source = fs::read_to_string(root.join(&file.path))
            .with_context(|| format!("read {}", file.path))?;
        let stmts = parse_imports(&source);
        let mut deps = resolve_imports(&stmts, &file.module, is_package_init(&file.path), |id| {
            known.contains(id)
        });

        let is_test = test_globs.matches(file_name(&file.path));
        if is_test {
            deps.extend(
                enclosing_conftests(&file.path, &conftests)
                    .into_iter()
                    .map(str::to_string),
            );
        }

        for dep in &deps {
            graph.add_dependency(&file.module, dep);
        }
        if is_test {
            tests.push(TestModule {
                path: file.path.clone(),
                module: file.module.clone(),
                imports: deps.into_iter().collect(),
            });
        }
    }
    tests.sort_by(|a, b| a.path.cmp(&b.path));

    info!(
        modules = graph.module_count(),
        edges = graph.edge_count(),
        tests = tests.len(),
        "project scanned"
    );
    Ok(Project { graph, tests })
}

/// Conftest modules in the directory of `path` and all its ancestors.
fn enclosing_conftests<'a>(path: &str, conftests: &BTreeMap<&str, &'a str>) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut dir = parent_dir(path);
    loop {
        if let Some(module) = conftests.get(dir) {
            found.push(*module);
        }
        if dir.is_empty() {
            return found;
        }
        dir = parent_dir(dir);
    }
}

/// Collect Python files under each source root, most specific root first.
///
/// A file reachable from several roots is keyed by the most specific one.
fn discover_files(root: &Path, source_roots: &[String]) -> Result<Vec<PyFile>> {
    let mut roots: Vec<&str> = source_roots.iter().map(|r| r.trim_matches('/')).collect();
    roots.sort_by_key(|r| std::cmp::Reverse(root_depth(r)));

    let mut seen = BTreeSet::new();
    let mut files = Vec::new();
    for source_root in roots {
        let mut paths = Vec::new();
        let start = if root_depth(source_root) == 0 {
            ""
        } else {
            source_root
        };
        walk(root, start, &mut paths)?;
        for path in paths {
            if !seen.insert(path.clone()) {
                continue;
            }
            let module = module_id(&path, source_root).unwrap_or_else(|| path.clone());
            files.push(PyFile { path, module });
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(count = files.len(), "python files discovered");
    Ok(files)
}

fn root_depth(source_root: &str) -> usize {
    if source_root.is_empty() || source_root == "." {
        0
    } else {
        source_root.split('/').count()
    }
}

/// Recursively list `.py` files below `root/rel`, as repository-relative paths.
fn walk(root: &Path, rel: &str, out: &mut Vec<String>) -> Result<()> {
    let dir = root.join(rel);
    if !dir.is_dir() {
        return Ok(());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        entries.push(entry);
    }
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let child = if rel.is_empty() {
            name.clone()
        } else {
            format!("{rel}/{name}")
        };
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", entry.path().display()))?;
        if file_type.is_dir() {
            if name.starts_with('.')
                || name.ends_with(".egg-info")
                || SKIPPED_DIRS.contains(&name.as_str())
            {
                continue;
            }
            walk(root, &child, out)?;
        } else if file_type.is_file() && name.ends_with(".py") {
            out.push(child);
        }
    }
    Ok(())
}
