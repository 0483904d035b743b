//! Static module graph and reverse-dependency impact mapping.
//!
//! Modules live in an arena addressed by index. Edges point from a module to
//! the modules it imports and may form cycles.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, warn};

use super::types::{SourceFile, StaleGraphWarning, TestModule};

#[derive(Debug, Clone, PartialEq, Eq)]
struct ModuleNode {
    id: String,
    path: Option<String>,
}

/// Directed "imports" graph over dotted module ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    by_id: BTreeMap<String, usize>,
    by_path: BTreeMap<String, usize>,
    edges: Vec<BTreeSet<usize>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module, optionally backed by a repository path.
    ///
    /// Registering an existing id keeps its edges and records the path if one
    /// was not known yet.
    pub fn add_module(&mut self, id: &str, path: Option<&str>) -> usize {
        let idx = self.intern(id);
        if let Some(path) = path
            && self.nodes[idx].path.is_none()
        {
            self.nodes[idx].path = Some(path.to_string());
            self.by_path.insert(path.to_string(), idx);
        }
        idx
    }

    /// Record that `from` imports `to`. Unknown ids are registered without a path.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let from = self.intern(from);
        let to = self.intern(to);
        if from != to {
            self.edges[from].insert(to);
        }
    }

    pub fn module_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(BTreeSet::len).sum()
    }

    /// Module id backed by `path`, if the path is part of the graph.
    pub fn module_for_path(&self, path: &str) -> Option<&str> {
        self.by_path
            .get(path)
            .map(|&idx| self.nodes[idx].id.as_str())
    }

    pub fn path_of(&self, id: &str) -> Option<&str> {
        self.by_id
            .get(id)
            .and_then(|&idx| self.nodes[idx].path.as_deref())
    }

    /// Direct dependencies of `id`, sorted.
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        let Some(&idx) = self.by_id.get(id) else {
            return Vec::new();
        };
        let mut deps: Vec<&str> = self.edges[idx]
            .iter()
            .map(|&to| self.nodes[to].id.as_str())
            .collect();
        deps.sort_unstable();
        deps
    }

    fn intern(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.by_id.get(id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(ModuleNode {
            id: id.to_string(),
            path: None,
        });
        self.edges.push(BTreeSet::new());
        self.by_id.insert(id.to_string(), idx);
        idx
    }
}

/// Test modules impacted by a change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Impact {
    /// Impacted tests sorted by path.
    pub tests: Vec<TestModule>,
    /// Present when unmapped changes widened the impact to every test.
    pub stale: Option<StaleGraphWarning>,
}

/// Reverse-reachability queries over a [`ModuleGraph`].
///
/// The incoming-edge index is built once in [`DependencyMapper::new`]; each
/// query is then linear in the size of the graph.
#[derive(Debug)]
pub struct DependencyMapper<'g> {
    graph: &'g ModuleGraph,
    incoming: Vec<Vec<usize>>,
}

impl<'g> DependencyMapper<'g> {
    pub fn new(graph: &'g ModuleGraph) -> Self {
        let mut incoming = vec![Vec::new(); graph.nodes.len()];
        for (from, targets) in graph.edges.iter().enumerate() {
            for &to in targets {
                incoming[to].push(from);
            }
        }
        Self { graph, incoming }
    }

    /// Every module that is, or transitively imports, one of `seeds`.
    ///
    /// Unknown seed ids are ignored. Traversal is breadth-first with a visited
    /// bitmap so cyclic imports terminate.
    pub fn dependents<'a, I>(&self, seeds: I) -> BTreeSet<&'g str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut visited = vec![false; self.graph.nodes.len()];
        let mut queue = VecDeque::new();
        for seed in seeds {
            if let Some(&idx) = self.graph.by_id.get(seed)
                && !visited[idx]
            {
                visited[idx] = true;
                queue.push_back(idx);
            }
        }
        while let Some(idx) = queue.pop_front() {
            for &importer in &self.incoming[idx] {
                if !visited[importer] {
                    visited[importer] = true;
                    queue.push_back(importer);
                }
            }
        }
        visited
            .iter()
            .enumerate()
            .filter(|&(_, &seen)| seen)
            .map(|(idx, _)| self.graph.nodes[idx].id.as_str())
            .collect()
    }

    /// Map changed files to impacted tests.
    ///
    /// A test is impacted when its own file changed, when it imports a changed
    /// module, or when it transitively depends on one. Changed paths that are
    /// neither tests nor graph modules widen the result to every test.
    pub fn impacted_tests(&self, changed: &BTreeSet<SourceFile>, tests: &[TestModule]) -> Impact {
        let test_paths: BTreeSet<&str> = tests.iter().map(|t| t.path.as_str()).collect();
        let mut seeds: Vec<&str> = Vec::new();
        let mut direct: BTreeSet<&str> = BTreeSet::new();
        let mut unmapped: Vec<String> = Vec::new();

        for file in changed {
            let path = file.path.as_str();
            if test_paths.contains(path) {
                direct.insert(path);
                if let Some(id) = self.graph.module_for_path(path) {
                    seeds.push(id);
                }
                continue;
            }
            match self.graph.module_for_path(path) {
                Some(id) => seeds.push(id),
                None => unmapped.push(file.path.clone()),
            }
        }

        if !unmapped.is_empty() {
            let warning = StaleGraphWarning { unmapped };
            warn!(%warning, "selecting every test module");
            return Impact {
                tests: sorted_tests(tests.iter()),
                stale: Some(warning),
            };
        }

        let reached = self.dependents(seeds);
        debug!(
            changed = changed.len(),
            reached = reached.len(),
            "reverse reachability complete"
        );
        let impacted = tests.iter().filter(|test| {
            direct.contains(test.path.as_str())
                || reached.contains(test.module.as_str())
                || test.imports.iter().any(|id| reached.contains(id.as_str()))
        });
        Impact {
            tests: sorted_tests(impacted),
            stale: None,
        }
    }
}

/// One-shot form of [`DependencyMapper::impacted_tests`].
pub fn impacted_tests(
    changed: &BTreeSet<SourceFile>,
    graph: &ModuleGraph,
    tests: &[TestModule],
) -> Impact {
    DependencyMapper::new(graph).impacted_tests(changed, tests)
}

fn sorted_tests<'a>(tests: impl Iterator<Item = &'a TestModule>) -> Vec<TestModule> {
    let mut out: Vec<TestModule> = tests.cloned().collect();
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out.dedup_by(|a, b| a.path == b.path);
    out
}
