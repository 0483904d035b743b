//! Deterministic classification of repository paths.

use glob::{MatchOptions, Pattern, PatternError};

/// Path globs do not let `*` cross a `/`; `**` spans directories.
const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Dotted module id for a Python file under `source_root`.
///
/// `pkg/sub/mod.py` becomes `pkg.sub.mod`; `pkg/__init__.py` becomes `pkg`.
/// Returns `None` for non-Python files and files outside the root.
pub fn module_id(path: &str, source_root: &str) -> Option<String> {
    let relative = strip_root(path, source_root)?;
    let stem = relative.strip_suffix(".py")?;
    let mut parts: Vec<&str> = stem.split('/').collect();
    if parts.last() == Some(&"__init__") {
        parts.pop();
    }
    if parts.is_empty() || parts.iter().any(|part| !is_identifier(part)) {
        return None;
    }
    Some(parts.join("."))
}

/// True if `path` names a package initializer.
pub fn is_package_init(path: &str) -> bool {
    file_name(path) == "__init__.py"
}

/// Compiled fnmatch-style file-name globs (`*`, `?`, `[seq]`, `[!seq]`).
#[derive(Debug, Clone, Default)]
pub struct NameGlobs {
    patterns: Vec<Pattern>,
}

impl NameGlobs {
    pub fn new(globs: &[String]) -> Result<Self, PatternError> {
        let patterns = globs
            .iter()
            .map(|glob| Pattern::new(glob))
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    /// True if any glob matches `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(name))
    }
}

#[derive(Debug, Clone)]
enum IgnoreRule {
    Dir(String),
    Name(Pattern),
    Path(Pattern),
}

/// Compiled ignore patterns for changed paths.
///
/// Patterns ending in `/` match a directory prefix; patterns without `/` match
/// the file name anywhere; other patterns match the whole path.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    pub fn new(patterns: &[String]) -> Result<Self, PatternError> {
        let rules = patterns
            .iter()
            .map(|pattern| {
                if let Some(dir) = pattern.strip_suffix('/') {
                    Ok(IgnoreRule::Dir(format!("{}/", dir.trim_start_matches('/'))))
                } else if !pattern.contains('/') {
                    Pattern::new(pattern).map(IgnoreRule::Name)
                } else {
                    Pattern::new(pattern.trim_start_matches('/')).map(IgnoreRule::Path)
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.rules.iter().any(|rule| match rule {
            IgnoreRule::Dir(prefix) => path.starts_with(prefix.as_str()),
            IgnoreRule::Name(pattern) => pattern.matches(file_name(path)),
            IgnoreRule::Path(pattern) => pattern.matches_with(path, PATH_MATCH),
        })
    }
}

pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent directory of a repository path, `""` for top-level files.
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn strip_root<'a>(path: &'a str, source_root: &str) -> Option<&'a str> {
    let root = source_root.trim_matches('/');
    if root.is_empty() || root == "." {
        return Some(path);
    }
    path.strip_prefix(root)?.strip_prefix('/')
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}
