//! Static extraction of Python import statements.
//!
//! Parsing is statement-based and over-approximates: imports inside
//! functions, conditional blocks, one-line compound statements (`try: import
//! x`) and `;`-separated statements are all reported. Extra edges can only
//! widen a selection; a missed import would narrow it.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(.+)$").unwrap());
static FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*from\s+(\.*)\s*([A-Za-z_][\w\.]*)?\s+import\s+(.+)$").unwrap()
});

/// Keywords that open a compound statement whose body may follow on the same line.
const COMPOUND_KEYWORDS: &[&str] = &[
    "async", "class", "def", "elif", "else", "except", "finally", "for", "if", "try", "while",
    "with",
];

/// One import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStmt {
    /// `import a.b.c [as x]`
    Import { module: String },
    /// `from ..a.b import x, y`; `level` counts leading dots.
    From {
        level: usize,
        module: String,
        names: Vec<String>,
    },
}

/// Extract import statements from Python source.
pub fn parse_imports(source: &str) -> Vec<ImportStmt> {
    let mut stmts = Vec::new();
    for line in logical_lines(source) {
        for stmt in split_statements(&line) {
            let stmt = strip_compound_header(stmt);
            if let Some(caps) = FROM_RE.captures(stmt) {
                let level = caps.get(1).map_or(0, |m| m.as_str().len());
                let module = caps.get(2).map_or("", |m| m.as_str()).to_string();
                let names = split_names(&caps[3]);
                stmts.push(ImportStmt::From {
                    level,
                    module,
                    names,
                });
            } else if let Some(caps) = IMPORT_RE.captures(stmt) {
                for module in split_names(&caps[1]) {
                    stmts.push(ImportStmt::Import { module });
                }
            }
        }
    }
    stmts
}

/// Resolve statements of `current` into project module ids accepted by `known`.
///
/// Importing `a.b.c` also executes `a` and `a.b`, so every known prefix is a
/// dependency. `from p import n` depends on `p` and, when it is a module, `p.n`.
pub fn resolve_imports<F>(
    stmts: &[ImportStmt],
    current: &str,
    is_package: bool,
    known: F,
) -> BTreeSet<String>
where
    F: Fn(&str) -> bool,
{
    let mut deps = BTreeSet::new();
    for stmt in stmts {
        match stmt {
            ImportStmt::Import { module } => add_prefixes(module, &known, &mut deps),
            ImportStmt::From {
                level,
                module,
                names,
            } => {
                let Some(base) = absolute_base(*level, module, current, is_package) else {
                    continue;
                };
                if !base.is_empty() {
                    add_prefixes(&base, &known, &mut deps);
                }
                for name in names {
                    let candidate = if base.is_empty() {
                        name.clone()
                    } else {
                        format!("{base}.{name}")
                    };
                    if known(candidate.as_str()) {
                        deps.insert(candidate);
                    }
                }
            }
        }
    }
    deps.remove(current);
    deps
}

fn absolute_base(level: usize, module: &str, current: &str, is_package: bool) -> Option<String> {
    if level == 0 {
        return Some(module.to_string());
    }
    let mut package: Vec<&str> = current.split('.').collect();
    if !is_package {
        package.pop();
    }
    for _ in 1..level {
        package.pop()?;
    }
    if !module.is_empty() {
        package.push(module);
    }
    Some(package.join("."))
}

fn add_prefixes<F: Fn(&str) -> bool>(module: &str, known: &F, deps: &mut BTreeSet<String>) {
    let mut prefix = String::new();
    for part in module.split('.') {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(part);
        if known(prefix.as_str()) {
            deps.insert(prefix.clone());
        }
    }
}

/// Split `a as x, b.c` or `(x, y)` into bare dotted names, dropping `*`.
fn split_names(raw: &str) -> Vec<String> {
    raw.replace(['(', ')'], " ")
        .split(',')
        .filter_map(|item| item.split_whitespace().next())
        .filter(|name| *name != "*")
        .map(str::to_string)
        .collect()
}

/// Join backslash continuations and parenthesized import lists; strip comments.
fn logical_lines(source: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending = String::new();
    let mut open_parens = false;
    for raw in source.lines() {
        let line = strip_comment(raw);
        let (body, continued) = match line.trim_end().strip_suffix('\\') {
            Some(body) => (body, true),
            None => (line, false),
        };
        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(body.trim_end());
        if pending.contains('(') && !pending.contains(')') && opens_from_import(&pending) {
            open_parens = true;
        }
        if open_parens && body.contains(')') {
            open_parens = false;
        }
        if continued || open_parens {
            continue;
        }
        lines.push(std::mem::take(&mut pending));
    }
    if !pending.is_empty() {
        lines.push(pending);
    }
    lines
}

fn opens_from_import(line: &str) -> bool {
    split_statements(line)
        .last()
        .is_some_and(|stmt| strip_compound_header(stmt).starts_with("from "))
}

/// Split a logical line on `;` outside string literals.
fn split_statements(line: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for pos in unquoted_positions(line, ';') {
        parts.push(&line[start..pos]);
        start = pos + 1;
    }
    parts.push(&line[start..]);
    parts
}

fn strip_comment(line: &str) -> &str {
    match unquoted_positions(line, '#').first() {
        Some(&pos) => &line[..pos],
        None => line,
    }
}

/// Byte offsets of `target` outside single- or double-quoted literals.
fn unquoted_positions(line: &str, target: char) -> Vec<usize> {
    let mut found = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (pos, c) in line.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
        } else if c == target {
            found.push(pos);
        }
    }
    found
}

/// Drop a one-line compound header such as `if TYPE_CHECKING:` or `try:`.
///
/// Headers may contain colons of their own (annotations, slices), so every
/// colon is tried and the first body that is an import wins. Statements that
/// are not compound are returned trimmed.
fn strip_compound_header(stmt: &str) -> &str {
    let stmt = stmt.trim_start();
    let keyword = stmt
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or_default();
    if !COMPOUND_KEYWORDS.contains(&keyword) {
        return stmt;
    }
    stmt.match_indices(':')
        .map(move |(pos, _)| stmt[pos + 1..].trim_start())
        .find(|body| IMPORT_RE.is_match(body) || FROM_RE.is_match(body))
        .unwrap_or_default()
}
