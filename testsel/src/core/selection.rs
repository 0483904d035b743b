//! Pure composition of impacted tests and matrix cases into ordered entries.

use sha2::{Digest, Sha256};

use super::matrix::MatrixDesign;
use super::types::{SelectionEntry, TestModule};

/// Pair every test with every case, ordered by test path then case ordinal.
///
/// With an empty design each test yields a single entry without a case.
/// Duplicate test paths collapse to one module.
pub fn cross_with_matrix(tests: &[TestModule], matrix: &MatrixDesign) -> Vec<SelectionEntry> {
    let mut paths: Vec<&str> = tests.iter().map(|t| t.path.as_str()).collect();
    paths.sort_unstable();
    paths.dedup();

    let mut entries = Vec::with_capacity(paths.len() * matrix.cases().len().max(1));
    for path in paths {
        if matrix.is_empty() {
            entries.push(SelectionEntry {
                test: path.to_string(),
                case: None,
            });
            continue;
        }
        let mut cases: Vec<_> = matrix.cases().iter().collect();
        cases.sort_by_key(|case| case.ordinal);
        for case in cases {
            entries.push(SelectionEntry {
                test: path.to_string(),
                case: Some(case.clone()),
            });
        }
    }
    entries
}

/// Hex SHA-256 over entry labels, one per line.
pub fn fingerprint(entries: &[SelectionEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.label().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
