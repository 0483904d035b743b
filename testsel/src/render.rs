//! Harness-facing output formats for selections and matrices.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::core::matrix::MatrixCase;
use crate::core::types::SelectionResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One entry per line: `path` or `path<TAB>case-id`.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Render a selection for the harness.
pub fn render_selection(result: &SelectionResult, format: Format) -> Result<String> {
    match format {
        Format::Text => {
            let mut out = String::new();
            for entry in &result.entries {
                out.push_str(&entry.test);
                if let Some(case) = &entry.case {
                    out.push('\t');
                    out.push_str(&case.id());
                }
                out.push('\n');
            }
            Ok(out)
        }
        Format::Json => to_json(result),
    }
}

/// Render expanded matrix cases.
pub fn render_cases(cases: &[MatrixCase], format: Format) -> Result<String> {
    match format {
        Format::Text => {
            let mut out = String::new();
            for case in cases {
                let assignment: Vec<String> = case
                    .values
                    .iter()
                    .map(|v| format!("{}={}", v.axis, v.value))
                    .collect();
                out.push_str(&format!("{}\t{}\n", case.id(), assignment.join(",")));
            }
            Ok(out)
        }
        Format::Json => to_json(&cases),
    }
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    Ok(payload)
}
