//! Typed failure channel exposed to the test harness.
//!
//! Plumbing code uses `anyhow`; these types exist where callers need to tell
//! failures apart (fallback decisions, configuration errors).

use thiserror::Error;

/// Failure while asking version control which files changed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChangeError {
    #[error("reference not found: {reference}")]
    ReferenceNotFound { reference: String },

    #[error("git {command} timed out after {timeout_secs} seconds")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("version control failure: {0}")]
    Vcs(String),
}

/// Invalid matrix declaration, detected at configuration-load time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("matrix axis '{axis}' has no values")]
    EmptyAxis { axis: String },

    #[error("{rule} references unknown matrix axis '{axis}'")]
    UnknownAxis { axis: String, rule: String },

    #[error("matrix axis '{axis}' is declared more than once")]
    DuplicateAxis { axis: String },

    #[error("matrix axis '{axis}' lists value '{value}' more than once")]
    DuplicateValue { axis: String, value: String },

    #[error("{rule} does not assign matrix axis '{axis}'")]
    IncompleteInclude { axis: String, rule: String },

    #[error("every matrix case is excluded")]
    AllCasesExcluded,
}
