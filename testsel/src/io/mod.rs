//! I/O adapters: version control, configuration, and project scanning.

pub mod changes;
pub mod config;
pub mod git;
pub mod scan;
