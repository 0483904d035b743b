//! Changed-module-aware test selection with parameter-matrix expansion.
//!
//! Given a Python project checked out in git, the selector answers "which test
//! modules, under which matrix cases, must run for this change?". The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (module graph, reverse
//!   reachability, matrix expansion, ordering, sharding). No I/O.
//! - **[`io`]**: Side-effecting operations (git subprocesses, config files,
//!   filesystem scanning). Isolated behind small types and traits.
//!
//! [`select`] composes both into the single entry point used by a test
//! harness, falling back to a full selection when change detection fails.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod render;
pub mod select;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
