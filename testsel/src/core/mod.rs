//! Deterministic, pure logic shared by the selector.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod graph;
pub mod imports;
pub mod matrix;
pub mod paths;
pub mod selection;
pub mod shard;
pub mod types;
