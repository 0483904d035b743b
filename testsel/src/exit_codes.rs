//! Stable exit codes for testsel CLI commands.

/// Command succeeded and (for `select`) at least one entry was selected.
pub const OK: i32 = 0;
/// Invalid configuration, unresolvable reference under `changed-only`, or other errors.
pub const INVALID: i32 = 1;
/// `testsel select` produced an empty selection.
pub const EMPTY: i32 = 2;
