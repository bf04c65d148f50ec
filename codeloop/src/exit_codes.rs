//! Stable exit codes for `codeloop` CLI commands.

/// Command succeeded (a run that reached Terminate counts, whatever its assessment).
pub const OK: i32 = 0;
/// Invalid config, unreadable input, or workflow initialization failure.
pub const INVALID: i32 = 1;
/// `codeloop run` was aborted by `--timeout-secs` before reaching Terminate.
pub const ABORTED: i32 = 3;
