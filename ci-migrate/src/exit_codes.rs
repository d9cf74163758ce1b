//! Stable exit codes for `ci-migrate` commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config, arguments, or an API error.
pub const INVALID: i32 = 1;
/// `ci-migrate update` refused to touch the repository (sanity checks failed).
pub const REFUSED: i32 = 2;
/// `ci-migrate detect` finished, but at least one repository errored.
pub const PARTIAL: i32 = 3;
