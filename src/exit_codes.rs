//! Exit code constants for the `instance-lock` binary.
//!
//! - 0: Success
//! - 1: Startup failure (bad args, lock I/O error, interrupted wait)
//! - 2: `pid` query found no recorded holder
//! - 3: Another instance already holds the lock
//!
//! Only "zero vs non-zero" is portable; callers must not rely on the exact
//! duplicate-instance value.

/// Successful execution.
pub const SUCCESS: u8 = 0;

/// Startup failure unrelated to contention.
pub const STARTUP_FAILURE: u8 = 1;

/// The pid query found no recorded holder.
pub const NOT_RECORDED: u8 = 2;

/// Another live process holds the lock for this identity.
pub const DUPLICATE_INSTANCE: u8 = 3;
