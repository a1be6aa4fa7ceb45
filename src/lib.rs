//! `instance_lock` — Keep at most one instance of a job running per host.
//!
//! Provides:
//! - `identity` — Derive the lock and pid file paths for a program and flavor
//! - `lock` — OS advisory file lock with POSIX and Windows variants
//! - `guard` — `SingleInstance`, the scoped holder of lock and pid-file
//! - `pid` — Pid-file bookkeeping and lock-free holder lookup
//! - `report` — Injected reporting of guard lifecycle events
//! - `status` — Read-only inspection of an identity's on-disk state
//!
//! The OS-level lock, not the presence of files, is what excludes other
//! instances. A process that dies without releasing leaves its lock and pid
//! files behind; the kernel has already dropped the lock, so the next start
//! succeeds.

use std::path::PathBuf;

pub mod error;
pub mod exit_codes;
pub mod guard;
pub mod identity;
pub mod lock;
pub mod pid;
pub mod report;
pub mod status;

pub use error::{Error, Result};
pub use guard::{Options, SingleInstance};
pub use identity::{resolve, resolve_in, LockIdentity};
pub use lock::{AdvisoryLock, Mode, PlatformLock};
pub use pid::lookup;
pub use report::{LogReporter, NullReporter, Reporter};
pub use status::InstanceStatus;

/// Environment variable to override the lock directory location.
pub const LOCK_DIR_ENV: &str = "INSTANCE_LOCK_DIR";

/// Get the directory lock and pid files live in.
/// Respects `INSTANCE_LOCK_DIR` env var, otherwise the system temp dir.
pub fn lock_dir() -> PathBuf {
    match std::env::var_os(LOCK_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir(),
    }
}
