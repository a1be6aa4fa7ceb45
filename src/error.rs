//! Error types for lock acquisition and release.
//!
//! Contention (`DuplicateInstance`) is kept apart from genuine I/O faults at
//! every layer so callers can tell "busy" from "broken". A malformed pid-file
//! is not an error at all: it reads as "no recorded holder".

use crate::exit_codes;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Another live process holds the lock.
    #[error("another instance is already running (lock: {}{})", lock_path.display(), holder_suffix(*holder))]
    DuplicateInstance {
        lock_path: PathBuf,
        /// Last pid recorded by the holder, if readable. Informational only.
        holder: Option<u32>,
    },

    /// Filesystem failure unrelated to contention.
    #[error("failed to {op} {}: {source}", path.display())]
    LockIo {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A blocking acquire was interrupted by a signal.
    #[error("interrupted while waiting for lock {}", path.display())]
    Interrupted { path: PathBuf },

    /// A blocking acquire of a lock this process already holds.
    #[error("lock {} is already held by this process", path.display())]
    WouldDeadlock { path: PathBuf },

    /// Failure removing a lock or pid file during shutdown.
    #[error("failed to remove {}: {source}", path.display())]
    ReleaseIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn holder_suffix(holder: Option<u32>) -> String {
    match holder {
        Some(pid) => format!(", pid {pid}"),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::LockIo {
            op,
            path: path.into(),
            source,
        }
    }

    /// True when the error means "another instance holds the lock".
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::DuplicateInstance { .. })
    }

    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::DuplicateInstance { .. } => exit_codes::DUPLICATE_INSTANCE,
            Error::LockIo { .. }
            | Error::Interrupted { .. }
            | Error::WouldDeadlock { .. }
            | Error::ReleaseIo { .. } => exit_codes::STARTUP_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
