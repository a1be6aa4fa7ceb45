//! Exclusive advisory lock over a single file.
//!
//! Two variants share the [`AdvisoryLock`] contract:
//! - [`PosixAdvisoryLock`] takes a `lockf(3)` record lock on an open
//!   descriptor. The kernel drops it when the descriptor closes, including
//!   on death by signal, so a crashed holder never blocks its successor.
//! - [`WindowsExclusiveCreateLock`] uses exclusive file creation. The open
//!   handle blocks deletion and recreation until the holder exits.
//!
//! [`PlatformLock`] names the variant for the target OS. The lock file on
//! disk is diagnostic residue; only the OS lock state excludes other
//! processes.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::Path;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::PosixAdvisoryLock;
#[cfg(windows)]
pub use windows::WindowsExclusiveCreateLock;

/// The lock variant for the target platform.
#[cfg(unix)]
pub type PlatformLock = PosixAdvisoryLock;
#[cfg(windows)]
pub type PlatformLock = WindowsExclusiveCreateLock;

/// Whether acquire may wait for the current holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Wait until the lock is free or a signal interrupts the wait.
    Blocking,
    /// Return immediately when another process holds the lock.
    #[default]
    NonBlocking,
}

/// An exclusive, cross-process lock on one file.
pub trait AdvisoryLock: Sized {
    /// Take the lock on `path`, creating the file if needed.
    ///
    /// Returns `Ok(None)` when another live process holds the lock and
    /// `mode` is [`Mode::NonBlocking`]. I/O failures are errors, never `None`.
    fn acquire(path: &Path, mode: Mode) -> Result<Option<Self>>;

    /// Unlock and remove the lock file. A no-op when not holding.
    fn release(&mut self) -> Result<()>;

    /// True until [`AdvisoryLock::release`] succeeds or runs.
    fn is_held(&self) -> bool;

    /// The locked file's path.
    fn path(&self) -> &Path;
}

/// Acquire the platform lock on `path`.
pub fn acquire(path: &Path, mode: Mode) -> Result<Option<PlatformLock>> {
    PlatformLock::acquire(path, mode)
}

/// Remove `path`, treating an already missing file as success.
pub(crate) fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(Error::ReleaseIo {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("job-.lock");

        let mut lock = acquire(&lock_path, Mode::NonBlocking).unwrap().unwrap();
        assert!(lock.is_held());
        assert!(lock_path.exists());
        assert_eq!(lock.path(), lock_path);

        lock.release().unwrap();
        assert!(!lock.is_held());
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_double_release_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("twice.lock");

        let mut lock = acquire(&lock_path, Mode::NonBlocking).unwrap().unwrap();
        lock.release().unwrap();
        lock.release().unwrap();
        assert!(!lock.is_held());
    }

    #[test]
    fn test_second_acquire_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("busy.lock");

        let _lock = acquire(&lock_path, Mode::NonBlocking).unwrap().unwrap();
        let second = acquire(&lock_path, Mode::NonBlocking).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_reacquire_after_release() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("again.lock");

        let mut first = acquire(&lock_path, Mode::NonBlocking).unwrap().unwrap();
        first.release().unwrap();

        let second = acquire(&lock_path, Mode::NonBlocking).unwrap();
        assert!(second.is_some());
    }

    #[test]
    fn test_drop_releases() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("scoped.lock");

        {
            let _lock = acquire(&lock_path, Mode::NonBlocking).unwrap().unwrap();
            assert!(lock_path.exists());
        }

        assert!(!lock_path.exists());
        assert!(acquire(&lock_path, Mode::NonBlocking).unwrap().is_some());
    }

    #[test]
    fn test_leftover_file_does_not_block() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("stale.lock");
        fs::write(&lock_path, "").unwrap();

        let lock = acquire(&lock_path, Mode::NonBlocking).unwrap();
        assert!(lock.is_some());
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("missing").join("job.lock");

        let err = acquire(&lock_path, Mode::NonBlocking).unwrap_err();
        assert!(matches!(err, Error::LockIo { .. }));
        assert!(!err.is_duplicate());
    }

    #[test]
    fn test_remove_if_present_tolerates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        remove_if_present(&tmp.path().join("nothing.pid")).unwrap();
    }
}
