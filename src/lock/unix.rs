//! `lockf(3)` record lock on an open descriptor.
//!
//! Record locks belong to the process, not the descriptor: a second lock
//! taken by the same process on the same file succeeds, and closing any
//! descriptor for the file drops every lock the process holds on it. A
//! process-wide registry of held paths keeps a second in-process acquire
//! from quietly sharing (and later destroying) the first one.

use super::{remove_if_present, AdvisoryLock, Mode};
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Paths locked (or being locked) by this process.
static HELD: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();

fn held_paths() -> MutexGuard<'static, HashSet<PathBuf>> {
    HELD.get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns false if this process already holds `path`.
fn reserve(path: &Path) -> bool {
    held_paths().insert(path.to_path_buf())
}

fn unreserve(path: &Path) {
    held_paths().remove(path);
}

/// Exclusive `lockf` lock. `file` is `Some` while holding.
#[derive(Debug)]
pub struct PosixAdvisoryLock {
    path: PathBuf,
    file: Option<File>,
}

impl AdvisoryLock for PosixAdvisoryLock {
    fn acquire(path: &Path, mode: Mode) -> Result<Option<Self>> {
        if !reserve(path) {
            return match mode {
                Mode::NonBlocking => Ok(None),
                Mode::Blocking => Err(Error::WouldDeadlock {
                    path: path.to_path_buf(),
                }),
            };
        }

        match lock_file(path, mode) {
            Ok(Some(file)) => Ok(Some(Self {
                path: path.to_path_buf(),
                file: Some(file),
            })),
            other => {
                unreserve(path);
                other.map(|_| None)
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        // Unlink before unlocking: a waiter that wins the old inode then
        // sees it is no longer at `path` and retries on the new file.
        let removed = remove_if_present(&self.path);

        // SAFETY: `file` is open for the duration of the call, so the
        // descriptor is valid. F_ULOCK only touches this process's locks.
        let rc = unsafe { libc::lockf(file.as_raw_fd(), libc::F_ULOCK, 0) };
        let unlocked = if rc == 0 {
            Ok(())
        } else {
            Err(Error::io("unlock", &self.path, io::Error::last_os_error()))
        };

        drop(file);
        unreserve(&self.path);
        removed.and(unlocked)
    }

    fn is_held(&self) -> bool {
        self.file.is_some()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PosixAdvisoryLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("{e}");
        }
    }
}

/// Open-or-create `path` and lock it. `Ok(None)` means another process
/// holds it (non-blocking only).
fn lock_file(path: &Path, mode: Mode) -> Result<Option<File>> {
    let cmd = match mode {
        Mode::Blocking => libc::F_LOCK,
        Mode::NonBlocking => libc::F_TLOCK,
    };

    loop {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::io("open lock file", path, e))?;

        // SAFETY: `fd` comes from the open `file`, which outlives the call.
        // lockf with length 0 covers the whole file from offset 0.
        let rc = unsafe { libc::lockf(file.as_raw_fd(), cmd, 0) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(code) if mode == Mode::NonBlocking && is_contention(code) => Ok(None),
                Some(libc::EINTR) => Err(Error::Interrupted {
                    path: path.to_path_buf(),
                }),
                _ => Err(Error::io("lock", path, err)),
            };
        }

        if still_linked(&file, path)? {
            return Ok(Some(file));
        }
        log::debug!("lock file {} replaced while waiting, retrying", path.display());
    }
}

fn is_contention(code: i32) -> bool {
    code == libc::EACCES || code == libc::EAGAIN || code == libc::EWOULDBLOCK
}

/// True if `path` still names the inode `file` has open.
fn still_linked(file: &File, path: &Path) -> Result<bool> {
    let held = file
        .metadata()
        .map_err(|e| Error::io("stat lock file", path, e))?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io("stat lock file", path, e)),
    }
}
