//! Exclusive-create lock.
//!
//! The holder keeps the file open with share mode 0, so no other process can
//! open, delete or recreate it. A holder that dies loses the handle and its
//! leftover file becomes removable again.

use super::{remove_if_present, AdvisoryLock, Mode};
use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::windows::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const ERROR_SHARING_VIOLATION: i32 = 32;
const ERROR_LOCK_VIOLATION: i32 = 33;

/// How often a blocking acquire retries.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive-create lock. `file` is `Some` while holding.
#[derive(Debug)]
pub struct WindowsExclusiveCreateLock {
    path: PathBuf,
    file: Option<File>,
}

impl AdvisoryLock for WindowsExclusiveCreateLock {
    fn acquire(path: &Path, mode: Mode) -> Result<Option<Self>> {
        loop {
            match try_create(path)? {
                Some(file) => {
                    return Ok(Some(Self {
                        path: path.to_path_buf(),
                        file: Some(file),
                    }))
                }
                None if mode == Mode::NonBlocking => return Ok(None),
                None => thread::sleep(POLL_INTERVAL),
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        drop(file);
        remove_if_present(&self.path)
    }

    fn is_held(&self) -> bool {
        self.file.is_some()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WindowsExclusiveCreateLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("{e}");
        }
    }
}

fn try_create(path: &Path) -> Result<Option<File>> {
    // A file left by a dead holder can be removed; a live holder's cannot.
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) if is_held_elsewhere(&e) => return Ok(None),
        Err(e) => return Err(Error::io("remove stale lock file", path, e)),
    }

    match OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .share_mode(0)
        .open(path)
    {
        Ok(file) => Ok(Some(file)),
        // AlreadyExists: another process created it between our remove and create.
        Err(e) if is_held_elsewhere(&e) || e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(Error::io("create lock file", path, e)),
    }
}

fn is_held_elsewhere(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::PermissionDenied
        || matches!(
            e.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
        )
}
