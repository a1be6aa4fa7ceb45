//! Read-only inspection of an identity's on-disk state.
//!
//! Nothing here takes the lock, so a report can disagree with reality: a
//! recorded pid may belong to a crashed holder, or (after pid reuse) to an
//! unrelated process. Only an acquire attempt answers "is it running".

use crate::identity::LockIdentity;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

/// Snapshot of the lock and pid files for one identity.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub lock_path: PathBuf,
    pub pid_path: PathBuf,
    pub lock_file_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_pid: Option<u32>,
    /// When the pid-file was last written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
    /// Whether the recorded pid names a live process. `None` when there is
    /// no recorded pid or the platform cannot tell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_alive: Option<bool>,
}

impl InstanceStatus {
    pub fn inspect(identity: &LockIdentity) -> Self {
        let recorded_pid = identity.recorded_pid();
        let recorded_at = recorded_pid.and_then(|_| {
            let modified = fs::metadata(identity.pid_path()).ok()?.modified().ok()?;
            Some(DateTime::<Utc>::from(modified))
        });

        Self {
            lock_path: identity.lock_path().to_path_buf(),
            pid_path: identity.pid_path().to_path_buf(),
            lock_file_present: identity.lock_path().exists(),
            recorded_pid,
            recorded_at,
            process_alive: recorded_pid.and_then(is_process_alive),
        }
    }

    /// True if the files look like a crashed holder's leftovers.
    pub fn looks_stale(&self) -> bool {
        self.process_alive == Some(false)
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Check if a process with the given PID is alive.
#[cfg(unix)]
fn is_process_alive(pid: u32) -> Option<bool> {
    let pid = libc::pid_t::try_from(pid).ok()?;
    // SAFETY: kill with signal 0 sends nothing; it only performs the
    // existence and permission checks. No memory is passed to the call.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return Some(true);
    }
    // EPERM: exists, owned by someone else
    Some(std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM))
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> Option<bool> {
    None
}
