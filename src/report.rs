//! Reporting of guard lifecycle events.
//!
//! A [`Reporter`] is handed to [`crate::SingleInstance`] at construction and
//! owned by it, so the guard never reaches for process-global logger state.
//! Every method has a no-op default.

use crate::error::Error;
use crate::identity::LockIdentity;

pub trait Reporter {
    /// The lock was taken and `pid` recorded.
    fn acquired(&self, _identity: &LockIdentity, _pid: u32) {}

    /// Another instance holds the lock.
    fn duplicate(&self, _identity: &LockIdentity, _holder: Option<u32>) {}

    /// Normal shutdown finished.
    fn released(&self, _identity: &LockIdentity) {}

    /// Removing a file or unlocking failed during shutdown. Never fatal.
    fn cleanup_failed(&self, _identity: &LockIdentity, _error: &Error) {}
}

impl<R: Reporter + ?Sized> Reporter for &R {
    fn acquired(&self, identity: &LockIdentity, pid: u32) {
        (**self).acquired(identity, pid)
    }

    fn duplicate(&self, identity: &LockIdentity, holder: Option<u32>) {
        (**self).duplicate(identity, holder)
    }

    fn released(&self, identity: &LockIdentity) {
        (**self).released(identity)
    }

    fn cleanup_failed(&self, identity: &LockIdentity, error: &Error) {
        (**self).cleanup_failed(identity, error)
    }
}

/// Reports through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn acquired(&self, identity: &LockIdentity, pid: u32) {
        log::debug!("holding {identity} as pid {pid}");
    }

    fn duplicate(&self, identity: &LockIdentity, holder: Option<u32>) {
        match holder {
            Some(pid) => log::error!("another instance (pid {pid}) is already running: {identity}"),
            None => log::error!("another instance is already running: {identity}"),
        }
    }

    fn released(&self, identity: &LockIdentity) {
        log::debug!("released {identity}");
    }

    fn cleanup_failed(&self, identity: &LockIdentity, error: &Error) {
        log::warn!("cleanup of {identity} incomplete: {error}");
    }
}

/// Reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {}
