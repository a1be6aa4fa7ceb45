//! Single-instance guard.
//!
//! [`SingleInstance`] resolves the lock identity, takes the lock without
//! waiting (unless asked to), and records the current pid in the sidecar
//! pid-file. It owns both until [`SingleInstance::release`] or drop, which
//! delete the pid-file and then release the lock.
//!
//! A process killed by a signal or a fatal fault runs neither. The kernel
//! still drops the OS lock, so the next start succeeds; the lock and pid
//! files stay on disk as stale residue. Do not try to clean up from signal
//! handlers: correctness never depends on those files going away.

use crate::error::{Error, Result};
use crate::identity::{resolve_in, LockIdentity};
use crate::lock::{self, AdvisoryLock, Mode, PlatformLock};
use crate::pid;
use crate::report::{LogReporter, Reporter};
use std::path::{Path, PathBuf};

/// What to lock and how.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Program path the identity is derived from. Defaults to `argv[0]`.
    pub program: Option<PathBuf>,
    /// Discriminates independent instances of the same program.
    pub flavor: String,
    /// Directory for lock and pid files. Defaults to [`crate::lock_dir`].
    pub lock_dir: Option<PathBuf>,
    pub mode: Mode,
}

impl Options {
    pub fn new(flavor: impl Into<String>) -> Self {
        Self {
            flavor: flavor.into(),
            ..Self::default()
        }
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Resolve the identity these options describe.
    pub fn identity(&self) -> Result<LockIdentity> {
        let root = self.lock_dir.clone().unwrap_or_else(crate::lock_dir);
        resolve_in(&root, self.program.as_deref(), &self.flavor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Holding,
    Released,
}

/// Holds the lock and pid-file of one identity for its lifetime.
#[derive(Debug)]
pub struct SingleInstance<R: Reporter = LogReporter> {
    identity: LockIdentity,
    lock: PlatformLock,
    pid: u32,
    reporter: R,
    state: State,
}

impl SingleInstance {
    /// Guard the current program with `flavor`, reporting through `log`.
    ///
    /// Fails with [`Error::DuplicateInstance`] when another process holds
    /// the lock. The caller decides whether that ends the process.
    pub fn new(flavor: &str) -> Result<Self> {
        Self::with_options(Options::new(flavor), LogReporter)
    }
}

impl<R: Reporter> SingleInstance<R> {
    pub fn with_options(options: Options, reporter: R) -> Result<Self> {
        let identity = options.identity()?;

        let Some(mut lock) = lock::acquire(identity.lock_path(), options.mode)? else {
            let holder = identity.recorded_pid();
            reporter.duplicate(&identity, holder);
            return Err(Error::DuplicateInstance {
                lock_path: identity.lock_path().to_path_buf(),
                holder,
            });
        };

        let pid = std::process::id();
        if let Err(e) = pid::write(identity.pid_path(), pid) {
            if let Err(cleanup) = lock.release() {
                reporter.cleanup_failed(&identity, &cleanup);
            }
            return Err(e);
        }

        reporter.acquired(&identity, pid);
        Ok(Self {
            identity,
            lock,
            pid,
            reporter,
            state: State::Holding,
        })
    }

    pub fn identity(&self) -> &LockIdentity {
        &self.identity
    }

    pub fn lock_path(&self) -> &Path {
        self.identity.lock_path()
    }

    pub fn pid_path(&self) -> &Path {
        self.identity.pid_path()
    }

    /// The pid written to the pid-file.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the pid-file and release the lock now.
    ///
    /// Cleanup failures go to the reporter; they never fail the caller.
    pub fn release(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.state == State::Released {
            return;
        }
        self.state = State::Released;

        if let Err(e) = lock::remove_if_present(self.identity.pid_path()) {
            self.reporter.cleanup_failed(&self.identity, &e);
        }
        if let Err(e) = self.lock.release() {
            self.reporter.cleanup_failed(&self.identity, &e);
        }
        self.reporter.released(&self.identity);
    }
}

impl<R: Reporter> Drop for SingleInstance<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
