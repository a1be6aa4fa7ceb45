//! Lock identity derivation.
//!
//! A program path and a flavor tag map to a lock file name inside the lock
//! directory: the absolute program path without its extension, with `/`, `\`
//! and `:` replaced by `-`, followed by `-<flavor>.lock`. Independent processes
//! rendezvous on the same file without any coordination because the mapping
//! is deterministic.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Extension of the lock file.
pub const LOCK_EXTENSION: &str = "lock";

/// Extension of the pid sidecar file.
pub const PID_EXTENSION: &str = "pid";

/// Extension of the temporary file the pid is written to before renaming.
pub const PID_TMP_EXTENSION: &str = "pid.tmp";

/// Longest file name most filesystems accept.
const MAX_NAME_LEN: usize = 255;

/// Longest stem for which every sibling name (`.lock`, `.pid`, `.pid.tmp`)
/// still fits in `MAX_NAME_LEN`.
const MAX_STEM_LEN: usize = MAX_NAME_LEN - PID_TMP_EXTENSION.len() - 1;

/// Hex digits of the blake3 digest kept when a name has to be shortened.
const DIGEST_LEN: usize = 16;

/// Lock and pid file locations for one (program, flavor) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockIdentity {
    lock_path: PathBuf,
    pid_path: PathBuf,
}

impl LockIdentity {
    /// Build an identity from an explicit lock file path.
    pub fn from_lock_path(lock_path: impl Into<PathBuf>) -> Self {
        let lock_path = lock_path.into();
        let pid_path = lock_path.with_extension(PID_EXTENSION);
        Self {
            lock_path,
            pid_path,
        }
    }

    /// Path of the file the advisory lock is taken on.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Path of the sidecar file holding the holder's pid.
    pub fn pid_path(&self) -> &Path {
        &self.pid_path
    }

    /// Last pid recorded for this identity, without touching the lock.
    ///
    /// `None` when no pid-file exists or its content is incomplete. The pid
    /// may be stale if the holder crashed.
    pub fn recorded_pid(&self) -> Option<u32> {
        crate::pid::read(&self.pid_path)
    }
}

impl fmt::Display for LockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lock_path.display())
    }
}

/// Resolve the identity for `program` and `flavor` inside [`crate::lock_dir`].
///
/// `program` defaults to the path this process was invoked as.
pub fn resolve(program: Option<&Path>, flavor: &str) -> Result<LockIdentity> {
    resolve_in(&crate::lock_dir(), program, flavor)
}

/// Resolve the identity for `program` and `flavor` inside `root`.
pub fn resolve_in(root: &Path, program: Option<&Path>, flavor: &str) -> Result<LockIdentity> {
    let program = match program {
        Some(path) => path.to_path_buf(),
        None => invocation_path()?,
    };
    let absolute = absolute(&program.with_extension(""))?;
    Ok(LockIdentity::from_lock_path(
        root.join(lock_file_name(&absolute, flavor)),
    ))
}

/// The path this process was started as (`argv[0]`), or the current
/// executable when argv is empty.
fn invocation_path() -> Result<PathBuf> {
    match std::env::args_os().next() {
        Some(arg0) if !arg0.is_empty() => Ok(PathBuf::from(arg0)),
        _ => std::env::current_exe()
            .map_err(|e| Error::io("resolve program path", "<argv[0]>", e)),
    }
}

/// Make `path` absolute against the current directory and drop `.`/`..`
/// components lexically. Symlinks are not resolved.
fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::io("resolve current directory for", path, e))?;
        cwd.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Replace path separators and drive colons with `-`.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c => c,
        })
        .collect()
}

/// Sanitized program path. Paths that are not valid UTF-8 get a digest of
/// their raw bytes appended, so distinct paths never collapse into the same
/// lossy rendering.
fn program_component(program: &Path) -> String {
    match program.to_str() {
        Some(utf8) => sanitize(utf8),
        None => {
            let raw = program.as_os_str().as_encoded_bytes();
            let digest = blake3::hash(raw).to_hex();
            format!(
                "{}-{}",
                sanitize(&program.to_string_lossy()),
                &digest.as_str()[..DIGEST_LEN]
            )
        }
    }
}

fn lock_file_name(program: &Path, flavor: &str) -> String {
    let stem = format!("{}-{}", program_component(program), sanitize(flavor));
    if stem.len() <= MAX_STEM_LEN {
        return format!("{stem}.{LOCK_EXTENSION}");
    }

    // Keep a readable prefix and make the name unique with a digest of it.
    let digest = blake3::hash(stem.as_bytes()).to_hex();
    let mut cut = MAX_STEM_LEN - DIGEST_LEN - 1;
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}-{}.{LOCK_EXTENSION}",
        &stem[..cut],
        &digest.as_str()[..DIGEST_LEN]
    )
}
