//! Pid-file bookkeeping.
//!
//! The holder writes its pid as ASCII decimal followed by `\n` into a sidecar
//! file next to the lock file. Readers never take the lock: content without
//! the trailing newline (a write in progress, or garbage) reads as "no
//! recorded holder" rather than as an error.

use crate::error::{Error, Result};
use crate::identity::PID_TMP_EXTENSION;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Record `pid` in the pid-file at `path`.
///
/// Writes to a temporary file (`.tmp` suffix), syncs it, then renames it
/// over `path` so readers see either nothing or the complete content.
pub fn write(path: &Path, pid: u32) -> Result<()> {
    let tmp_path = path.with_extension(PID_TMP_EXTENSION);

    let mut file =
        File::create(&tmp_path).map_err(|e| Error::io("create pid file", &tmp_path, e))?;
    writeln!(file, "{pid}").map_err(|e| Error::io("write pid file", &tmp_path, e))?;
    file.sync_all()
        .map_err(|e| Error::io("sync pid file", &tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::io("rename pid file into", path, e)
    })
}

/// Read the pid recorded at `path`, or `None` if absent or malformed.
pub fn read(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    parse(&content)
}

/// Parse pid-file content. Only `<digits>\n` is recognized.
pub fn parse(content: &str) -> Option<u32> {
    let digits = content.strip_suffix('\n')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Look up the last recorded holder of `program` + `flavor` without taking
/// the lock.
///
/// The pid is not checked for liveness: after a crash the stale pid of the
/// dead holder is returned. Fails only when the identity cannot be resolved.
pub fn lookup(program: &Path, flavor: &str) -> Result<Option<u32>> {
    Ok(crate::identity::resolve(Some(program), flavor)?.recorded_pid())
}
