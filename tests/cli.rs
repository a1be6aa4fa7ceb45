//! Cross-process tests driving the `instance-lock` binary.
//!
//! Record locks are per process, so contention can only be observed between
//! separate processes.

use instance_lock::{exit_codes, resolve_in, LockIdentity, LOCK_DIR_ENV};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const PROGRAM: &str = "/opt/jobs/integration-job";

fn bin(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_instance-lock"));
    cmd.env(LOCK_DIR_ENV, dir)
        .env("RUST_LOG", "off")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

fn run(dir: &Path, flavor: &str, extra: &[&str]) -> Command {
    let mut cmd = bin(dir);
    cmd.args(["run", "--program", PROGRAM, "--flavor", flavor])
        .args(extra);
    cmd
}

fn identity(dir: &Path, flavor: &str) -> LockIdentity {
    resolve_in(dir, Some(Path::new(PROGRAM)), flavor).unwrap()
}

/// Poll until the pid-file records `pid`.
fn wait_for_holder(identity: &LockIdentity, pid: u32) {
    let start = Instant::now();
    while identity.recorded_pid() != Some(pid) {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "timed out waiting for pid {pid} in {}",
            identity.pid_path().display()
        );
        thread::sleep(Duration::from_millis(20));
    }
}

fn spawn_holder(dir: &Path, flavor: &str, hold_ms: u64) -> Child {
    let child = run(dir, flavor, &["--hold-ms", &hold_ms.to_string()])
        .spawn()
        .unwrap();
    wait_for_holder(&identity(dir, flavor), child.id());
    child
}

#[test]
fn test_run_releases_on_exit() {
    let tmp = tempfile::tempdir().unwrap();
    let status = run(tmp.path(), "clean", &[]).status().unwrap();
    assert!(status.success());

    let identity = identity(tmp.path(), "clean");
    assert!(!identity.lock_path().exists());
    assert!(!identity.pid_path().exists());
    assert_eq!(identity.recorded_pid(), None);
}

#[test]
fn test_second_instance_is_rejected_until_holder_dies() {
    let tmp = tempfile::tempdir().unwrap();
    let identity = identity(tmp.path(), "busy");
    let mut holder = spawn_holder(tmp.path(), "busy", 30_000);

    // Twice: a failed attempt must not disturb the holder.
    for _ in 0..2 {
        let status = run(tmp.path(), "busy", &[]).status().unwrap();
        assert_eq!(status.code(), Some(i32::from(exit_codes::DUPLICATE_INSTANCE)));
        assert_eq!(identity.recorded_pid(), Some(holder.id()));
    }

    // Killed: no cleanup runs, the files stay, the lock does not.
    holder.kill().unwrap();
    holder.wait().unwrap();
    assert!(identity.lock_path().exists());
    assert_eq!(identity.recorded_pid(), Some(holder.id()));

    let status = run(tmp.path(), "busy", &[]).status().unwrap();
    assert!(status.success());
    assert!(!identity.lock_path().exists());
    assert!(!identity.pid_path().exists());
}

#[test]
fn test_abort_leaves_files_but_frees_lock() {
    let tmp = tempfile::tempdir().unwrap();
    let identity = identity(tmp.path(), "crash");

    let mut crashed = run(tmp.path(), "crash", &["--abort"]).spawn().unwrap();
    let status = crashed.wait().unwrap();
    assert!(!status.success());

    assert!(identity.lock_path().exists());
    assert_eq!(identity.recorded_pid(), Some(crashed.id()));

    let status = run(tmp.path(), "crash", &[]).status().unwrap();
    assert!(status.success());
}

#[test]
fn test_flavors_are_independent() {
    let tmp = tempfile::tempdir().unwrap();
    let mut holder = spawn_holder(tmp.path(), "one", 30_000);

    let status = run(tmp.path(), "two", &[]).status().unwrap();
    assert!(status.success());

    holder.kill().unwrap();
    holder.wait().unwrap();
}

#[test]
fn test_concurrent_starts_leave_one_holder() {
    let tmp = tempfile::tempdir().unwrap();
    let children: Vec<Child> = (0..6)
        .map(|_| {
            run(tmp.path(), "race", &["--hold-ms", "4000"])
                .spawn()
                .unwrap()
        })
        .collect();

    let codes: Vec<Option<i32>> = children
        .into_iter()
        .map(|mut child| child.wait().unwrap().code())
        .collect();

    let winners = codes.iter().filter(|c| **c == Some(0)).count();
    let rejected = codes
        .iter()
        .filter(|c| **c == Some(i32::from(exit_codes::DUPLICATE_INSTANCE)))
        .count();
    assert_eq!(winners, 1, "exit codes: {codes:?}");
    assert_eq!(rejected, 5, "exit codes: {codes:?}");
}

#[test]
fn test_wait_acquires_after_holder_exits() {
    let tmp = tempfile::tempdir().unwrap();
    let mut holder = spawn_holder(tmp.path(), "queue", 2_000);

    // The holder sleeps 2s after recording its pid, so most of that is left.
    let start = Instant::now();
    let status = run(tmp.path(), "queue", &["--wait"]).status().unwrap();
    let waited = start.elapsed();
    assert!(status.success());
    assert!(
        waited >= Duration::from_millis(1_500),
        "waiter returned after {waited:?} while the holder still held the lock"
    );
    assert!(holder.wait().unwrap().success());

    let identity = identity(tmp.path(), "queue");
    assert!(!identity.lock_path().exists());
    assert!(!identity.pid_path().exists());
}

#[test]
fn test_pid_command() {
    let tmp = tempfile::tempdir().unwrap();
    let args = ["pid", "--program", PROGRAM, "--flavor", "query"];

    let status = bin(tmp.path()).args(args).status().unwrap();
    assert_eq!(status.code(), Some(i32::from(exit_codes::NOT_RECORDED)));

    let mut holder = spawn_holder(tmp.path(), "query", 30_000);
    let output = bin(tmp.path())
        .args(args)
        .stdout(Stdio::piped())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap().trim(),
        holder.id().to_string()
    );

    holder.kill().unwrap();
    holder.wait().unwrap();
}

#[test]
fn test_path_and_status_commands() {
    let tmp = tempfile::tempdir().unwrap();
    let identity = identity(tmp.path(), "inspect");

    let output = bin(tmp.path())
        .args(["path", "--program", PROGRAM, "--flavor", "inspect"])
        .stdout(Stdio::piped())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap().trim(),
        identity.lock_path().display().to_string()
    );

    let mut holder = spawn_holder(tmp.path(), "inspect", 30_000);
    let output = bin(tmp.path())
        .args(["status", "--json", "--program", PROGRAM, "--flavor", "inspect"])
        .stdout(Stdio::piped())
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["recorded_pid"], holder.id());
    assert_eq!(value["lock_file_present"], true);

    holder.kill().unwrap();
    holder.wait().unwrap();
}

#[cfg(unix)]
#[test]
fn test_run_propagates_command_status() {
    let tmp = tempfile::tempdir().unwrap();
    let status = run(tmp.path(), "cmd", &["--", "sh", "-c", "exit 7"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(7));

    let identity = identity(tmp.path(), "cmd");
    assert!(!identity.lock_path().exists());
}

#[cfg(unix)]
#[test]
fn test_run_derives_lock_from_wrapped_command() {
    let tmp = tempfile::tempdir().unwrap();
    let expected = resolve_in(tmp.path(), Some(Path::new("sh")), "").unwrap();

    // The wrapped command checks that its own lock file exists.
    let status = bin(tmp.path())
        .args(["run", "--", "sh", "-c", "test -e \"$1\"", "sh"])
        .arg(expected.lock_path())
        .status()
        .unwrap();
    assert!(status.success());
    assert!(!expected.lock_path().exists());
}
