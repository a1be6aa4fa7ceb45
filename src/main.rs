//! `instance-lock`: run a job only if no other instance of it is running.
//!
//! Parses arguments, takes the single-instance guard, and maps failures to
//! exit codes. A duplicate instance exits with `exit_codes::DUPLICATE_INSTANCE`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use instance_lock::{exit_codes, InstanceStatus, LogReporter, Mode, Options, SingleInstance};
use std::path::PathBuf;
use std::process::{Command as Process, ExitCode};
use std::thread;
use std::time::Duration;

/// Keep at most one instance of a job running on this host.
///
/// The lock lives in the system temp dir (override with INSTANCE_LOCK_DIR)
/// and is derived from the program path and flavor.
#[derive(Parser, Debug)]
#[command(name = "instance-lock")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take the lock, then run a command or hold it.
    ///
    /// Without --program the lock is derived from the wrapped command's path
    /// (as given, made absolute against the current directory), or from this
    /// binary when no command is given. Exits with the command's status, or 3
    /// if another instance holds the lock.
    Run(RunArgs),

    /// Print the recorded pid of the current holder.
    ///
    /// Exits with 2 when no holder is recorded. The pid may be stale.
    Pid(Target),

    /// Show the lock and pid files of an identity.
    Status(StatusArgs),

    /// Print the lock file path of an identity.
    Path(Target),
}

#[derive(Args, Debug)]
struct Target {
    /// Flavor tag distinguishing independent instances of one program.
    #[arg(short, long, default_value = "")]
    flavor: String,

    /// Program path the lock is derived from.
    #[arg(short, long)]
    program: Option<PathBuf>,
}

impl Target {
    /// Options for this target. Without `--program`, `fallback` names the
    /// program, and without either the identity comes from this binary.
    fn options(&self, fallback: Option<&str>) -> Options {
        let options = Options::new(self.flavor.as_str());
        match (&self.program, fallback) {
            (Some(program), _) => options.program(program),
            (None, Some(program)) => options.program(program),
            (None, None) => options,
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    target: Target,

    /// Wait for the current holder instead of failing.
    #[arg(long)]
    wait: bool,

    /// Keep holding the lock this many milliseconds before continuing.
    #[arg(long, value_name = "MS")]
    hold_ms: Option<u64>,

    /// Abort the process while holding the lock, skipping all cleanup.
    #[arg(long)]
    abort: bool,

    /// Command to run while holding the lock.
    #[arg(last = true)]
    command: Vec<String>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    #[command(flatten)]
    target: Target,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(err) => match err.downcast_ref::<instance_lock::Error>() {
            // Already reported by the guard.
            Some(lock_err) if lock_err.is_duplicate() => ExitCode::from(lock_err.exit_code()),
            Some(lock_err) => {
                log::error!("{err:#}");
                ExitCode::from(lock_err.exit_code())
            }
            None => {
                log::error!("{err:#}");
                ExitCode::from(exit_codes::STARTUP_FAILURE)
            }
        },
    }
}

fn dispatch(command: Command) -> Result<u8> {
    match command {
        Command::Run(args) => run(args),
        Command::Pid(target) => {
            let identity = target.options(None).identity()?;
            match identity.recorded_pid() {
                Some(pid) => {
                    println!("{pid}");
                    Ok(exit_codes::SUCCESS)
                }
                None => Ok(exit_codes::NOT_RECORDED),
            }
        }
        Command::Status(args) => {
            let identity = args.target.options(None).identity()?;
            let status = InstanceStatus::inspect(&identity);
            if args.json {
                println!("{}", status.to_json()?);
            } else {
                print_status(&status);
            }
            Ok(exit_codes::SUCCESS)
        }
        Command::Path(target) => {
            println!("{}", target.options(None).identity()?.lock_path().display());
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn run(args: RunArgs) -> Result<u8> {
    let mode = if args.wait {
        Mode::Blocking
    } else {
        Mode::NonBlocking
    };
    let wrapped = args.command.first().map(String::as_str);
    let guard = SingleInstance::with_options(args.target.options(wrapped).mode(mode), LogReporter)?;
    log::info!("acquired {}", guard.lock_path().display());

    if let Some(ms) = args.hold_ms {
        thread::sleep(Duration::from_millis(ms));
    }
    if args.abort {
        log::warn!("aborting while holding {}", guard.lock_path().display());
        std::process::abort();
    }

    let code = match args.command.split_first() {
        Some((program, rest)) => {
            let status = Process::new(program)
                .args(rest)
                .status()
                .with_context(|| format!("Failed to run {program}"))?;
            match status.code() {
                Some(code) => u8::try_from(code).unwrap_or(exit_codes::STARTUP_FAILURE),
                None => {
                    log::warn!("{program} terminated by signal");
                    exit_codes::STARTUP_FAILURE
                }
            }
        }
        None => exit_codes::SUCCESS,
    };

    guard.release();
    Ok(code)
}

fn print_status(status: &InstanceStatus) {
    println!("lock file: {}", status.lock_path.display());
    println!("pid file:  {}", status.pid_path.display());
    println!(
        "lock file present: {}",
        if status.lock_file_present { "yes" } else { "no" }
    );
    match status.recorded_pid {
        Some(pid) => {
            let liveness = match status.process_alive {
                Some(true) => "alive",
                Some(false) => "not running, stale",
                None => "liveness unknown",
            };
            println!("recorded pid: {pid} ({liveness})");
        }
        None => println!("recorded pid: none"),
    }
    if let Some(at) = status.recorded_at {
        println!("recorded at: {}", at.to_rfc3339());
    }
}
