//! `Process_*` natives
//!
//! `Process_Start` reports through out-arguments: slots 4 to 8 receive the
//! stdin, stdout and stderr socket handles, the process handle and the OS
//! pid. On failure slot 9 receives the error text and the call returns
//! `false`.

use super::socket::{insert_stream, Stream};
use crate::handles::{handle_arg, HandleRegistry};
use hostvm_sdk::{NativeArguments, NativeError, NativeResult, Value};
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;
use tracing::{debug, warn};

static PROCESSES: LazyLock<HandleRegistry<Child>> = LazyLock::new(HandleRegistry::new);

const STDIN_OUT: usize = 4;
const STDOUT_OUT: usize = 5;
const STDERR_OUT: usize = 6;
const PROCESS_OUT: usize = 7;
const PID_OUT: usize = 8;
const ERROR_OUT: usize = 9;

/// `Process_Start(path, arguments, workingDirectory, environment, stdin,
/// stdout, stderr, process, pid, osError) -> bool`
pub fn start(args: &mut NativeArguments) -> NativeResult {
    let command = build_command(args)?;
    match spawn(command) {
        Ok(outputs) => {
            for (slot, value) in outputs {
                args.set(slot, Value::Int(value))?;
            }
            Ok(Value::Bool(true))
        }
        Err(e) => {
            warn!(error = %e, "process start failed");
            args.set(ERROR_OUT, Value::String(e.to_string()))?;
            Ok(Value::Bool(false))
        }
    }
}

fn build_command(args: &NativeArguments) -> Result<Command, NativeError> {
    let mut command = Command::new(args.string(0)?);
    for arg in args.list(1)? {
        let arg = arg.as_str().ok_or(NativeError::TypeMismatch {
            index: 1,
            expected: "List<String>",
            got: arg.type_name(),
        })?;
        command.arg(arg);
    }
    if let Some(dir) = args.opt_string(2)? {
        command.current_dir(dir);
    }
    if let Value::List(entries) = args.get(3)? {
        command.env_clear();
        for entry in entries {
            if let Some((key, value)) = entry.as_str().and_then(|e| e.split_once('=')) {
                command.env(key, value);
            }
        }
    }
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    Ok(command)
}

fn spawn(mut command: Command) -> std::io::Result<Vec<(usize, i64)>> {
    let mut child = command.spawn()?;
    let pid = i64::from(child.id());
    let mut outputs = Vec::with_capacity(5);
    if let Some(stdin) = child.stdin.take() {
        outputs.push((STDIN_OUT, insert_stream(Stream::ChildIn(stdin)) as i64));
    }
    if let Some(stdout) = child.stdout.take() {
        outputs.push((STDOUT_OUT, insert_stream(Stream::ChildOut(stdout)) as i64));
    }
    if let Some(stderr) = child.stderr.take() {
        outputs.push((STDERR_OUT, insert_stream(Stream::ChildErr(stderr)) as i64));
    }
    outputs.push((PROCESS_OUT, PROCESSES.insert(child) as i64));
    outputs.push((PID_OUT, pid));
    debug!(pid, "process started");
    Ok(outputs)
}

/// `Process_Kill(process, pid, signal) -> bool`
pub fn kill(args: &mut NativeArguments) -> NativeResult {
    let id = handle_arg(args, 0)?;
    let signal = args.int(2)?;
    let killed = PROCESSES.with_mut(id, |child| send_signal(child, signal))??;
    Ok(Value::Bool(killed))
}

#[cfg(unix)]
fn send_signal(child: &mut Child, signal: i64) -> std::io::Result<bool> {
    let signal = i32::try_from(signal).unwrap_or(libc::SIGKILL);
    // SAFETY: kill(2) with a pid this process spawned.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, signal) };
    if rc == 0 {
        Ok(true)
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_signal(child: &mut Child, _signal: i64) -> std::io::Result<bool> {
    child.kill()?;
    Ok(true)
}
