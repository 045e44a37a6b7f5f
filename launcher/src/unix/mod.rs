//! Portable backend built on `std::process`.
//!
//! Each process leads its own process group, which stands in for the job
//! object of the Windows backend: waiting for children means waiting for the
//! group to empty, and termination kills the group.

mod process_group;

use std::io::Write;
use std::os::unix::process::CommandExt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Child;
use std::process::ChildStdin;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use depkit_command_line::command_line_to_argv;
use depkit_identity::CallerIdentity;
use tokio_util::sync::CancellationToken;

use crate::LaunchError;
use crate::LaunchHandle;
use crate::LaunchRequest;
use crate::LaunchResult;
use crate::PriorityClass;
use crate::TIMEOUT_EXIT_CODE;
use crate::env::Environment;
use crate::output::OutputSink;
use crate::output::Stream;
use crate::resolve::resolve_command;
use crate::strategy::IdentitySwitch;
use crate::strategy::LaunchStrategy;
use crate::wait::WaitDecision;
use crate::wait::WaitPolicy;

const EXIT_POLL: Duration = Duration::from_millis(20);

pub(crate) fn launch(
    request: Arc<LaunchRequest>,
    strategy: LaunchStrategy,
    caller: &CallerIdentity,
    cancel: CancellationToken,
) -> Result<Option<LaunchHandle>, LaunchError> {
    let capture_output = match strategy {
        LaunchStrategy::ShellVerb { .. } => return Err(LaunchError::Unsupported("shell verbs")),
        LaunchStrategy::Direct {
            identity,
            capture_output,
            ..
        } => {
            runs_as_current_user(&identity)?;
            capture_output
        }
    };

    let resolved = resolve_command(&request, &Environment::current(), &caller.username)?;
    let encoding = request.encoding()?;

    let mut command = Command::new(&resolved.file_path);
    command.args(argument_vector(&resolved.arguments));
    if let Some(dir) = &resolved.working_directory {
        command.current_dir(dir);
    }
    command.process_group(0);
    if let Some(nice) = request.priority_class.map(PriorityClass::nice) {
        unsafe {
            command.pre_exec(move || {
                process_group::set_nice(nice);
                Ok(())
            });
        }
    }
    if !request.standard_input.is_empty() {
        command.stdin(Stdio::piped());
    } else if capture_output {
        command.stdin(Stdio::null());
    }
    if capture_output {
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
    }

    let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
        path: resolved.file_path.clone(),
        source,
    })?;
    let pid = child.id();
    tracing::info!(pid, command_line = %resolved.command_line, "process started");

    let sink = OutputSink::default();
    let io_threads = match start_io_threads(&mut child, &sink, &request, encoding) {
        Ok(threads) => threads,
        Err(err) => {
            abandon(&mut child, pid);
            return Err(err);
        }
    };

    let module_path = std::fs::canonicalize(&resolved.file_path)
        .unwrap_or_else(|_| PathBuf::from(&resolved.file_path));
    let command_line = resolved.command_line.to_string();
    let (handle, tx) = LaunchHandle::new(
        pid,
        module_path,
        Arc::clone(&request),
        command_line.clone(),
    );
    let policy = WaitPolicy::new(request.timeout(), cancel, request.no_terminate_on_timeout);

    let waiter = std::thread::Builder::new()
        .name("depkit-waiter".to_string())
        .spawn(move || {
            let outcome = wait_for_exit(&mut child, pid, policy, &request);
            for thread in io_threads {
                if thread.join().is_err() {
                    tracing::warn!(pid, "an output thread panicked");
                }
            }
            let output = sink.finish();
            let result = outcome
                .map(|exit_code| LaunchResult::completed(exit_code, request, command_line, output));
            if tx.send(result).is_err() {
                tracing::debug!(pid, "launch handle dropped before completion");
            }
        });
    if let Err(source) = waiter {
        if let Err(err) = process_group::kill_process_group(pid) {
            tracing::warn!(pid, "failed to kill process group: {err}");
        }
        return Err(LaunchError::Os {
            operation: "spawn waiter thread",
            source,
        });
    }
    Ok(Some(handle))
}

/// Root has no split token to drop to, so an unelevated launch runs as the
/// caller.
fn runs_as_current_user(identity: &IdentitySwitch) -> Result<(), LaunchError> {
    match identity {
        IdentitySwitch::CurrentUser => Ok(()),
        IdentitySwitch::Unelevated => {
            tracing::debug!("no unelevated token on this platform; launching as the caller");
            Ok(())
        }
        IdentitySwitch::ActiveUser(_) => Err(LaunchError::Unsupported("identity switching")),
    }
}

fn start_io_threads(
    child: &mut Child,
    sink: &OutputSink,
    request: &LaunchRequest,
    encoding: &'static encoding_rs::Encoding,
) -> Result<Vec<JoinHandle<()>>, LaunchError> {
    let spawn_failed = |source| LaunchError::Os {
        operation: "spawn output thread",
        source,
    };
    let mut threads = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        threads.push(
            sink.spawn_reader(stdout, Stream::Stdout, encoding)
                .map_err(spawn_failed)?,
        );
    }
    if let Some(stderr) = child.stderr.take() {
        threads.push(
            sink.spawn_reader(stderr, Stream::Stderr, encoding)
                .map_err(spawn_failed)?,
        );
    }
    if let Some(stdin) = child.stdin.take() {
        let lines = request.standard_input.clone();
        threads.push(
            std::thread::Builder::new()
                .name("depkit-stdin".to_string())
                .spawn(move || write_standard_input(stdin, &lines))
                .map_err(spawn_failed)?,
        );
    }
    Ok(threads)
}

/// The argument vector the process sees. A single pre-rendered string is
/// split the way a Windows process would split it.
fn argument_vector(arguments: &[String]) -> Vec<String> {
    match arguments {
        [single] => command_line_to_argv(single).unwrap_or_default(),
        many => many.to_vec(),
    }
}

fn write_standard_input(mut stdin: ChildStdin, lines: &[String]) {
    for line in lines {
        if let Err(err) = writeln!(stdin, "{line}") {
            tracing::debug!("standard input closed early: {err}");
            return;
        }
    }
}

fn abandon(child: &mut Child, pid: u32) {
    if let Err(err) = process_group::kill_process_group(pid) {
        tracing::warn!(pid, "failed to kill process group: {err}");
    }
    let _ = child.wait();
}

fn wait_for_exit(
    child: &mut Child,
    pid: u32,
    mut policy: WaitPolicy,
    request: &LaunchRequest,
) -> Result<i32, LaunchError> {
    let mut exited = None;
    let exit_code = loop {
        if exited.is_none() {
            let status = child.try_wait().map_err(|source| LaunchError::Os {
                operation: "waitpid",
                source,
            })?;
            exited = status.map(exit_code_of);
        }
        if let Some(code) = exited {
            if !request.wait_for_child_processes || !process_group::group_alive(pid) {
                break code;
            }
        }

        if policy.check() == WaitDecision::Terminate {
            abandon(child, pid);
            tracing::info!(pid, "process group terminated at the deadline");
            return Ok(TIMEOUT_EXIT_CODE);
        }
        std::thread::sleep(policy.next_wait().min(EXIT_POLL));
    };

    tracing::debug!(pid, exit_code, "process exited");
    if request.kill_child_processes_with_parent {
        if let Err(err) = process_group::kill_process_group(pid) {
            tracing::warn!(pid, "failed to kill remaining children: {err}");
        }
    }
    Ok(exit_code)
}

fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}
