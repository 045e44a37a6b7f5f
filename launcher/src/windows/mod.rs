//! Windows backend: every launch gets a job object reporting to its own
//! completion port, and a waiter thread that owns both until the job is done.

mod create;
mod job;
mod preconditions;
mod shell;

use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use std::os::windows::io::AsHandle;
use std::os::windows::io::OwnedHandle;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use depkit_identity::CallerIdentity;
use depkit_utils_win32::owned_raw;
use tokio_util::sync::CancellationToken;
use windows_sys::Win32::System::Threading::GetExitCodeProcess;
use windows_sys::Win32::System::Threading::GetProcessId;
use windows_sys::Win32::System::Threading::QueryFullProcessImageNameW;
use windows_sys::Win32::System::Threading::SetPriorityClass;

use crate::LaunchError;
use crate::LaunchHandle;
use crate::LaunchRequest;
use crate::LaunchResult;
use crate::TIMEOUT_EXIT_CODE;
use crate::env::Environment;
use crate::output::OutputSink;
use crate::resolve::ResolvedCommand;
use crate::resolve::resolve_command;
use crate::strategy::LaunchStrategy;
use crate::wait::WaitPolicy;
use job::Job;
use job::JobWait;

/// A running process and the threads feeding it.
pub(super) struct Started {
    process: OwnedHandle,
    pid: u32,
    /// Whether the process is inside the job.
    tracked: bool,
    io_threads: Vec<JoinHandle<()>>,
}

pub(crate) fn launch(
    request: Arc<LaunchRequest>,
    strategy: LaunchStrategy,
    caller: &CallerIdentity,
    cancel: CancellationToken,
) -> Result<Option<LaunchHandle>, LaunchError> {
    let job = Job::new(request.kill_child_processes_with_parent)?;
    let sink = OutputSink::default();

    let (started, resolved) = match &strategy {
        LaunchStrategy::Direct {
            identity,
            console,
            capture_output,
        } => create::create_direct(
            &request,
            identity,
            *console,
            *capture_output,
            &job,
            caller,
            &sink,
        )?,
        LaunchStrategy::ShellVerb { verb } => {
            let resolved = resolve_command(&request, &Environment::current(), &caller.username)?;
            match shell::shell_execute(&request, verb.as_deref(), &resolved)? {
                Some(process) => (adopt(process, &request, &job), resolved),
                None => return Ok(None),
            }
        }
    };
    tracing::info!(pid = started.pid, command_line = %resolved.command_line, "process started");
    spawn_waiter(started, resolved, job, sink, request, cancel).map(Some)
}

/// Brings a process the shell started under the job's control.
fn adopt(process: OwnedHandle, request: &LaunchRequest, job: &Job) -> Started {
    let pid = unsafe { GetProcessId(owned_raw(&process)) };
    let tracked = match job.assign(process.as_handle()) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(pid, "watching the process without its job: {err}");
            false
        }
    };
    if let Some(priority) = request.priority_class {
        if unsafe { SetPriorityClass(owned_raw(&process), priority.creation_flag()) } == 0 {
            tracing::warn!(pid, "failed to set priority class: {}", std::io::Error::last_os_error());
        }
    }
    Started {
        process,
        pid,
        tracked,
        io_threads: Vec::new(),
    }
}

fn module_path(process: &OwnedHandle) -> Option<PathBuf> {
    let mut buffer = vec![0u16; 32 * 1024];
    let mut len = buffer.len() as u32;
    let ok = unsafe {
        QueryFullProcessImageNameW(owned_raw(process), 0, buffer.as_mut_ptr(), &mut len)
    };
    (ok != 0).then(|| PathBuf::from(OsString::from_wide(&buffer[..len as usize])))
}

fn exit_code(process: &OwnedHandle) -> Result<i32, LaunchError> {
    let mut code: u32 = 0;
    if unsafe { GetExitCodeProcess(owned_raw(process), &mut code) } == 0 {
        return Err(LaunchError::last_os_error("GetExitCodeProcess"));
    }
    Ok(code as i32)
}

fn spawn_waiter(
    started: Started,
    resolved: ResolvedCommand,
    job: Job,
    sink: OutputSink,
    request: Arc<LaunchRequest>,
    cancel: CancellationToken,
) -> Result<LaunchHandle, LaunchError> {
    let module_path =
        module_path(&started.process).unwrap_or_else(|| PathBuf::from(&resolved.file_path));
    let command_line = resolved.command_line.to_string();
    let (handle, tx) = LaunchHandle::new(
        started.pid,
        module_path,
        Arc::clone(&request),
        command_line.clone(),
    );
    let mut policy = WaitPolicy::new(request.timeout(), cancel, request.no_terminate_on_timeout);

    let spawned = std::thread::Builder::new()
        .name("depkit-waiter".to_string())
        .spawn(move || {
            let Started {
                process,
                pid,
                tracked,
                io_threads,
            } = started;
            let outcome = job
                .wait(
                    process.as_handle(),
                    pid,
                    request.wait_for_child_processes,
                    tracked,
                    &mut policy,
                )
                .and_then(|waited| match waited {
                    JobWait::Completed => Ok(None),
                    JobWait::DeadlineReached => {
                        tracing::info!(pid, "terminating the job at the deadline");
                        job.terminate(TIMEOUT_EXIT_CODE).map(|()| Some(TIMEOUT_EXIT_CODE))
                    }
                });
            for thread in io_threads {
                if thread.join().is_err() {
                    tracing::warn!(pid, "an output thread panicked");
                }
            }
            let result = outcome
                .and_then(|forced| forced.map_or_else(|| exit_code(&process), Ok))
                .map(|code| {
                    tracing::debug!(pid, exit_code = code, "process finished");
                    LaunchResult::completed(code, request, command_line, sink.finish())
                });
            // Closing the job here applies the kill-on-close limit to any
            // remaining children.
            drop(job);
            if tx.send(result).is_err() {
                tracing::debug!(pid, "launch handle dropped before completion");
            }
        });
    spawned.map(|_| handle).map_err(|source| LaunchError::Os {
        operation: "spawn waiter thread",
        source,
    })
}
