use std::ffi::c_void;
use std::fs::File;
use std::io::Write;
use std::os::windows::io::AsHandle;
use std::os::windows::io::BorrowedHandle;
use std::os::windows::io::OwnedHandle;

use depkit_identity::CallerIdentity;
use depkit_identity::PrimaryToken;
use depkit_identity::Privilege;
use depkit_identity::enable_privilege;
use depkit_utils_win32::borrowed_raw;
use depkit_utils_win32::owned_from_raw;
use depkit_utils_win32::owned_raw;
use depkit_utils_win32::to_wide;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Foundation::HANDLE_FLAG_INHERIT;
use windows_sys::Win32::Foundation::SetHandleInformation;
use windows_sys::Win32::Security::SECURITY_ATTRIBUTES;
use windows_sys::Win32::System::Environment::CreateEnvironmentBlock;
use windows_sys::Win32::System::Environment::DestroyEnvironmentBlock;
use windows_sys::Win32::System::Pipes::CreatePipe;
use windows_sys::Win32::System::Threading::CREATE_BREAKAWAY_FROM_JOB;
use windows_sys::Win32::System::Threading::CREATE_NEW_CONSOLE;
use windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP;
use windows_sys::Win32::System::Threading::CREATE_NO_WINDOW;
use windows_sys::Win32::System::Threading::CREATE_SUSPENDED;
use windows_sys::Win32::System::Threading::CREATE_UNICODE_ENVIRONMENT;
use windows_sys::Win32::System::Threading::CreateProcessAsUserW;
use windows_sys::Win32::System::Threading::CreateProcessW;
use windows_sys::Win32::System::Threading::CreateProcessWithTokenW;
use windows_sys::Win32::System::Threading::DeleteProcThreadAttributeList;
use windows_sys::Win32::System::Threading::EXTENDED_STARTUPINFO_PRESENT;
use windows_sys::Win32::System::Threading::InitializeProcThreadAttributeList;
use windows_sys::Win32::System::Threading::LOGON_WITH_PROFILE;
use windows_sys::Win32::System::Threading::LPPROC_THREAD_ATTRIBUTE_LIST;
use windows_sys::Win32::System::Threading::PROCESS_INFORMATION;
use windows_sys::Win32::System::Threading::ResumeThread;
use windows_sys::Win32::System::Threading::STARTF_USESHOWWINDOW;
use windows_sys::Win32::System::Threading::STARTF_USESTDHANDLES;
use windows_sys::Win32::System::Threading::STARTUPINFOEXW;
use windows_sys::Win32::System::Threading::STARTUPINFOW;
use windows_sys::Win32::System::Threading::TerminateProcess;
use windows_sys::Win32::System::Threading::UpdateProcThreadAttribute;

use super::Started;
use super::job::Job;
use super::preconditions;
use crate::LaunchError;
use crate::LaunchRequest;
use crate::env::Environment;
use crate::identity_switch::Breakaway;
use crate::identity_switch::CreationRoute;
use crate::identity_switch::choose_creation_route;
use crate::output::OutputSink;
use crate::output::Stream;
use crate::resolve::ResolvedCommand;
use crate::resolve::resolve_command;
use crate::strategy::ConsoleMode;
use crate::strategy::IdentitySwitch;

const PROC_THREAD_ATTRIBUTE_EXTENDED_FLAGS: usize = 0x0006_0001;
const EXTENDED_PROCESS_CREATION_FLAG_FORCE_BREAKAWAY: u32 = 0x0000_0004;
const INTERACTIVE_DESKTOP: &str = "winsta0\\default";

/// Builds a sorted `NAME=value\0...\0\0` block for process creation.
fn make_env_block(env: &Environment) -> Vec<u16> {
    let mut items: Vec<(&str, &str)> = env.iter().collect();
    items.sort_by(|a, b| {
        a.0.to_uppercase()
            .cmp(&b.0.to_uppercase())
            .then(a.0.cmp(b.0))
    });
    let mut block: Vec<u16> = Vec::new();
    for (name, value) in items {
        block.extend(to_wide(format!("{name}={value}")));
    }
    block.push(0);
    block
}

/// The environment `token`'s user gets at logon, optionally merged with the
/// caller's.
fn token_environment(token: &PrimaryToken, inherit: bool) -> Result<Environment, LaunchError> {
    let mut block: *mut c_void = std::ptr::null_mut();
    let token_raw = borrowed_raw(token.as_handle());
    if unsafe { CreateEnvironmentBlock(&mut block, token_raw, i32::from(inherit)) } == 0 {
        return Err(LaunchError::last_os_error("CreateEnvironmentBlock"));
    }
    let mut entries = Vec::new();
    let mut cursor = block as *const u16;
    unsafe {
        loop {
            let entry = depkit_utils_win32::from_wide_ptr(cursor);
            if entry.is_empty() {
                break;
            }
            cursor = cursor.add(entry.encode_utf16().count() + 1);
            entries.push(entry);
        }
        DestroyEnvironmentBlock(block);
    }
    Ok(Environment::from_entries(entries.iter().map(String::as_str)))
}

/// Both ends of one anonymous pipe. The child's end is inheritable.
struct PipePair {
    parent: OwnedHandle,
    child: OwnedHandle,
}

/// `parent_reads` selects which end the caller keeps.
fn pipe(parent_reads: bool) -> Result<PipePair, LaunchError> {
    let attributes = SECURITY_ATTRIBUTES {
        nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
        lpSecurityDescriptor: std::ptr::null_mut(),
        bInheritHandle: 1,
    };
    let mut read: HANDLE = 0;
    let mut write: HANDLE = 0;
    if unsafe { CreatePipe(&mut read, &mut write, &attributes, 0) } == 0 {
        return Err(LaunchError::last_os_error("CreatePipe"));
    }
    let os_err = |source| LaunchError::Os {
        operation: "CreatePipe",
        source,
    };
    let read = owned_from_raw(read).map_err(os_err)?;
    let write = owned_from_raw(write).map_err(os_err)?;
    let (parent, child) = if parent_reads {
        (read, write)
    } else {
        (write, read)
    };
    if unsafe { SetHandleInformation(owned_raw(&parent), HANDLE_FLAG_INHERIT, 0) } == 0 {
        return Err(LaunchError::last_os_error("SetHandleInformation"));
    }
    Ok(PipePair { parent, child })
}

struct StdioPipes {
    stdin: PipePair,
    stdout: PipePair,
    stderr: PipePair,
}

impl StdioPipes {
    fn new() -> Result<Self, LaunchError> {
        Ok(Self {
            stdin: pipe(false)?,
            stdout: pipe(true)?,
            stderr: pipe(true)?,
        })
    }
}

/// An attribute list requesting forced breakaway from the caller's job.
struct ForceBreakaway {
    storage: Vec<usize>,
    // Referenced by the attribute list until it is deleted.
    flags: Box<u32>,
}

impl ForceBreakaway {
    fn new() -> Result<Self, LaunchError> {
        let mut size: usize = 0;
        unsafe { InitializeProcThreadAttributeList(std::ptr::null_mut(), 1, 0, &mut size) };
        let mut list = Self {
            storage: vec![0usize; size.div_ceil(std::mem::size_of::<usize>())],
            flags: Box::new(EXTENDED_PROCESS_CREATION_FLAG_FORCE_BREAKAWAY),
        };
        if unsafe { InitializeProcThreadAttributeList(list.as_ptr(), 1, 0, &mut size) } == 0 {
            list.storage.clear();
            return Err(LaunchError::last_os_error("InitializeProcThreadAttributeList"));
        }
        let ok = unsafe {
            UpdateProcThreadAttribute(
                list.as_ptr(),
                0,
                PROC_THREAD_ATTRIBUTE_EXTENDED_FLAGS,
                &*list.flags as *const u32 as *const c_void,
                std::mem::size_of::<u32>(),
                std::ptr::null_mut(),
                std::ptr::null(),
            )
        };
        if ok == 0 {
            return Err(LaunchError::last_os_error("UpdateProcThreadAttribute"));
        }
        Ok(list)
    }

    fn as_ptr(&mut self) -> LPPROC_THREAD_ATTRIBUTE_LIST {
        self.storage.as_mut_ptr() as LPPROC_THREAD_ATTRIBUTE_LIST
    }
}

impl Drop for ForceBreakaway {
    fn drop(&mut self) {
        if !self.storage.is_empty() {
            unsafe { DeleteProcThreadAttributeList(self.as_ptr()) };
        }
    }
}

fn obtain_token(identity: &IdentitySwitch) -> Result<Option<PrimaryToken>, LaunchError> {
    Ok(match identity {
        IdentitySwitch::CurrentUser => None,
        IdentitySwitch::ActiveUser(request) => Some(depkit_identity::get_primary_token(request)?),
        IdentitySwitch::Unelevated => Some(depkit_identity::get_unelevated_token()?),
    })
}

/// Creates the process suspended, places it in `job`, then lets it run.
pub(super) fn create_direct(
    request: &LaunchRequest,
    identity: &IdentitySwitch,
    console: ConsoleMode,
    capture_output: bool,
    job: &Job,
    caller: &CallerIdentity,
    sink: &OutputSink,
) -> Result<(Started, ResolvedCommand), LaunchError> {
    let token = obtain_token(identity)?;
    let other_account = match &token {
        Some(token) => !token.sid()?.eq_ignore_ascii_case(&caller.sid),
        None => false,
    };

    let (env, account) = match (&token, &request.run_as_active_user) {
        (Some(token), Some(user)) if other_account => (
            token_environment(token, request.inherit_environment_variables)?,
            user.account.as_str(),
        ),
        _ => (Environment::current(), caller.username.as_str()),
    };
    let resolved = resolve_command(request, &env, account)?;
    let env_block = other_account.then(|| make_env_block(&env));

    let pipes = if capture_output {
        Some(StdioPipes::new()?)
    } else {
        if !request.standard_input.is_empty() {
            tracing::warn!("standard input is only written to hidden console launches");
        }
        None
    };

    let mut startup: STARTUPINFOEXW = unsafe { std::mem::zeroed() };
    startup.StartupInfo.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
    let desktop = to_wide(INTERACTIVE_DESKTOP);
    if other_account {
        startup.StartupInfo.lpDesktop = desktop.as_ptr() as *mut u16;
    }
    if let Some(show) = console.show_command(request.window_style) {
        startup.StartupInfo.dwFlags |= STARTF_USESHOWWINDOW;
        startup.StartupInfo.wShowWindow = show;
    }
    if let Some(pipes) = &pipes {
        startup.StartupInfo.dwFlags |= STARTF_USESTDHANDLES;
        startup.StartupInfo.hStdInput = owned_raw(&pipes.stdin.child);
        startup.StartupInfo.hStdOutput = owned_raw(&pipes.stdout.child);
        startup.StartupInfo.hStdError = owned_raw(&pipes.stderr.child);
    }

    let mut flags = CREATE_UNICODE_ENVIRONMENT | CREATE_NEW_PROCESS_GROUP | CREATE_SUSPENDED;
    flags |= match console {
        ConsoleMode::Hidden => CREATE_NO_WINDOW,
        ConsoleMode::NewConsole => CREATE_NEW_CONSOLE,
        ConsoleMode::Inherit => 0,
    };
    if let Some(priority) = request.priority_class {
        flags |= priority.creation_flag();
    }

    let mut command_line = resolved.command_line.to_wide_nul();
    let working_directory = resolved.working_directory.as_deref().map(to_wide);
    let call = CreateCall {
        command_line: command_line.as_mut_ptr(),
        environment: env_block
            .as_ref()
            .map_or(std::ptr::null(), |block| block.as_ptr() as *const c_void),
        working_directory: working_directory
            .as_ref()
            .map_or(std::ptr::null(), |dir| dir.as_ptr()),
        inherit_handles: pipes.is_some(),
    };

    let info = match &token {
        None => call.current_user(flags, &startup.StartupInfo)?,
        Some(token) => {
            let pre = preconditions::gather(other_account, pipes.is_some())?;
            let route = choose_creation_route(&pre)?;
            tracing::info!(?route, other_account, "creating the process with a token");
            call.with_token(token.as_handle(), route, flags, &mut startup)?
        }
    };
    let process = owned_from_raw(info.hProcess).map_err(|source| LaunchError::Os {
        operation: "CreateProcess",
        source,
    })?;
    let thread = owned_from_raw(info.hThread).map_err(|source| LaunchError::Os {
        operation: "CreateProcess",
        source,
    })?;

    if let Err(err) = job.assign(process.as_handle()) {
        unsafe { TerminateProcess(owned_raw(&process), 1) };
        return Err(err);
    }
    if unsafe { ResumeThread(owned_raw(&thread)) } == u32::MAX {
        let err = LaunchError::last_os_error("ResumeThread");
        unsafe { TerminateProcess(owned_raw(&process), 1) };
        return Err(err);
    }
    drop(thread);

    let io_threads = match pipes {
        Some(pipes) => start_io_threads(pipes, request, sink)?,
        None => Vec::new(),
    };
    Ok((
        Started {
            process,
            pid: info.dwProcessId,
            tracked: true,
            io_threads,
        },
        resolved,
    ))
}

fn start_io_threads(
    pipes: StdioPipes,
    request: &LaunchRequest,
    sink: &OutputSink,
) -> Result<Vec<std::thread::JoinHandle<()>>, LaunchError> {
    let encoding = request.encoding()?;
    let spawn_failed = |source| LaunchError::Os {
        operation: "spawn output thread",
        source,
    };
    // Dropping the child ends leaves the process as the only writer, so the
    // readers see end of file when it exits.
    let StdioPipes {
        stdin,
        stdout,
        stderr,
    } = pipes;
    drop((stdin.child, stdout.child, stderr.child));

    let mut threads = vec![
        sink.spawn_reader(File::from(stdout.parent), Stream::Stdout, encoding)
            .map_err(spawn_failed)?,
        sink.spawn_reader(File::from(stderr.parent), Stream::Stderr, encoding)
            .map_err(spawn_failed)?,
    ];
    let lines = request.standard_input.clone();
    let mut writer = File::from(stdin.parent);
    threads.push(
        std::thread::Builder::new()
            .name("depkit-stdin".to_string())
            .spawn(move || {
                for line in &lines {
                    if let Err(err) = write!(writer, "{line}\r\n") {
                        tracing::debug!("standard input closed early: {err}");
                        return;
                    }
                }
            })
            .map_err(spawn_failed)?,
    );
    Ok(threads)
}

/// Arguments shared by the three `CreateProcess*` entry points.
struct CreateCall {
    command_line: *mut u16,
    environment: *const c_void,
    working_directory: *const u16,
    inherit_handles: bool,
}

impl CreateCall {
    fn current_user(
        &self,
        flags: u32,
        startup: &STARTUPINFOW,
    ) -> Result<PROCESS_INFORMATION, LaunchError> {
        let mut info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };
        let ok = unsafe {
            CreateProcessW(
                std::ptr::null(),
                self.command_line,
                std::ptr::null(),
                std::ptr::null(),
                i32::from(self.inherit_handles),
                flags,
                self.environment,
                self.working_directory,
                startup,
                &mut info,
            )
        };
        if ok == 0 {
            return Err(LaunchError::last_os_error("CreateProcessW"));
        }
        Ok(info)
    }

    fn with_token(
        &self,
        token: BorrowedHandle<'_>,
        route: CreationRoute,
        mut flags: u32,
        startup: &mut STARTUPINFOEXW,
    ) -> Result<PROCESS_INFORMATION, LaunchError> {
        let mut info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };
        let breakaway = match route {
            CreationRoute::WithToken => {
                let ok = unsafe {
                    CreateProcessWithTokenW(
                        borrowed_raw(token),
                        LOGON_WITH_PROFILE,
                        std::ptr::null(),
                        self.command_line,
                        flags,
                        self.environment,
                        self.working_directory,
                        &startup.StartupInfo,
                        &mut info,
                    )
                };
                if ok == 0 {
                    return Err(LaunchError::last_os_error("CreateProcessWithTokenW"));
                }
                return Ok(info);
            }
            CreationRoute::AsUser { breakaway } => breakaway,
        };

        let mut force = None;
        match breakaway {
            Breakaway::None => {}
            Breakaway::Request => flags |= CREATE_BREAKAWAY_FROM_JOB,
            Breakaway::Force => {
                enable_privilege(Privilege::Tcb)?;
                let list = force.insert(ForceBreakaway::new()?);
                startup.lpAttributeList = list.as_ptr();
                startup.StartupInfo.cb = std::mem::size_of::<STARTUPINFOEXW>() as u32;
                flags |= EXTENDED_STARTUPINFO_PRESENT;
            }
        }
        enable_privilege(Privilege::IncreaseQuota)?;
        enable_privilege(Privilege::AssignPrimaryToken)?;
        let ok = unsafe {
            CreateProcessAsUserW(
                borrowed_raw(token),
                std::ptr::null(),
                self.command_line,
                std::ptr::null(),
                std::ptr::null(),
                i32::from(self.inherit_handles),
                flags,
                self.environment,
                self.working_directory,
                &startup.StartupInfo,
                &mut info,
            )
        };
        drop(force);
        if ok == 0 {
            return Err(LaunchError::last_os_error("CreateProcessAsUserW"));
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn env_blocks_are_sorted_and_double_terminated() {
        let env = Environment::from_pairs([
            ("b".to_string(), "2".to_string()),
            ("A".to_string(), "1".to_string()),
        ]);
        let block = make_env_block(&env);
        let text = String::from_utf16(&block).expect("utf-16");
        assert_eq!(text, "A=1\0b=2\0\0");
    }
}
