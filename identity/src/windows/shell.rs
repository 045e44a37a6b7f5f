use std::os::windows::io::AsHandle;
use std::os::windows::io::OwnedHandle;

use depkit_utils_win32::borrowed_raw;
use depkit_utils_win32::owned_from_raw;
use tracing::debug;
use tracing::trace;
use windows_sys::Win32::Foundation::FILETIME;
use windows_sys::Win32::Foundation::HWND;
use windows_sys::Win32::Security::TOKEN_DUPLICATE;
use windows_sys::Win32::Security::TOKEN_QUERY;
use windows_sys::Win32::System::Diagnostics::ToolHelp::CreateToolhelp32Snapshot;
use windows_sys::Win32::System::Diagnostics::ToolHelp::PROCESSENTRY32W;
use windows_sys::Win32::System::Diagnostics::ToolHelp::Process32FirstW;
use windows_sys::Win32::System::Diagnostics::ToolHelp::Process32NextW;
use windows_sys::Win32::System::Diagnostics::ToolHelp::TH32CS_SNAPPROCESS;
use windows_sys::Win32::System::RemoteDesktop::ProcessIdToSessionId;
use windows_sys::Win32::System::Threading::GetProcessTimes;
use windows_sys::Win32::System::Threading::OpenProcess;
use windows_sys::Win32::System::Threading::PROCESS_QUERY_LIMITED_INFORMATION;
use windows_sys::Win32::UI::WindowsAndMessaging::GetShellWindow;
use windows_sys::Win32::UI::WindowsAndMessaging::GetWindowThreadProcessId;

use super::token::open_process_token;
use super::token::token_sid;
use crate::IdentityError;

const SHELL_IMAGE: &str = "explorer.exe";

/// Process ids of `explorer.exe` instances in `session_id`.
fn shell_processes_in_session(session_id: u32) -> Result<Vec<u32>, IdentityError> {
    let snapshot = owned_from_raw(unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) })
        .map_err(|source| IdentityError::Os {
            operation: "CreateToolhelp32Snapshot",
            source,
        })?;
    let raw = borrowed_raw(snapshot.as_handle());
    let mut entry: PROCESSENTRY32W = unsafe { std::mem::zeroed() };
    entry.dwSize = std::mem::size_of::<PROCESSENTRY32W>() as u32;

    let mut pids = Vec::new();
    let mut more = unsafe { Process32FirstW(raw, &mut entry) } != 0;
    while more {
        let len = entry
            .szExeFile
            .iter()
            .position(|unit| *unit == 0)
            .unwrap_or(entry.szExeFile.len());
        let image = String::from_utf16_lossy(&entry.szExeFile[..len]);
        if image.eq_ignore_ascii_case(SHELL_IMAGE) {
            let mut process_session = 0u32;
            let known = unsafe { ProcessIdToSessionId(entry.th32ProcessID, &mut process_session) };
            if known != 0 && process_session == session_id {
                pids.push(entry.th32ProcessID);
            }
        }
        more = unsafe { Process32NextW(raw, &mut entry) } != 0;
    }
    Ok(pids)
}

fn open_process(pid: u32) -> Result<OwnedHandle, IdentityError> {
    owned_from_raw(unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) }).map_err(
        |source| IdentityError::Os {
            operation: "OpenProcess",
            source,
        },
    )
}

fn creation_time(process: &OwnedHandle) -> u64 {
    let mut created = FILETIME {
        dwLowDateTime: 0,
        dwHighDateTime: 0,
    };
    let mut exited = created;
    let mut kernel = created;
    let mut user = created;
    let raw = borrowed_raw(process.as_handle());
    let ok = unsafe { GetProcessTimes(raw, &mut created, &mut exited, &mut kernel, &mut user) };
    if ok == 0 {
        return u64::MAX;
    }
    (u64::from(created.dwHighDateTime) << 32) | u64::from(created.dwLowDateTime)
}

fn shell_token(pid: u32) -> Result<OwnedHandle, IdentityError> {
    let process = open_process(pid)?;
    open_process_token(
        borrowed_raw(process.as_handle()),
        TOKEN_QUERY | TOKEN_DUPLICATE,
    )
}

/// Token of the oldest shell in `session_id` whose user is `sid`.
///
/// Shells that cannot be opened (for example one elevated by a privilege
/// manager while the caller is not) are skipped.
pub(crate) fn session_shell_token(
    session_id: u32,
    sid: &str,
) -> Result<Option<OwnedHandle>, IdentityError> {
    let mut candidates = Vec::new();
    for pid in shell_processes_in_session(session_id)? {
        match open_process(pid) {
            Ok(process) => candidates.push((creation_time(&process), pid)),
            Err(err) => debug!(pid, "skipping inaccessible shell process: {err}"),
        }
    }
    candidates.sort_unstable();

    for (_, pid) in candidates {
        let token = match shell_token(pid) {
            Ok(token) => token,
            Err(err) => {
                debug!(pid, "skipping shell process token: {err}");
                continue;
            }
        };
        match token_sid(token.as_handle()) {
            Ok(owner) if owner.eq_ignore_ascii_case(sid) => return Ok(Some(token)),
            Ok(owner) => trace!(pid, %owner, "shell belongs to another user"),
            Err(err) => debug!(pid, "unable to read shell token owner: {err}"),
        }
    }
    Ok(None)
}

/// Token of the desktop shell process of the calling session.
pub(crate) fn desktop_shell_token() -> Result<Option<OwnedHandle>, IdentityError> {
    let window: HWND = unsafe { GetShellWindow() };
    if window == 0 {
        return Ok(None);
    }
    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(window, &mut pid) };
    if pid == 0 {
        return Ok(None);
    }
    shell_token(pid).map(Some)
}
