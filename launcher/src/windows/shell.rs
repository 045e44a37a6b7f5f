use std::os::windows::io::OwnedHandle;

use depkit_utils_win32::owned_from_raw;
use depkit_utils_win32::to_wide;
use windows_sys::Win32::UI::Shell::SHELLEXECUTEINFOW;
use windows_sys::Win32::UI::Shell::ShellExecuteExW;

use crate::LaunchError;
use crate::LaunchRequest;
use crate::resolve::ResolvedCommand;

const SEE_MASK_NOCLOSEPROCESS: u32 = 0x0000_0040;
const SEE_MASK_FLAG_NO_UI: u32 = 0x0000_0400;
const SEE_MASK_NO_CONSOLE: u32 = 0x0000_8000;
const SEE_MASK_NOZONECHECKS: u32 = 0x0080_0000;
const SW_HIDE: i32 = 0;
const SW_SHOWNORMAL: i32 = 1;

/// Hands the file to the shell. Returns `None` when the shell satisfied the
/// request without starting a process, e.g. by reusing a running one.
pub(super) fn shell_execute(
    request: &LaunchRequest,
    verb: Option<&str>,
    resolved: &ResolvedCommand,
) -> Result<Option<OwnedHandle>, LaunchError> {
    let verb = verb.map(to_wide);
    let file = to_wide(&resolved.file_path);
    let parameters = resolved.rendered_arguments.as_deref().map(to_wide);
    let directory = resolved.working_directory.as_deref().map(to_wide);

    let mut info: SHELLEXECUTEINFOW = unsafe { std::mem::zeroed() };
    info.cbSize = std::mem::size_of::<SHELLEXECUTEINFOW>() as u32;
    info.fMask = SEE_MASK_NOCLOSEPROCESS | SEE_MASK_FLAG_NO_UI | SEE_MASK_NOZONECHECKS;
    info.nShow = request
        .window_style
        .map_or(SW_SHOWNORMAL, |style| i32::from(style.show_command()));
    if request.create_no_window {
        info.fMask |= SEE_MASK_NO_CONSOLE;
        info.nShow = SW_HIDE;
    }
    info.lpVerb = verb.as_ref().map_or(std::ptr::null(), |verb| verb.as_ptr());
    info.lpFile = file.as_ptr();
    info.lpParameters = parameters
        .as_ref()
        .map_or(std::ptr::null(), |parameters| parameters.as_ptr());
    info.lpDirectory = directory
        .as_ref()
        .map_or(std::ptr::null(), |directory| directory.as_ptr());

    if unsafe { ShellExecuteExW(&mut info) } == 0 {
        return Err(LaunchError::last_os_error("ShellExecuteExW"));
    }
    if info.hProcess == 0 {
        tracing::info!(file = %resolved.file_path, "shell execution started no process");
        return Ok(None);
    }
    owned_from_raw(info.hProcess)
        .map(Some)
        .map_err(|source| LaunchError::Os {
            operation: "ShellExecuteExW",
            source,
        })
}
