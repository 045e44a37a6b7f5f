use std::io;

use depkit_utils_win32::owned_from_raw;
use depkit_utils_win32::owned_raw;
use windows_sys::Wdk::System::Threading::NtQueryInformationProcess;
use windows_sys::Wdk::System::Threading::PROCESSINFOCLASS;
use windows_sys::Win32::Foundation::NTSTATUS;
use windows_sys::Win32::Foundation::UNICODE_STRING;
use windows_sys::Win32::System::Threading::OpenProcess;
use windows_sys::Win32::System::Threading::PROCESS_QUERY_LIMITED_INFORMATION;

const PROCESS_COMMAND_LINE_INFORMATION: PROCESSINFOCLASS = 60;

/// Reads the command line `pid` was started with, unsplit.
pub(crate) fn command_line(pid: u32) -> io::Result<String> {
    // SAFETY: plain call; the returned handle is owned right away.
    let process =
        owned_from_raw(unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) })?;
    let raw = owned_raw(&process);

    let mut needed = 0u32;
    // SAFETY: a zero-length query only reports the size it needs.
    let status = unsafe {
        NtQueryInformationProcess(
            raw,
            PROCESS_COMMAND_LINE_INFORMATION,
            std::ptr::null_mut(),
            0,
            &mut needed,
        )
    };
    if needed == 0 {
        return Err(status_error(status));
    }

    // Backed by u64 so the UNICODE_STRING header is aligned.
    let mut buffer = vec![0u64; (needed as usize).div_ceil(8)];
    // SAFETY: `buffer` holds at least `needed` writable bytes.
    let status = unsafe {
        NtQueryInformationProcess(
            raw,
            PROCESS_COMMAND_LINE_INFORMATION,
            buffer.as_mut_ptr().cast(),
            needed,
            &mut needed,
        )
    };
    if status < 0 {
        return Err(status_error(status));
    }

    // SAFETY: on success the buffer starts with a UNICODE_STRING whose text
    // lives in the same allocation.
    let line = unsafe {
        let header = &*buffer.as_ptr().cast::<UNICODE_STRING>();
        if header.Buffer.is_null() {
            String::new()
        } else {
            let units = std::slice::from_raw_parts(header.Buffer, usize::from(header.Length) / 2);
            String::from_utf16_lossy(units)
        }
    };
    Ok(line)
}

fn status_error(status: NTSTATUS) -> io::Error {
    io::Error::other(format!(
        "NtQueryInformationProcess failed with status {status:#010x}"
    ))
}
