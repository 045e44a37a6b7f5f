use std::io;
use std::os::windows::io::AsRawHandle;
use std::os::windows::io::BorrowedHandle;
use std::os::windows::io::FromRawHandle;
use std::os::windows::io::OwnedHandle;
use std::os::windows::io::RawHandle;

use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;

/// Takes ownership of a handle returned by a Win32 call.
///
/// Null and `INVALID_HANDLE_VALUE` are reported as the thread's last OS error,
/// so this must be called before anything else touches `GetLastError`.
pub fn owned_from_raw(raw: HANDLE) -> io::Result<OwnedHandle> {
    if raw == 0 || raw == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: the caller passes a freshly returned handle that nothing else owns.
    Ok(unsafe { OwnedHandle::from_raw_handle(raw as RawHandle) })
}

pub fn owned_raw(handle: &OwnedHandle) -> HANDLE {
    handle.as_raw_handle() as HANDLE
}

pub fn borrowed_raw(handle: BorrowedHandle<'_>) -> HANDLE {
    handle.as_raw_handle() as HANDLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_sentinel_handles() {
        assert!(owned_from_raw(0).is_err());
        assert!(owned_from_raw(INVALID_HANDLE_VALUE).is_err());
    }
}
