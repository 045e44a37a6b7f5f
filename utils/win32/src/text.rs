use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;

use windows_sys::Win32::Foundation::HLOCAL;
use windows_sys::Win32::Foundation::LocalFree;
use windows_sys::Win32::Foundation::PSID;
use windows_sys::Win32::Security::Authorization::ConvertSidToStringSidW;

pub fn to_wide<S: AsRef<OsStr>>(s: S) -> Vec<u16> {
    let mut v: Vec<u16> = s.as_ref().encode_wide().collect();
    v.push(0);
    v
}

/// Reads a NUL-terminated UTF-16 string.
///
/// # Safety
/// `ptr` must be null or point at a readable NUL-terminated buffer.
pub unsafe fn from_wide_ptr(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    // SAFETY: guaranteed by the caller.
    unsafe {
        while *ptr.add(len) != 0 {
            len += 1;
        }
        String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
    }
}

/// Renders a SID as its `S-1-...` string form.
///
/// # Safety
/// `sid` must point at a valid SID for the duration of the call.
pub unsafe fn string_from_sid(sid: PSID) -> io::Result<String> {
    let mut str_ptr: *mut u16 = std::ptr::null_mut();
    // SAFETY: guaranteed by the caller; the output buffer is released below.
    unsafe {
        if ConvertSidToStringSidW(sid, &mut str_ptr) == 0 || str_ptr.is_null() {
            return Err(io::Error::last_os_error());
        }
        let out = from_wide_ptr(str_ptr);
        LocalFree(str_ptr as HLOCAL);
        Ok(out)
    }
}
