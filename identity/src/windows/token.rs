use std::ffi::c_void;
use std::os::windows::io::BorrowedHandle;
use std::os::windows::io::OwnedHandle;

use depkit_utils_win32::borrowed_raw;
use depkit_utils_win32::from_wide_ptr;
use depkit_utils_win32::owned_from_raw;
use depkit_utils_win32::string_from_sid;
use windows_sys::Win32::Foundation::ERROR_INSUFFICIENT_BUFFER;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Security::DuplicateTokenEx;
use windows_sys::Win32::Security::GetTokenInformation;
use windows_sys::Win32::Security::LookupAccountSidW;
use windows_sys::Win32::Security::SID_NAME_USE;
use windows_sys::Win32::Security::SecurityIdentification;
use windows_sys::Win32::Security::TOKEN_ACCESS_MASK;
use windows_sys::Win32::Security::TOKEN_ALL_ACCESS;
use windows_sys::Win32::Security::TOKEN_ELEVATION;
use windows_sys::Win32::Security::TOKEN_INFORMATION_CLASS;
use windows_sys::Win32::Security::TOKEN_LINKED_TOKEN;
use windows_sys::Win32::Security::TOKEN_USER;
use windows_sys::Win32::Security::TokenElevation;
use windows_sys::Win32::Security::TokenLinkedToken;
use windows_sys::Win32::Security::TokenPrimary;
use windows_sys::Win32::Security::TokenUser;
use windows_sys::Win32::System::Threading::OpenProcessToken;

use crate::IdentityError;

/// Fetches a variable-length token information class into an 8-byte
/// aligned buffer.
pub(crate) fn token_information(
    token: BorrowedHandle<'_>,
    class: TOKEN_INFORMATION_CLASS,
) -> Result<Vec<u64>, IdentityError> {
    let raw = borrowed_raw(token);
    let mut needed = 0u32;
    unsafe {
        GetTokenInformation(raw, class, std::ptr::null_mut(), 0, &mut needed);
    }
    let err = unsafe { GetLastError() };
    if needed == 0 && err != ERROR_INSUFFICIENT_BUFFER {
        return Err(IdentityError::last_os_error("GetTokenInformation"));
    }
    let mut buffer = vec![0u64; (needed as usize).div_ceil(8).max(1)];
    let ok = unsafe {
        GetTokenInformation(
            raw,
            class,
            buffer.as_mut_ptr() as *mut c_void,
            (buffer.len() * 8) as u32,
            &mut needed,
        )
    };
    if ok == 0 {
        return Err(IdentityError::last_os_error("GetTokenInformation"));
    }
    Ok(buffer)
}

pub(crate) fn token_sid(token: BorrowedHandle<'_>) -> Result<String, IdentityError> {
    let buffer = token_information(token, TokenUser)?;
    let user = buffer.as_ptr() as *const TOKEN_USER;
    unsafe { string_from_sid((*user).User.Sid) }.map_err(|source| IdentityError::Os {
        operation: "ConvertSidToStringSidW",
        source,
    })
}

/// `DOMAIN\user` for the token's account.
pub(crate) fn token_account(token: BorrowedHandle<'_>) -> Result<String, IdentityError> {
    let buffer = token_information(token, TokenUser)?;
    let user = buffer.as_ptr() as *const TOKEN_USER;
    let mut name = vec![0u16; 256];
    let mut domain = vec![0u16; 256];
    let mut name_len = name.len() as u32;
    let mut domain_len = domain.len() as u32;
    let mut sid_use: SID_NAME_USE = 0;
    let ok = unsafe {
        LookupAccountSidW(
            std::ptr::null(),
            (*user).User.Sid,
            name.as_mut_ptr(),
            &mut name_len,
            domain.as_mut_ptr(),
            &mut domain_len,
            &mut sid_use,
        )
    };
    if ok == 0 {
        return Err(IdentityError::last_os_error("LookupAccountSidW"));
    }
    let name = unsafe { from_wide_ptr(name.as_ptr()) };
    let domain = unsafe { from_wide_ptr(domain.as_ptr()) };
    if domain.is_empty() {
        Ok(name)
    } else {
        Ok(format!("{domain}\\{name}"))
    }
}

pub(crate) fn token_is_elevated(token: BorrowedHandle<'_>) -> Result<bool, IdentityError> {
    let buffer = token_information(token, TokenElevation)?;
    let elevation = buffer.as_ptr() as *const TOKEN_ELEVATION;
    Ok(unsafe { (*elevation).TokenIsElevated } != 0)
}

pub(crate) fn linked_token(token: BorrowedHandle<'_>) -> Result<OwnedHandle, IdentityError> {
    let buffer = token_information(token, TokenLinkedToken)?;
    let linked = buffer.as_ptr() as *const TOKEN_LINKED_TOKEN;
    owned_from_raw(unsafe { (*linked).LinkedToken }).map_err(|source| IdentityError::Os {
        operation: "GetTokenInformation(TokenLinkedToken)",
        source,
    })
}

pub(crate) fn duplicate_primary(token: BorrowedHandle<'_>) -> Result<OwnedHandle, IdentityError> {
    let mut duplicate: HANDLE = 0;
    let ok = unsafe {
        DuplicateTokenEx(
            borrowed_raw(token),
            TOKEN_ALL_ACCESS,
            std::ptr::null(),
            SecurityIdentification,
            TokenPrimary,
            &mut duplicate,
        )
    };
    if ok == 0 {
        return Err(IdentityError::last_os_error("DuplicateTokenEx"));
    }
    owned_from_raw(duplicate).map_err(|source| IdentityError::Os {
        operation: "DuplicateTokenEx",
        source,
    })
}

pub(crate) fn open_process_token(
    process: HANDLE,
    access: TOKEN_ACCESS_MASK,
) -> Result<OwnedHandle, IdentityError> {
    let mut token: HANDLE = 0;
    if unsafe { OpenProcessToken(process, access, &mut token) } == 0 {
        return Err(IdentityError::last_os_error("OpenProcessToken"));
    }
    owned_from_raw(token).map_err(|source| IdentityError::Os {
        operation: "OpenProcessToken",
        source,
    })
}
