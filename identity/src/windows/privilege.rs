use std::os::windows::io::AsHandle;

use depkit_utils_win32::borrowed_raw;
use depkit_utils_win32::to_wide;
use tracing::debug;
use windows_sys::Win32::Foundation::ERROR_NOT_ALL_ASSIGNED;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::Foundation::LUID;
use windows_sys::Win32::Security::AdjustTokenPrivileges;
use windows_sys::Win32::Security::LUID_AND_ATTRIBUTES;
use windows_sys::Win32::Security::LookupPrivilegeValueW;
use windows_sys::Win32::Security::SE_PRIVILEGE_ENABLED;
use windows_sys::Win32::Security::TOKEN_ADJUST_PRIVILEGES;
use windows_sys::Win32::Security::TOKEN_PRIVILEGES;
use windows_sys::Win32::Security::TOKEN_QUERY;
use windows_sys::Win32::Security::TokenPrivileges;
use windows_sys::Win32::System::Threading::GetCurrentProcess;

use super::token::open_process_token;
use super::token::token_information;
use crate::IdentityError;
use crate::Privilege;

fn lookup(privilege: Privilege) -> Result<LUID, IdentityError> {
    let name = to_wide(privilege.name());
    let mut luid = LUID {
        LowPart: 0,
        HighPart: 0,
    };
    if unsafe { LookupPrivilegeValueW(std::ptr::null(), name.as_ptr(), &mut luid) } == 0 {
        return Err(IdentityError::last_os_error("LookupPrivilegeValueW"));
    }
    Ok(luid)
}

/// Privileges present on the process token, with their enabled state.
fn held_privileges() -> Result<Vec<(LUID, bool)>, IdentityError> {
    let token = open_process_token(unsafe { GetCurrentProcess() }, TOKEN_QUERY)?;
    let buffer = token_information(token.as_handle(), TokenPrivileges)?;
    let privileges = buffer.as_ptr() as *const TOKEN_PRIVILEGES;
    let entries = unsafe {
        std::slice::from_raw_parts(
            (*privileges).Privileges.as_ptr(),
            (*privileges).PrivilegeCount as usize,
        )
    };
    Ok(entries
        .iter()
        .map(|entry| (entry.Luid, entry.Attributes & SE_PRIVILEGE_ENABLED != 0))
        .collect())
}

fn same_luid(a: LUID, b: LUID) -> bool {
    a.LowPart == b.LowPart && a.HighPart == b.HighPart
}

/// Whether the process token holds `privilege`, enabled or not.
pub fn has_privilege(privilege: Privilege) -> Result<bool, IdentityError> {
    let luid = lookup(privilege)?;
    Ok(held_privileges()?
        .iter()
        .any(|(held, _)| same_luid(*held, luid)))
}

/// Enables `privilege` on the process token if it is held but disabled.
pub fn enable_privilege(privilege: Privilege) -> Result<(), IdentityError> {
    let luid = lookup(privilege)?;
    let enabled = held_privileges()?
        .iter()
        .find(|(held, _)| same_luid(*held, luid))
        .map(|(_, enabled)| *enabled);
    match enabled {
        None => {
            return Err(IdentityError::PrivilegeNotHeld {
                privilege: privilege.name(),
            });
        }
        Some(true) => return Ok(()),
        Some(false) => {}
    }

    let token = open_process_token(
        unsafe { GetCurrentProcess() },
        TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
    )?;
    let request = TOKEN_PRIVILEGES {
        PrivilegeCount: 1,
        Privileges: [LUID_AND_ATTRIBUTES {
            Luid: luid,
            Attributes: SE_PRIVILEGE_ENABLED,
        }],
    };
    let ok = unsafe {
        AdjustTokenPrivileges(
            borrowed_raw(token.as_handle()),
            0,
            &request,
            0,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(IdentityError::last_os_error("AdjustTokenPrivileges"));
    }
    if unsafe { GetLastError() } == ERROR_NOT_ALL_ASSIGNED {
        return Err(IdentityError::PrivilegeNotHeld {
            privilege: privilege.name(),
        });
    }
    debug!(privilege = privilege.name(), "enabled privilege");
    Ok(())
}
