use std::ffi::c_void;
use std::io;

use depkit_identity::Privilege;
use depkit_identity::has_privilege;
use depkit_utils_win32::to_wide;
use windows_sys::Win32::Foundation::BOOL;
use windows_sys::Win32::Foundation::ERROR_INSUFFICIENT_BUFFER;
use windows_sys::Win32::Foundation::ERROR_SERVICE_DOES_NOT_EXIST;
use windows_sys::Win32::System::JobObjects::IsProcessInJob;
use windows_sys::Win32::System::JobObjects::JOB_OBJECT_LIMIT_BREAKAWAY_OK;
use windows_sys::Win32::System::JobObjects::JOB_OBJECT_LIMIT_SILENT_BREAKAWAY_OK;
use windows_sys::Win32::System::JobObjects::JOBOBJECT_EXTENDED_LIMIT_INFORMATION;
use windows_sys::Win32::System::JobObjects::JobObjectExtendedLimitInformation;
use windows_sys::Win32::System::JobObjects::QueryInformationJobObject;
use windows_sys::Win32::System::Services::CloseServiceHandle;
use windows_sys::Win32::System::Services::OpenSCManagerW;
use windows_sys::Win32::System::Services::OpenServiceW;
use windows_sys::Win32::System::Services::QUERY_SERVICE_CONFIGW;
use windows_sys::Win32::System::Services::QueryServiceConfigW;
use windows_sys::Win32::System::Services::SC_HANDLE;
use windows_sys::Win32::System::Services::SC_MANAGER_CONNECT;
use windows_sys::Win32::System::Services::SERVICE_DISABLED;
use windows_sys::Win32::System::Services::SERVICE_QUERY_CONFIG;
use windows_sys::Win32::System::Threading::GetCurrentProcess;

use crate::LaunchError;
use crate::identity_switch::Blocker;
use crate::identity_switch::RoutePreconditions;

const SECONDARY_LOGON_SERVICE: &str = "seclogon";

/// Observes everything the creation-route decision needs.
pub(super) fn gather(
    other_account: bool,
    inherits_handles: bool,
) -> Result<RoutePreconditions, LaunchError> {
    let pre = RoutePreconditions {
        as_user: as_user_blocker(other_account)?.map_or(Ok(()), Err),
        with_token: with_token_blocker()?.map_or(Ok(()), Err),
        other_account,
        holds_tcb: has_privilege(Privilege::Tcb)?,
        inherits_handles,
    };
    tracing::debug!(?pre, "token creation preconditions");
    Ok(pre)
}

fn as_user_blocker(other_account: bool) -> Result<Option<Blocker>, LaunchError> {
    for privilege in [Privilege::IncreaseQuota, Privilege::AssignPrimaryToken] {
        if !has_privilege(privilege)? {
            return Ok(Some(Blocker::MissingPrivilege(privilege)));
        }
    }
    if !other_account || caller_job_allows_breakaway()? {
        return Ok(None);
    }
    Ok(Some(Blocker::JobBreakawayNotPermitted))
}

fn with_token_blocker() -> Result<Option<Blocker>, LaunchError> {
    if !has_privilege(Privilege::Impersonate)? {
        return Ok(Some(Blocker::MissingPrivilege(Privilege::Impersonate)));
    }
    Ok(match service_start_type(SECONDARY_LOGON_SERVICE)? {
        None => Some(Blocker::SecondaryLogonNotFound),
        Some(SERVICE_DISABLED) => Some(Blocker::SecondaryLogonDisabled),
        Some(_) => None,
    })
}

/// True when the caller is in no job or in one that lets children break away.
fn caller_job_allows_breakaway() -> Result<bool, LaunchError> {
    let mut in_job: BOOL = 0;
    if unsafe { IsProcessInJob(GetCurrentProcess(), 0, &mut in_job) } == 0 {
        return Err(LaunchError::last_os_error("IsProcessInJob"));
    }
    if in_job == 0 {
        return Ok(true);
    }
    let mut limits: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = unsafe { std::mem::zeroed() };
    let ok = unsafe {
        QueryInformationJobObject(
            0,
            JobObjectExtendedLimitInformation,
            &mut limits as *mut _ as *mut c_void,
            std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(LaunchError::last_os_error("QueryInformationJobObject"));
    }
    let flags = limits.BasicLimitInformation.LimitFlags;
    Ok(flags & (JOB_OBJECT_LIMIT_BREAKAWAY_OK | JOB_OBJECT_LIMIT_SILENT_BREAKAWAY_OK) != 0)
}

struct ServiceHandle(SC_HANDLE);

impl ServiceHandle {
    fn open(raw: SC_HANDLE, operation: &'static str) -> Result<Self, LaunchError> {
        if raw == 0 {
            return Err(LaunchError::last_os_error(operation));
        }
        Ok(Self(raw))
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        unsafe {
            CloseServiceHandle(self.0);
        }
    }
}

/// The configured start type of a service, or `None` when it is not installed.
fn service_start_type(name: &str) -> Result<Option<u32>, LaunchError> {
    let manager = ServiceHandle::open(
        unsafe { OpenSCManagerW(std::ptr::null(), std::ptr::null(), SC_MANAGER_CONNECT) },
        "OpenSCManagerW",
    )?;
    let name = to_wide(name);
    let raw = unsafe { OpenServiceW(manager.0, name.as_ptr(), SERVICE_QUERY_CONFIG) };
    if raw == 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(ERROR_SERVICE_DOES_NOT_EXIST as i32) {
            return Ok(None);
        }
        return Err(LaunchError::Os {
            operation: "OpenServiceW",
            source: err,
        });
    }
    let service = ServiceHandle(raw);

    let mut needed: u32 = 0;
    unsafe { QueryServiceConfigW(service.0, std::ptr::null_mut(), 0, &mut needed) };
    let err = io::Error::last_os_error();
    if err.raw_os_error() != Some(ERROR_INSUFFICIENT_BUFFER as i32) {
        return Err(LaunchError::Os {
            operation: "QueryServiceConfigW",
            source: err,
        });
    }
    // u64 storage keeps the structure's pointer fields aligned.
    let mut buffer = vec![0u64; (needed as usize).div_ceil(8)];
    let config = buffer.as_mut_ptr() as *mut QUERY_SERVICE_CONFIGW;
    if unsafe { QueryServiceConfigW(service.0, config, needed, &mut needed) } == 0 {
        return Err(LaunchError::last_os_error("QueryServiceConfigW"));
    }
    Ok(Some(unsafe { (*config).dwStartType }))
}
