mod privilege;
mod shell;
mod token;

use std::ffi::c_void;
use std::os::windows::io::AsHandle;
use std::os::windows::io::OwnedHandle;

use depkit_utils_win32::owned_from_raw;
use tracing::debug;
use tracing::info;
use windows_sys::Win32::Foundation::BOOL;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Security::CheckTokenMembership;
use windows_sys::Win32::Security::CreateWellKnownSid;
use windows_sys::Win32::Security::TOKEN_QUERY;
use windows_sys::Win32::Security::WinBuiltinAdministratorsSid;
use windows_sys::Win32::System::RemoteDesktop::WTSQueryUserToken;
use windows_sys::Win32::System::Threading::GetCurrentProcess;

pub use privilege::enable_privilege;
pub use privilege::has_privilege;
pub(crate) use token::token_is_elevated;
pub(crate) use token::token_sid;

use crate::CallerIdentity;
use crate::IdentityError;
use crate::LOCAL_SYSTEM_SID;
use crate::PrimaryToken;
use crate::Privilege;
use crate::TokenRequest;

const MAX_SID_SIZE: usize = 68;

fn is_admin_member() -> Result<bool, IdentityError> {
    let mut sid = [0u8; MAX_SID_SIZE];
    let mut size = MAX_SID_SIZE as u32;
    let created = unsafe {
        CreateWellKnownSid(
            WinBuiltinAdministratorsSid,
            std::ptr::null_mut(),
            sid.as_mut_ptr() as *mut c_void,
            &mut size,
        )
    };
    if created == 0 {
        return Err(IdentityError::last_os_error("CreateWellKnownSid"));
    }
    let mut member: BOOL = 0;
    if unsafe { CheckTokenMembership(0, sid.as_mut_ptr() as *mut c_void, &mut member) } == 0 {
        return Err(IdentityError::last_os_error("CheckTokenMembership"));
    }
    Ok(member != 0)
}

pub fn caller_identity() -> Result<CallerIdentity, IdentityError> {
    let process_token = token::open_process_token(unsafe { GetCurrentProcess() }, TOKEN_QUERY)?;
    let sid = token_sid(process_token.as_handle())?;
    let username = token::token_account(process_token.as_handle())?;
    Ok(CallerIdentity {
        username,
        is_local_system: sid.eq_ignore_ascii_case(LOCAL_SYSTEM_SID),
        is_admin: is_admin_member()?,
        sid,
    })
}

fn session_user_token(request: &TokenRequest) -> Result<OwnedHandle, IdentityError> {
    enable_privilege(Privilege::Tcb)?;
    let mut raw: HANDLE = 0;
    if unsafe { WTSQueryUserToken(request.session_id, &mut raw) } == 0 {
        let source = std::io::Error::last_os_error();
        debug!(session_id = request.session_id, "WTSQueryUserToken failed: {source}");
        return Err(IdentityError::NoSessionToken {
            account: request.account.clone(),
            session_id: request.session_id,
        });
    }
    owned_from_raw(raw).map_err(|source| IdentityError::Os {
        operation: "WTSQueryUserToken",
        source,
    })
}

/// Primary token for the interactive user described by `request`.
pub fn get_primary_token(request: &TokenRequest) -> Result<PrimaryToken, IdentityError> {
    let caller = caller_identity()?;
    let user_token = if caller.is_local_system {
        session_user_token(request)?
    } else {
        if let Err(err) = enable_privilege(Privilege::Debug) {
            debug!("continuing without SeDebugPrivilege: {err}");
        }
        shell::session_shell_token(request.session_id, &request.sid)?.ok_or_else(|| {
            IdentityError::NoSessionToken {
                account: request.account.clone(),
                session_id: request.session_id,
            }
        })?
    };

    if request.prefer_linked {
        match token::linked_token(user_token.as_handle())
            .and_then(|linked| token::duplicate_primary(linked.as_handle()))
        {
            Ok(primary) => return Ok(PrimaryToken::from_owned(primary)),
            Err(err) if request.allow_fallback_to_highest => {
                info!(
                    account = %request.account,
                    "linked token unavailable, using the highest available token: {err}"
                );
            }
            Err(err) => {
                debug!(account = %request.account, "linked token unavailable: {err}");
                return Err(IdentityError::LinkedTokenUnavailable {
                    account: request.account.clone(),
                });
            }
        }
    }
    token::duplicate_primary(user_token.as_handle()).map(PrimaryToken::from_owned)
}

/// Primary token of the caller's own, unelevated desktop shell.
pub fn get_unelevated_token() -> Result<PrimaryToken, IdentityError> {
    let caller = caller_identity()?;
    if caller.is_local_system {
        return Err(IdentityError::RunningAsLocalSystem);
    }
    if !caller.is_admin {
        return Err(IdentityError::AlreadyUnelevated);
    }
    let shell_token = shell::desktop_shell_token()?.ok_or(IdentityError::SidMismatch)?;
    if !token_sid(shell_token.as_handle())?.eq_ignore_ascii_case(&caller.sid) {
        return Err(IdentityError::SidMismatch);
    }
    if token_is_elevated(shell_token.as_handle())? {
        return Err(IdentityError::NotUnelevated);
    }
    token::duplicate_primary(shell_token.as_handle()).map(PrimaryToken::from_owned)
}
