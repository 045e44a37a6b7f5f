//! Resolution of the security identity a process is launched under.
//!
//! On Windows this obtains primary tokens for another interactive user
//! (through `WTSQueryUserToken` when running as local system, otherwise by
//! borrowing the token of that user's `explorer.exe`), the caller's own
//! unelevated shell token, and the privileges process creation needs.
//! Other platforms only report the caller's identity.

mod error;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use serde::Deserialize;
use serde::Serialize;
#[cfg(windows)]
use std::os::windows::io::AsHandle;
#[cfg(windows)]
use std::os::windows::io::BorrowedHandle;
#[cfg(windows)]
use std::os::windows::io::OwnedHandle;

pub use error::IdentityError;

#[cfg(unix)]
pub use unix::caller_identity;
#[cfg(unix)]
pub use unix::enable_privilege;
#[cfg(unix)]
pub use unix::get_primary_token;
#[cfg(unix)]
pub use unix::get_unelevated_token;
#[cfg(unix)]
pub use unix::has_privilege;
#[cfg(windows)]
pub use windows::caller_identity;
#[cfg(windows)]
pub use windows::enable_privilege;
#[cfg(windows)]
pub use windows::get_primary_token;
#[cfg(windows)]
pub use windows::get_unelevated_token;
#[cfg(windows)]
pub use windows::has_privilege;

/// SID of the local system account.
pub const LOCAL_SYSTEM_SID: &str = "S-1-5-18";

/// The interactive user a launch should run as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// `DOMAIN\user`, used in error messages.
    pub account: String,
    pub sid: String,
    pub session_id: u32,
    /// Follow the token's linked (elevated) counterpart.
    pub prefer_linked: bool,
    /// Use the plain token when no linked token exists instead of failing.
    pub allow_fallback_to_highest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub username: String,
    pub sid: String,
    pub is_admin: bool,
    pub is_local_system: bool,
}

impl CallerIdentity {
    /// Whether `sid` names a different account than the caller's.
    pub fn is_other_account(&self, sid: &str) -> bool {
        !self.sid.eq_ignore_ascii_case(sid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    AssignPrimaryToken,
    Debug,
    Impersonate,
    IncreaseQuota,
    Tcb,
}

impl Privilege {
    pub fn name(self) -> &'static str {
        match self {
            Privilege::AssignPrimaryToken => "SeAssignPrimaryTokenPrivilege",
            Privilege::Debug => "SeDebugPrivilege",
            Privilege::Impersonate => "SeImpersonatePrivilege",
            Privilege::IncreaseQuota => "SeIncreaseQuotaPrivilege",
            Privilege::Tcb => "SeTcbPrivilege",
        }
    }
}

/// A primary access token, closed exactly once when dropped.
#[derive(Debug)]
pub struct PrimaryToken {
    #[cfg(windows)]
    handle: OwnedHandle,
    #[cfg(not(windows))]
    _unconstructible: std::convert::Infallible,
}

#[cfg(windows)]
impl PrimaryToken {
    pub(crate) fn from_owned(handle: OwnedHandle) -> Self {
        Self { handle }
    }

    /// SID of the user the token belongs to.
    pub fn sid(&self) -> Result<String, IdentityError> {
        windows::token_sid(self.as_handle())
    }

    pub fn is_elevated(&self) -> Result<bool, IdentityError> {
        windows::token_is_elevated(self.as_handle())
    }
}

#[cfg(windows)]
impl AsHandle for PrimaryToken {
    fn as_handle(&self) -> BorrowedHandle<'_> {
        self.handle.as_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn other_account_comparison_ignores_case() {
        let caller = CallerIdentity {
            username: "CONTOSO\\admin".to_string(),
            sid: "S-1-5-21-1-2-3-500".to_string(),
            is_admin: true,
            is_local_system: false,
        };
        assert!(!caller.is_other_account("s-1-5-21-1-2-3-500"));
        assert!(caller.is_other_account("S-1-5-21-1-2-3-1001"));
    }

    #[test]
    fn privilege_names_match_the_lsa_constants() {
        assert_eq!(Privilege::Tcb.name(), "SeTcbPrivilege");
        assert_eq!(
            Privilege::AssignPrimaryToken.name(),
            "SeAssignPrimaryTokenPrivilege"
        );
    }
}
