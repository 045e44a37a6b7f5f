use crate::CallerIdentity;
use crate::IdentityError;
use crate::PrimaryToken;
use crate::Privilege;
use crate::TokenRequest;

/// Reports the effective user; the SID uses the `S-1-22-1-<uid>` mapping
/// for unix accounts.
pub fn caller_identity() -> Result<CallerIdentity, IdentityError> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let uid = unsafe { libc::geteuid() };
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| uid.to_string());
    Ok(CallerIdentity {
        username,
        sid: format!("S-1-22-1-{uid}"),
        is_admin: uid == 0,
        is_local_system: false,
    })
}

pub fn get_primary_token(_request: &TokenRequest) -> Result<PrimaryToken, IdentityError> {
    Err(IdentityError::Unsupported)
}

pub fn get_unelevated_token() -> Result<PrimaryToken, IdentityError> {
    Err(IdentityError::Unsupported)
}

pub fn has_privilege(_privilege: Privilege) -> Result<bool, IdentityError> {
    Err(IdentityError::Unsupported)
}

pub fn enable_privilege(_privilege: Privilege) -> Result<(), IdentityError> {
    Err(IdentityError::Unsupported)
}
