//! Choosing the Win32 entry point for token-based process creation.
//!
//! `CreateProcessAsUserW` is preferred: it can inherit handles and break away
//! from the caller's job. `CreateProcessWithTokenW` is the fallback when the
//! caller lacks the privileges `CreateProcessAsUserW` needs.

use std::fmt;

use depkit_identity::Privilege;

/// Why one of the two entry points cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocker {
    MissingPrivilege(Privilege),
    JobBreakawayNotPermitted,
    SecondaryLogonNotFound,
    SecondaryLogonDisabled,
    InheritedHandlesRequired,
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blocker::MissingPrivilege(privilege) => write!(
                f,
                "The calling process does not have the necessary {} privilege.",
                privilege.name()
            ),
            Blocker::JobBreakawayNotPermitted => {
                f.write_str("The calling process is part of a job that does not allow breakaway.")
            }
            Blocker::SecondaryLogonNotFound => f.write_str(
                "The system's Secondary Log-on service (seclogon) could not be found.",
            ),
            Blocker::SecondaryLogonDisabled => {
                f.write_str("The system's Secondary Log-on service (seclogon) is disabled.")
            }
            Blocker::InheritedHandlesRequired => f.write_str(
                "The launch passes standard handles to the process, which cannot be inherited this way.",
            ),
        }
    }
}

/// Every reason token-based creation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySwitchUnavailable {
    pub as_user: Option<Blocker>,
    pub with_token: Option<Blocker>,
}

impl fmt::Display for IdentitySwitchUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unable to create a new process via token.")?;
        if let Some(reason) = &self.as_user {
            write!(f, " CreateProcessAsUser() reason: {reason}")?;
        }
        if let Some(reason) = &self.with_token {
            write!(f, " CreateProcessWithToken() reason: {reason}")?;
        }
        Ok(())
    }
}

impl std::error::Error for IdentitySwitchUnavailable {}

/// What was observed about the caller before creating the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePreconditions {
    /// `SeIncreaseQuotaPrivilege`, `SeAssignPrimaryTokenPrivilege` and job
    /// breakaway, in that order.
    pub as_user: Result<(), Blocker>,
    /// `SeImpersonatePrivilege` and the seclogon service.
    pub with_token: Result<(), Blocker>,
    /// The token belongs to a different account than the caller.
    pub other_account: bool,
    pub holds_tcb: bool,
    /// Standard handles must be inherited by the child.
    pub inherits_handles: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breakaway {
    None,
    /// `CREATE_BREAKAWAY_FROM_JOB`.
    Request,
    /// The extended force-breakaway creation flag, which needs `SeTcbPrivilege`.
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationRoute {
    AsUser { breakaway: Breakaway },
    WithToken,
}

pub fn choose_creation_route(
    pre: &RoutePreconditions,
) -> Result<CreationRoute, IdentitySwitchUnavailable> {
    match pre.as_user {
        Ok(()) => {
            let breakaway = if pre.other_account {
                Breakaway::Request
            } else {
                Breakaway::None
            };
            return Ok(CreationRoute::AsUser { breakaway });
        }
        Err(Blocker::JobBreakawayNotPermitted) if !pre.other_account => {
            return Ok(CreationRoute::AsUser {
                breakaway: Breakaway::None,
            });
        }
        Err(Blocker::JobBreakawayNotPermitted) => {
            if pre.holds_tcb {
                return Ok(CreationRoute::AsUser {
                    breakaway: Breakaway::Force,
                });
            }
            return Err(IdentitySwitchUnavailable {
                as_user: Some(Blocker::MissingPrivilege(Privilege::Tcb)),
                with_token: None,
            });
        }
        Err(_) => {}
    }

    match pre.with_token {
        Ok(()) if !pre.inherits_handles => Ok(CreationRoute::WithToken),
        Ok(()) => Err(IdentitySwitchUnavailable {
            as_user: pre.as_user.err(),
            with_token: Some(Blocker::InheritedHandlesRequired),
        }),
        Err(blocker) => Err(IdentitySwitchUnavailable {
            as_user: pre.as_user.err(),
            with_token: Some(blocker),
        }),
    }
}
