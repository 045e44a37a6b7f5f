use std::io;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to get the linked admin token for user [{account}]")]
    LinkedTokenUnavailable { account: String },

    #[error(
        "failed to retrieve a primary token for user [{account}]; ensure the user is logged on and has an active session"
    )]
    NoSessionToken { account: String, session_id: u32 },

    #[error("cannot retrieve an unelevated token when running as the local system account")]
    RunningAsLocalSystem,

    #[error("the current process is already running with an unelevated token")]
    AlreadyUnelevated,

    #[error("failed to retrieve an unelevated token for the calling account")]
    SidMismatch,

    #[error(
        "the calling account's shell is running elevated, therefore unable to get unelevated token"
    )]
    NotUnelevated,

    #[error("{privilege} is not held by the current process")]
    PrivilegeNotHeld { privilege: &'static str },

    #[error("{operation} failed: {source}")]
    Os {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("identity switching is not supported on this platform")]
    Unsupported,
}

impl IdentityError {
    #[cfg(windows)]
    pub(crate) fn last_os_error(operation: &'static str) -> Self {
        Self::Os {
            operation,
            source: io::Error::last_os_error(),
        }
    }
}
