use std::io;

use depkit_identity::IdentityError;

use crate::identity_switch::IdentitySwitchUnavailable;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("the file path must not be empty")]
    EmptyFilePath,

    #[error(
        "the file path [{path}] is not rooted; provide a full path or enable shell execution"
    )]
    RelativeFilePath { path: String },

    #[error("the user [{account}] does not have environment variable [%{variable}%] defined or available")]
    UndefinedEnvironmentVariable { account: String, variable: String },

    #[error("unknown stream encoding [{label}]")]
    InvalidEncoding { label: String },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    IdentitySwitchUnavailable(#[from] IdentitySwitchUnavailable),

    #[error("failed to start [{path}]: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed: {source}")]
    Os {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("the process waiter stopped without reporting a result")]
    WaiterFailed,
}

impl LaunchError {
    #[cfg(windows)]
    pub(crate) fn last_os_error(operation: &'static str) -> Self {
        Self::Os {
            operation,
            source: io::Error::last_os_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn os_errors_carry_the_system_message() {
        let source = io::Error::from_raw_os_error(5);
        let system_message = source.to_string();
        let err = LaunchError::Os {
            operation: "AssignProcessToJobObject",
            source,
        };
        assert_eq!(
            err.to_string(),
            format!("AssignProcessToJobObject failed: {system_message}")
        );
        assert!(system_message.contains("os error 5"));
    }
}
