use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::LaunchError;
use crate::LaunchRequest;
use crate::LaunchResult;

pub(crate) type ResultSender = oneshot::Sender<Result<LaunchResult, LaunchError>>;

/// A started process. The OS handles belong to the background waiter;
/// dropping this only stops listening for the result.
#[derive(Debug)]
pub struct LaunchHandle {
    pid: u32,
    module_path: PathBuf,
    request: Arc<LaunchRequest>,
    command_line: String,
    result: oneshot::Receiver<Result<LaunchResult, LaunchError>>,
}

impl LaunchHandle {
    pub(crate) fn new(
        pid: u32,
        module_path: PathBuf,
        request: Arc<LaunchRequest>,
        command_line: String,
    ) -> (Self, ResultSender) {
        let (tx, result) = oneshot::channel();
        let handle = Self {
            pid,
            module_path,
            request,
            command_line,
            result,
        };
        (handle, tx)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Path of the image the process is running.
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    pub fn request(&self) -> &Arc<LaunchRequest> {
        &self.request
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Resolves once the process (and, when requested, its children) exit.
    pub async fn wait(self) -> Result<LaunchResult, LaunchError> {
        self.result.await.map_err(|_| LaunchError::WaiterFailed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn wait_delivers_the_waiter_result() {
        let request = Arc::new(LaunchRequest::new("/bin/true"));
        let (handle, tx) = LaunchHandle::new(
            7,
            PathBuf::from("/bin/true"),
            Arc::clone(&request),
            "\"/bin/true\"".to_string(),
        );
        assert_eq!(handle.pid(), 7);
        assert_eq!(handle.command_line(), "\"/bin/true\"");
        tx.send(Ok(LaunchResult::from_exit_code(3)))
            .expect("receiver alive");
        assert_eq!(handle.wait().await.expect("result").exit_code, 3);
    }

    #[tokio::test]
    async fn a_vanished_waiter_is_an_error() {
        let (handle, tx) = LaunchHandle::new(
            1,
            PathBuf::new(),
            Arc::new(LaunchRequest::default()),
            String::new(),
        );
        drop(tx);
        assert!(matches!(handle.wait().await, Err(LaunchError::WaiterFailed)));
    }
}
