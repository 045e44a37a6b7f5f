use std::time::Duration;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

/// Upper bound on one blocking wait so cancellation is noticed promptly.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitDecision {
    Continue,
    /// Deadline passed or cancelled: end the process tree.
    Terminate,
    /// Deadline passed but termination was not wanted; keep waiting for a
    /// natural exit without a deadline.
    StopObserving,
}

/// Deadline and cancellation state for one waiter.
#[derive(Debug)]
pub(crate) struct WaitPolicy {
    deadline: Option<Instant>,
    cancel: CancellationToken,
    no_terminate: bool,
    observing: bool,
}

impl WaitPolicy {
    pub(crate) fn new(
        timeout: Option<Duration>,
        cancel: CancellationToken,
        no_terminate: bool,
    ) -> Self {
        Self {
            deadline: timeout.map(|timeout| Instant::now() + timeout),
            cancel,
            no_terminate,
            observing: true,
        }
    }

    pub(crate) fn check(&mut self) -> WaitDecision {
        if !self.observing {
            return WaitDecision::Continue;
        }
        let cancelled = self.cancel.is_cancelled();
        let expired = self
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline);
        if !(cancelled || expired) {
            return WaitDecision::Continue;
        }
        if self.no_terminate {
            tracing::info!(cancelled, "deadline reached; leaving the process running");
            self.observing = false;
            return WaitDecision::StopObserving;
        }
        tracing::info!(cancelled, "deadline reached; terminating the process tree");
        WaitDecision::Terminate
    }

    /// How long the next blocking wait may last.
    pub(crate) fn next_wait(&self) -> Duration {
        match self.deadline {
            Some(deadline) if self.observing => deadline
                .saturating_duration_since(Instant::now())
                .min(POLL_INTERVAL),
            _ => POLL_INTERVAL,
        }
    }
}

pub(crate) const JOB_MSG_ACTIVE_PROCESS_ZERO: u32 = 4;
pub(crate) const JOB_MSG_EXIT_PROCESS: u32 = 7;
pub(crate) const JOB_MSG_ABNORMAL_EXIT_PROCESS: u32 = 8;

/// Whether a job completion-port message ends the wait.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn is_completion(
    message: u32,
    pid: u32,
    launched_pid: u32,
    wait_for_children: bool,
) -> bool {
    match message {
        JOB_MSG_ACTIVE_PROCESS_ZERO => true,
        JOB_MSG_EXIT_PROCESS | JOB_MSG_ABNORMAL_EXIT_PROCESS => {
            !wait_for_children && pid == launched_pid
        }
        _ => false,
    }
}

pub(crate) const WAIT_OBJECT_0: u32 = 0;
pub(crate) const WAIT_TIMEOUT: u32 = 0x102;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleWait {
    Signaled,
    TimedOut,
    /// `WAIT_FAILED` or an unexpected result; the caller reads the OS error.
    Failed,
}

/// Classifies a `WaitForSingleObject` result on a process handle.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn handle_wait(result: u32) -> HandleWait {
    match result {
        WAIT_OBJECT_0 => HandleWait::Signaled,
        WAIT_TIMEOUT => HandleWait::TimedOut,
        _ => HandleWait::Failed,
    }
}
