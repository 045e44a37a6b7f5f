use std::ffi::c_void;
use std::io;
use std::os::windows::io::BorrowedHandle;
use std::os::windows::io::OwnedHandle;

use depkit_utils_win32::borrowed_raw;
use depkit_utils_win32::owned_from_raw;
use depkit_utils_win32::owned_raw;
use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
use windows_sys::Win32::Foundation::WAIT_TIMEOUT;
use windows_sys::Win32::System::IO::CreateIoCompletionPort;
use windows_sys::Win32::System::IO::GetQueuedCompletionStatus;
use windows_sys::Win32::System::IO::OVERLAPPED;
use windows_sys::Win32::System::JobObjects::AssignProcessToJobObject;
use windows_sys::Win32::System::JobObjects::CreateJobObjectW;
use windows_sys::Win32::System::JobObjects::JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;
use windows_sys::Win32::System::JobObjects::JOBOBJECT_ASSOCIATE_COMPLETION_PORT;
use windows_sys::Win32::System::JobObjects::JOBOBJECT_EXTENDED_LIMIT_INFORMATION;
use windows_sys::Win32::System::JobObjects::JobObjectAssociateCompletionPortInformation;
use windows_sys::Win32::System::JobObjects::JobObjectExtendedLimitInformation;
use windows_sys::Win32::System::JobObjects::SetInformationJobObject;
use windows_sys::Win32::System::JobObjects::TerminateJobObject;
use windows_sys::Win32::System::Threading::WaitForSingleObject;

use crate::LaunchError;
use crate::wait::HandleWait;
use crate::wait::WaitDecision;
use crate::wait::WaitPolicy;
use crate::wait::handle_wait;
use crate::wait::is_completion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum JobWait {
    Completed,
    DeadlineReached,
}

/// A job object whose notifications arrive on its own completion port.
#[derive(Debug)]
pub(super) struct Job {
    job: OwnedHandle,
    port: OwnedHandle,
}

impl Job {
    pub(super) fn new(kill_on_close: bool) -> Result<Self, LaunchError> {
        let port = owned_from_raw(unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, 0, 0, 1) })
            .map_err(|source| LaunchError::Os {
                operation: "CreateIoCompletionPort",
                source,
            })?;
        let job = owned_from_raw(unsafe { CreateJobObjectW(std::ptr::null(), std::ptr::null()) })
            .map_err(|source| LaunchError::Os {
                operation: "CreateJobObjectW",
                source,
            })?;
        let job = Self { job, port };

        let association = JOBOBJECT_ASSOCIATE_COMPLETION_PORT {
            CompletionKey: job.key() as *mut c_void,
            CompletionPort: owned_raw(&job.port),
        };
        job.set_information(
            JobObjectAssociateCompletionPortInformation,
            &association,
            "associate job completion port",
        )?;

        if kill_on_close {
            let mut limits: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = unsafe { std::mem::zeroed() };
            limits.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;
            job.set_information(
                JobObjectExtendedLimitInformation,
                &limits,
                "set job kill-on-close limit",
            )?;
        }
        Ok(job)
    }

    fn key(&self) -> usize {
        owned_raw(&self.job) as usize
    }

    fn set_information<T>(
        &self,
        class: i32,
        info: &T,
        operation: &'static str,
    ) -> Result<(), LaunchError> {
        let ok = unsafe {
            SetInformationJobObject(
                owned_raw(&self.job),
                class,
                info as *const T as *const c_void,
                std::mem::size_of::<T>() as u32,
            )
        };
        if ok == 0 {
            return Err(LaunchError::last_os_error(operation));
        }
        Ok(())
    }

    pub(super) fn assign(&self, process: BorrowedHandle<'_>) -> Result<(), LaunchError> {
        if unsafe { AssignProcessToJobObject(owned_raw(&self.job), borrowed_raw(process)) } == 0 {
            return Err(LaunchError::last_os_error("AssignProcessToJobObject"));
        }
        Ok(())
    }

    /// Ends every process in the job with `exit_code`.
    pub(super) fn terminate(&self, exit_code: i32) -> Result<(), LaunchError> {
        if unsafe { TerminateJobObject(owned_raw(&self.job), exit_code as u32) } == 0 {
            return Err(LaunchError::last_os_error("TerminateJobObject"));
        }
        Ok(())
    }

    /// Blocks until the job reports completion or `policy` asks for
    /// termination.
    ///
    /// When `tracked` is false the process never made it into the job, so only
    /// its own handle is watched.
    pub(super) fn wait(
        &self,
        process: BorrowedHandle<'_>,
        launched_pid: u32,
        wait_for_children: bool,
        tracked: bool,
        policy: &mut WaitPolicy,
    ) -> Result<JobWait, LaunchError> {
        loop {
            if policy.check() == WaitDecision::Terminate {
                return Ok(JobWait::DeadlineReached);
            }
            let timeout_ms = policy.next_wait().as_millis().min(u128::from(u32::MAX)) as u32;

            if !tracked {
                let waited = unsafe { WaitForSingleObject(borrowed_raw(process), timeout_ms) };
                match handle_wait(waited) {
                    HandleWait::Signaled => return Ok(JobWait::Completed),
                    HandleWait::TimedOut => continue,
                    HandleWait::Failed => {
                        return Err(LaunchError::last_os_error("WaitForSingleObject"));
                    }
                }
            }

            let mut message: u32 = 0;
            let mut key: usize = 0;
            let mut overlapped: *mut OVERLAPPED = std::ptr::null_mut();
            let ok = unsafe {
                GetQueuedCompletionStatus(
                    owned_raw(&self.port),
                    &mut message,
                    &mut key,
                    &mut overlapped,
                    timeout_ms,
                )
            };
            if ok == 0 {
                let err = io::Error::last_os_error();
                if overlapped.is_null() && err.raw_os_error() != Some(WAIT_TIMEOUT as i32) {
                    return Err(LaunchError::Os {
                        operation: "GetQueuedCompletionStatus",
                        source: err,
                    });
                }
                continue;
            }
            if key != self.key() {
                continue;
            }
            // Job notifications carry the process id in the overlapped slot.
            let pid = overlapped as usize as u32;
            tracing::trace!(message, pid, "job notification");
            if is_completion(message, pid, launched_pid, wait_for_children) {
                return Ok(JobWait::Completed);
            }
        }
    }
}
