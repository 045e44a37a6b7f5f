use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

use sysinfo::ProcessRefreshKind;
use sysinfo::ProcessesToUpdate;
use sysinfo::System;
use sysinfo::Users;

/// What the OS reports about one process at snapshot time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    /// Image name as the OS reports it, with or without `.exe`.
    pub name: String,
    /// Resolved executable path; `None` when the process cannot be opened.
    pub exe: Option<PathBuf>,
    /// Raw command line, when the snapshot already carries it.
    pub command_line: Option<String>,
    /// Already split argument vector, used when no raw command line can be
    /// read.
    pub argv: Vec<String>,
    pub user: Option<String>,
}

/// Source of running processes and their descriptions.
pub trait ProcessTable: Send + Sync {
    fn snapshot(&self) -> Vec<ProcessSnapshot>;

    /// Raw command line read from the live process `pid`. Only asked for
    /// processes that are candidates for a match.
    fn command_line(&self, _pid: u32) -> Option<String> {
        None
    }

    /// Description embedded in the file at `path`, if any.
    fn file_description(&self, _path: &Path) -> Option<String> {
        None
    }

    /// Description read from the live process `pid`, if any.
    fn process_description(&self, _pid: u32) -> Option<String> {
        None
    }
}

/// [`ProcessTable`] over the host's process list.
pub struct SysinfoProcessTable {
    system: Mutex<System>,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn snapshot(&self) -> Vec<ProcessSnapshot> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
        let users = Users::new_with_refreshed_list();

        system
            .processes()
            .values()
            // Linux reports threads alongside processes.
            .filter(|process| process.thread_kind().is_none())
            .map(|process| ProcessSnapshot {
                pid: process.pid().as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                exe: process.exe().map(Path::to_path_buf),
                command_line: None,
                argv: process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect(),
                user: process
                    .user_id()
                    .and_then(|uid| users.get_user_by_id(uid))
                    .map(|user| user.name().to_string()),
            })
            .collect()
    }

    #[cfg(windows)]
    fn command_line(&self, pid: u32) -> Option<String> {
        match crate::windows::command_line(pid) {
            Ok(line) => Some(line).filter(|line| !line.trim().is_empty()),
            Err(err) => {
                tracing::trace!(pid, "command line unavailable: {err}");
                None
            }
        }
    }
}
