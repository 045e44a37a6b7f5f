use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::ProcessSnapshot;
use crate::ProcessTable;

pub(crate) fn process(
    pid: u32,
    name: &str,
    exe: &str,
    command_line: Option<&str>,
) -> ProcessSnapshot {
    ProcessSnapshot {
        pid,
        name: name.to_string(),
        exe: Some(PathBuf::from(exe)),
        command_line: command_line.map(str::to_string),
        argv: Vec::new(),
        user: None,
    }
}

#[derive(Default)]
pub(crate) struct FakeTable {
    processes: Mutex<Vec<ProcessSnapshot>>,
    file_descriptions: HashMap<PathBuf, String>,
    process_descriptions: HashMap<u32, String>,
    command_lines: HashMap<u32, String>,
}

impl FakeTable {
    pub(crate) fn new(processes: Vec<ProcessSnapshot>) -> Self {
        Self {
            processes: Mutex::new(processes),
            ..Self::default()
        }
    }

    pub(crate) fn with_file_description(mut self, path: &str, description: &str) -> Self {
        self.file_descriptions
            .insert(PathBuf::from(path), description.to_string());
        self
    }

    pub(crate) fn with_process_description(mut self, pid: u32, description: &str) -> Self {
        self.process_descriptions
            .insert(pid, description.to_string());
        self
    }

    pub(crate) fn with_command_line(mut self, pid: u32, command_line: &str) -> Self {
        self.command_lines.insert(pid, command_line.to_string());
        self
    }

    pub(crate) fn replace(&self, processes: Vec<ProcessSnapshot>) {
        *self.processes.lock().unwrap_or_else(PoisonError::into_inner) = processes;
    }
}

impl ProcessTable for FakeTable {
    fn snapshot(&self) -> Vec<ProcessSnapshot> {
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn command_line(&self, pid: u32) -> Option<String> {
        self.command_lines.get(&pid).cloned()
    }

    fn file_description(&self, path: &Path) -> Option<String> {
        self.file_descriptions.get(path).cloned()
    }

    fn process_description(&self, pid: u32) -> Option<String> {
        self.process_descriptions.get(&pid).cloned()
    }
}
