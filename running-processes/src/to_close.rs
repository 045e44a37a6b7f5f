use std::collections::HashSet;

use serde::Serialize;

use crate::ProcessToCloseError;
use crate::RunningProcessInfo;

/// What a caller shows when asking a user to close an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessToClose {
    name: String,
    path: String,
    description: String,
}

impl ProcessToClose {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl TryFrom<&RunningProcessInfo> for ProcessToClose {
    type Error = ProcessToCloseError;

    fn try_from(info: &RunningProcessInfo) -> Result<Self, Self::Error> {
        Ok(Self {
            name: non_blank("name", &info.process_name)?,
            path: non_blank("path", &info.file_path)?,
            description: non_blank("description", &info.description)?,
        })
    }
}

fn non_blank(field: &'static str, value: &str) -> Result<String, ProcessToCloseError> {
    if value.trim().is_empty() {
        return Err(ProcessToCloseError::BlankField { field });
    }
    Ok(value.to_string())
}

/// One entry per resolved path, keeping the first match's order.
pub fn processes_to_close(running: &[RunningProcessInfo]) -> Vec<ProcessToClose> {
    let mut seen = HashSet::new();
    running
        .iter()
        .filter(|info| seen.insert(info.file_path.to_lowercase()))
        .filter_map(|info| match ProcessToClose::try_from(info) {
            Ok(to_close) => Some(to_close),
            Err(err) => {
                tracing::debug!(pid = info.pid, "not offering process to close: {err}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info(pid: u32, path: &str, description: &str) -> RunningProcessInfo {
        RunningProcessInfo {
            pid,
            description: description.to_string(),
            file_path: path.to_string(),
            arguments: Vec::new(),
            username: None,
            process_name: "winword".to_string(),
        }
    }

    #[test]
    fn one_entry_per_path() {
        let running = vec![
            info(1, r"C:\Office\WINWORD.EXE", "Word"),
            info(2, r"C:\Office\winword.exe", "Word"),
            info(3, r"D:\Portable\winword.exe", "Word (portable)"),
        ];
        let to_close = processes_to_close(&running);
        let paths: Vec<&str> = to_close.iter().map(ProcessToClose::path).collect();
        assert_eq!(
            paths,
            vec![r"C:\Office\WINWORD.EXE", r"D:\Portable\winword.exe"]
        );
    }

    #[test]
    fn blank_fields_are_rejected() {
        let err = ProcessToClose::try_from(&info(1, r"C:\a.exe", " ")).expect_err("blank");
        assert_eq!(
            err,
            ProcessToCloseError::BlankField {
                field: "description"
            }
        );
        assert_eq!(
            err.to_string(),
            "the process description must not be blank"
        );
        assert_eq!(processes_to_close(&[info(1, "", "Word")]), Vec::new());
    }
}
