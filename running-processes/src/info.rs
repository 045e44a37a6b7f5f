use serde::Serialize;

/// A running process that matched a [`crate::ProcessDefinition`].
///
/// Only valid at the moment it was observed; the process may exit at any
/// time afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningProcessInfo {
    pub pid: u32,
    pub description: String,
    /// Resolved path of the executable.
    pub file_path: String,
    /// Arguments after the program itself.
    pub arguments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Image name without `.exe`.
    pub process_name: String,
}
