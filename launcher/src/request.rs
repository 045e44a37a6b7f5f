use std::time::Duration;

use depkit_command_line::CommandLine;
use depkit_command_line::argv_to_command_line;
use encoding_rs::Encoding;
use encoding_rs::UTF_8;
use serde::Deserialize;
use serde::Serialize;

use crate::LaunchError;

/// Everything needed to start one process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchRequest {
    pub file_path: String,
    /// A single element is a pre-rendered argument string; more elements are
    /// quoted and joined.
    pub arguments: Vec<String>,
    pub working_directory: Option<String>,
    pub run_as_active_user: Option<RunAsActiveUser>,
    pub use_linked_admin_token: bool,
    pub use_highest_available_token: bool,
    pub use_unelevated_token: bool,
    pub inherit_environment_variables: bool,
    pub expand_environment_variables: bool,
    pub standard_input: Vec<String>,
    pub use_shell_execute: bool,
    pub verb: Option<String>,
    pub create_no_window: bool,
    pub window_style: Option<WindowStyle>,
    pub priority_class: Option<PriorityClass>,
    pub wait_for_child_processes: bool,
    pub kill_child_processes_with_parent: bool,
    /// WHATWG label used to decode captured output.
    pub stream_encoding: Option<String>,
    pub timeout_ms: Option<u64>,
    pub no_terminate_on_timeout: bool,
}

/// The interactive user to launch as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAsActiveUser {
    pub account: String,
    pub sid: String,
    pub session_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowStyle {
    Normal,
    Hidden,
    Minimized,
    Maximized,
}

impl WindowStyle {
    /// The `SW_*` show command.
    pub fn show_command(self) -> u16 {
        match self {
            WindowStyle::Hidden => 0,
            WindowStyle::Normal => 1,
            WindowStyle::Minimized => 2,
            WindowStyle::Maximized => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityClass {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    RealTime,
}

impl PriorityClass {
    /// The process creation flag for this class.
    pub fn creation_flag(self) -> u32 {
        match self {
            PriorityClass::Idle => 0x0000_0040,
            PriorityClass::BelowNormal => 0x0000_4000,
            PriorityClass::Normal => 0x0000_0020,
            PriorityClass::AboveNormal => 0x0000_8000,
            PriorityClass::High => 0x0000_0080,
            PriorityClass::RealTime => 0x0000_0100,
        }
    }

    /// The equivalent unix nice value.
    pub fn nice(self) -> i32 {
        match self {
            PriorityClass::Idle => 19,
            PriorityClass::BelowNormal => 10,
            PriorityClass::Normal => 0,
            PriorityClass::AboveNormal => -5,
            PriorityClass::High => -10,
            PriorityClass::RealTime => -20,
        }
    }
}

/// `C:\`, `C:` followed by a separator, `\dir` or `\\server`, or `/dir`.
pub(crate) fn is_rooted(path: &str) -> bool {
    let bytes = path.as_bytes();
    match bytes {
        [b'\\' | b'/', ..] => true,
        [drive, b':', ..] => drive.is_ascii_alphabetic(),
        _ => false,
    }
}

impl LaunchRequest {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    /// The file path with surrounding whitespace and quotes removed.
    pub fn normalized_file_path(&self) -> &str {
        self.file_path.trim().trim_matches('"')
    }

    pub fn normalized_working_directory(&self) -> Option<&str> {
        self.working_directory
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), LaunchError> {
        let path = self.normalized_file_path();
        if path.is_empty() {
            return Err(LaunchError::EmptyFilePath);
        }
        if !self.use_shell_execute && !path.starts_with('%') && !is_rooted(path) {
            return Err(LaunchError::RelativeFilePath {
                path: path.to_string(),
            });
        }
        self.encoding().map(|_| ())
    }

    pub fn encoding(&self) -> Result<&'static Encoding, LaunchError> {
        match self.stream_encoding.as_deref() {
            None => Ok(UTF_8),
            Some(label) => {
                Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
                    LaunchError::InvalidEncoding {
                        label: label.to_string(),
                    }
                })
            }
        }
    }

    /// Whether the linked or highest token was asked for.
    pub fn wants_elevated_token(&self) -> bool {
        self.use_linked_admin_token || self.use_highest_available_token
    }
}

/// Renders an argument list the way it is handed to process creation.
pub(crate) fn render_arguments(arguments: &[String]) -> Option<String> {
    match arguments {
        [] => None,
        [single] => {
            let single = single.trim();
            (!single.is_empty()).then(|| single.to_string())
        }
        many => argv_to_command_line(many).map(CommandLine::into_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_path_quotes_are_stripped() {
        let request = LaunchRequest::new("  \"C:\\Program Files\\App\\app.exe\" ");
        assert_eq!(
            request.normalized_file_path(),
            "C:\\Program Files\\App\\app.exe"
        );
        assert!(request.validate().is_ok());
    }

    #[test]
    fn relative_paths_need_shell_execute_or_a_variable() {
        let relative = LaunchRequest::new("notepad.exe");
        assert!(matches!(
            relative.validate(),
            Err(LaunchError::RelativeFilePath { path }) if path == "notepad.exe"
        ));

        let shell = LaunchRequest {
            use_shell_execute: true,
            ..LaunchRequest::new("notepad.exe")
        };
        assert!(shell.validate().is_ok());

        let variable = LaunchRequest::new("%SystemRoot%\\notepad.exe");
        assert!(variable.validate().is_ok());
    }

    #[test]
    fn blank_paths_are_rejected() {
        assert!(matches!(
            LaunchRequest::new(" \"\" ").validate(),
            Err(LaunchError::EmptyFilePath)
        ));
    }

    #[test]
    fn rooted_path_shapes() {
        for path in ["C:\\x", "c:/x", "\\\\server\\share", "\\dir", "/usr/bin/env"] {
            assert!(is_rooted(path), "{path}");
        }
        for path in ["x", "dir\\x", "1:\\x", ""] {
            assert!(!is_rooted(path), "{path}");
        }
    }

    #[test]
    fn unknown_encodings_are_rejected() {
        let request = LaunchRequest {
            stream_encoding: Some("no-such-encoding".to_string()),
            ..LaunchRequest::new("C:\\x.exe")
        };
        assert!(matches!(
            request.validate(),
            Err(LaunchError::InvalidEncoding { .. })
        ));

        let request = LaunchRequest {
            stream_encoding: Some("windows-1252".to_string()),
            ..LaunchRequest::new("C:\\x.exe")
        };
        assert_eq!(request.encoding().expect("known label").name(), "windows-1252");
    }

    #[test]
    fn single_argument_is_passed_verbatim() {
        let single = vec!["/S /D=C:\\Program Files\\App".to_string()];
        assert_eq!(
            render_arguments(&single).as_deref(),
            Some("/S /D=C:\\Program Files\\App")
        );

        let many = vec!["/S".to_string(), "C:\\Program Files\\App".to_string()];
        assert_eq!(
            render_arguments(&many).as_deref(),
            Some("/S \"C:\\Program Files\\App\"")
        );
        assert_eq!(render_arguments(&[]), None);
        assert_eq!(render_arguments(&["  ".to_string()]), None);
    }

    #[test]
    fn working_directory_blank_means_none() {
        let request = LaunchRequest {
            working_directory: Some("   ".to_string()),
            ..LaunchRequest::new("C:\\x.exe")
        };
        assert_eq!(request.normalized_working_directory(), None);
    }

    #[test]
    fn requests_deserialize_with_defaults() {
        let request: LaunchRequest = serde_json::from_str(
            r#"{"file_path":"C:\\x.exe","arguments":["-a"],"timeout_ms":500,"window_style":"Hidden"}"#,
        )
        .expect("valid request");
        assert_eq!(request.timeout(), Some(Duration::from_millis(500)));
        assert_eq!(request.window_style, Some(WindowStyle::Hidden));
        assert!(!request.use_shell_execute);
    }
}
