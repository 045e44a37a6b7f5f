use std::fmt;

use crate::CommandLineError;
use crate::parse::command_line_to_argv;

/// A rendered command line carrying its trailing NUL sentinel.
///
/// The sentinel is only visible through [`CommandLine::as_nul_terminated`]
/// and [`CommandLine::to_wide_nul`], which hand the text to native process
/// creation APIs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CommandLine {
    text: String,
}

impl CommandLine {
    pub fn new(text: impl Into<String>) -> Self {
        let mut text = text.into();
        text.retain(|ch| ch != '\0');
        text.push('\0');
        Self { text }
    }

    /// `"path" arguments`, the form passed to process creation.
    pub fn for_executable(path: &str, arguments: Option<&str>) -> Self {
        let path = path.trim_matches('"');
        match arguments.map(str::trim).filter(|args| !args.is_empty()) {
            Some(arguments) => Self::new(format!("\"{path}\" {arguments}")),
            None => Self::new(format!("\"{path}\"")),
        }
    }

    pub fn as_str(&self) -> &str {
        self.text.strip_suffix('\0').unwrap_or(&self.text)
    }

    pub fn as_nul_terminated(&self) -> &str {
        &self.text
    }

    pub fn to_wide_nul(&self) -> Vec<u16> {
        self.text.encode_utf16().collect()
    }

    pub fn into_string(mut self) -> String {
        self.text.pop();
        self.text
    }

    pub fn to_argv(&self) -> Result<Vec<String>, CommandLineError> {
        command_line_to_argv(self.as_str())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandLine").field(&self.as_str()).finish()
    }
}

impl AsRef<str> for CommandLine {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sentinel_is_hidden_from_display() {
        let line = CommandLine::new("a\0 b");
        assert_eq!(line.as_str(), "a b");
        assert_eq!(line.to_string(), "a b");
        assert_eq!(line.as_nul_terminated(), "a b\0");
        assert_eq!(line.to_wide_nul().last(), Some(&0));
        assert_eq!(line.into_string(), "a b");
    }

    #[test]
    fn executable_form_quotes_the_path_once() {
        let line = CommandLine::for_executable("\"C:\\Program Files\\app.exe\"", Some(" -x 1 "));
        assert_eq!(line.as_str(), "\"C:\\Program Files\\app.exe\" -x 1");
        assert_eq!(
            line.to_argv().expect("argv"),
            vec!["C:\\Program Files\\app.exe", "-x", "1"]
        );

        let bare = CommandLine::for_executable("/bin/true", Some("  "));
        assert_eq!(bare.as_str(), "\"/bin/true\"");
    }
}
