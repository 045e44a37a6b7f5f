use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::RunningProcessInfo;

/// Extra predicate a match must satisfy.
pub type ProcessFilter = Arc<dyn Fn(&RunningProcessInfo) -> bool + Send + Sync>;

/// One entry of a watch list.
///
/// `name` is either a bare image name such as `notepad` or `notepad.exe`,
/// matched against every running instance, or a rooted path matched against
/// the resolved executable path only. Both comparisons ignore case.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub filter: Option<ProcessFilter>,
}

impl ProcessDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            filter: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_filter(
        mut self,
        filter: impl Fn(&RunningProcessInfo) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub(crate) fn is_path(&self) -> bool {
        is_rooted(&self.name)
    }

    /// Lowercased image name without directory or `.exe`.
    pub(crate) fn image_stem(&self) -> String {
        image_stem(&self.name)
    }

    /// The configured description, ignoring blank values.
    pub(crate) fn explicit_description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .filter(|description| !description.trim().is_empty())
    }

    pub(crate) fn accepts(&self, info: &RunningProcessInfo) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(info))
    }
}

impl fmt::Debug for ProcessDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// `C:\`, `\dir`, `\\server` or `/dir`.
pub(crate) fn is_rooted(path: &str) -> bool {
    match path.as_bytes() {
        [b'\\' | b'/', ..] => true,
        [drive, b':', b'\\' | b'/', ..] => drive.is_ascii_alphabetic(),
        _ => false,
    }
}

pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// Strips a trailing `.exe` in any case.
pub(crate) fn strip_exe(name: &str) -> &str {
    let split = name.len().saturating_sub(4);
    match (name.get(..split), name.get(split..)) {
        (Some(stem), Some(extension)) if extension.eq_ignore_ascii_case(".exe") => stem,
        _ => name,
    }
}

pub(crate) fn image_stem(path: &str) -> String {
    strip_exe(file_name(path)).to_lowercase()
}

pub(crate) fn has_exe_extension(path: &str) -> bool {
    strip_exe(file_name(path)).len() != file_name(path).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn image_stems_ignore_directories_case_and_extension() {
        assert_eq!(image_stem(r"C:\Program Files\App\WinWord.EXE"), "winword");
        assert_eq!(image_stem("/usr/bin/sleep"), "sleep");
        assert_eq!(image_stem("notepad"), "notepad");
        assert_eq!(image_stem("setup.exe.config"), "setup.exe.config");
    }

    #[test]
    fn rooted_names_are_paths() {
        assert!(ProcessDefinition::new(r"C:\Tools\app.exe").is_path());
        assert!(ProcessDefinition::new(r"\\server\share\app.exe").is_path());
        assert!(ProcessDefinition::new("/usr/bin/app").is_path());
        assert!(!ProcessDefinition::new("app.exe").is_path());
        assert!(!ProcessDefinition::new("C:app.exe").is_path());
    }

    #[test]
    fn blank_descriptions_are_ignored() {
        let definition = ProcessDefinition::new("app").with_description("  ");
        assert_eq!(definition.explicit_description(), None);
        let definition = ProcessDefinition::new("app").with_description("App");
        assert_eq!(definition.explicit_description(), Some("App"));
    }

    #[test]
    fn definitions_deserialize_without_a_filter() {
        let definition: ProcessDefinition =
            serde_json::from_str(r#"{"name":"winword","description":"Microsoft Word"}"#)
                .expect("deserialize");
        assert_eq!(definition.name, "winword");
        assert_eq!(definition.description.as_deref(), Some("Microsoft Word"));
        assert!(definition.filter.is_none());
    }
}
