use std::sync::LazyLock;

use regex_lite::Captures;
use regex_lite::Regex;

use crate::LaunchError;

static VARIABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"%([^%]+)%"));

fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        // Panic is ok thanks to `variable_regex_compiles` test.
        Err(err) => panic!("invalid regex pattern `{pattern}`: {err}"),
    }
}

/// An environment block with Windows' case-insensitive name lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Environment {
    vars: Vec<(String, String)>,
}

impl Environment {
    pub(crate) fn current() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub(crate) fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut env = Self::default();
        for (name, value) in pairs {
            env.set(name, value);
        }
        env
    }

    /// Parses `NAME=value` entries; entries without `=` past the first
    /// character are ignored.
    #[cfg_attr(not(windows), allow(dead_code))]
    pub(crate) fn from_entries<'a>(entries: impl IntoIterator<Item = &'a str>) -> Self {
        Self::from_pairs(entries.into_iter().filter_map(|entry| {
            // Per-drive entries like `=C:=C:\dir` keep their leading `=`.
            let split_at = entry.get(1..)?.find('=')? + 1;
            Some((entry[..split_at].to_string(), entry[split_at + 1..].to_string()))
        }))
    }

    pub(crate) fn set(&mut self, name: String, value: String) {
        match self
            .vars
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.vars.push((name, value)),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    #[cfg_attr(not(windows), allow(dead_code))]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Replaces every `%NAME%` in `text`.
    ///
    /// Fails on the first variable that is not defined, naming `account` in
    /// the error.
    pub(crate) fn expand(&self, text: &str, account: &str) -> Result<String, LaunchError> {
        let mut missing = None;
        let expanded = VARIABLE_REGEX.replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            match self.get(name) {
                Some(value) => value.to_string(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    caps[0].to_string()
                }
            }
        });
        match missing {
            Some(variable) => Err(LaunchError::UndefinedEnvironmentVariable {
                account: account.to_string(),
                variable,
            }),
            None => Ok(expanded.into_owned()),
        }
    }
}
