use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use depkit_running_processes::DEFAULT_POLL_INTERVAL;
use depkit_running_processes::ProcessDefinition;
use dirs::home_dir;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "config.toml";

/// Contents of `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DepkitConfig {
    pub launch: LaunchDefaults,
    pub watch: WatchConfig,
}

/// Applied to every `launch` unless a flag overrides them.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchDefaults {
    pub stream_encoding: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub poll_interval_ms: Option<u64>,
    pub process: Vec<ProcessDefinition>,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis)
    }
}

impl DepkitConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `explicit` if given, otherwise `config.toml` in the depkit home
    /// when it exists.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = find_depkit_home()?.join(CONFIG_FILE);
                if !path.is_file() {
                    tracing::debug!(path = %path.display(), "no config file");
                    return Ok(Self::default());
                }
                path
            }
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// `$DEPKIT_HOME` when set, otherwise `~/.depkit`.
pub fn find_depkit_home() -> std::io::Result<PathBuf> {
    let env = std::env::var("DEPKIT_HOME")
        .ok()
        .filter(|value| !value.is_empty());
    find_depkit_home_from_env(env.as_deref())
}

fn find_depkit_home_from_env(env: Option<&str>) -> std::io::Result<PathBuf> {
    match env {
        Some(value) => {
            let path = PathBuf::from(value);
            if !path.is_dir() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("DEPKIT_HOME points to {value:?}, which is not a directory"),
                ));
            }
            Ok(path)
        }
        None => {
            let mut path = home_dir().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not find home directory",
                )
            })?;
            path.push(".depkit");
            Ok(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn empty_config_uses_defaults() {
        let config = DepkitConfig::parse("").expect("parse");
        assert_eq!(config.launch, LaunchDefaults::default());
        assert_eq!(config.watch.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(config.watch.process.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = DepkitConfig::parse(
            r#"
[launch]
stream_encoding = "windows-1252"
timeout_ms = 60000

[watch]
poll_interval_ms = 250

[[watch.process]]
name = "winword"
description = "Microsoft Word"

[[watch.process]]
name = 'C:\Program Files\App\app.exe'
"#,
        )
        .expect("parse");
        assert_eq!(
            config.launch,
            LaunchDefaults {
                stream_encoding: Some("windows-1252".to_string()),
                timeout_ms: Some(60_000),
            }
        );
        assert_eq!(config.watch.poll_interval(), Duration::from_millis(250));
        let names: Vec<&str> = config
            .watch
            .process
            .iter()
            .map(|definition| definition.name.as_str())
            .collect();
        assert_eq!(names, vec!["winword", r"C:\Program Files\App\app.exe"]);
        assert_eq!(
            config.watch.process[0].description.as_deref(),
            Some("Microsoft Word")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(DepkitConfig::parse("[launch]\ntimeout = 5\n").is_err());
    }

    #[test]
    fn explicit_paths_must_exist() {
        let dir = TempDir::new().expect("tempdir");
        let err = DepkitConfig::load(Some(&dir.path().join("missing.toml"))).expect_err("missing");
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn explicit_paths_are_loaded() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("depkit.toml");
        std::fs::write(&path, "[launch]\ntimeout_ms = 10\n").expect("write");
        let config = DepkitConfig::load(Some(&path)).expect("load");
        assert_eq!(config.launch.timeout_ms, Some(10));
    }

    #[test]
    fn home_override_must_be_a_directory() {
        let dir = TempDir::new().expect("tempdir");
        let home = dir.path().to_str().expect("utf-8 path");
        assert_eq!(
            find_depkit_home_from_env(Some(home)).expect("home"),
            dir.path().to_path_buf()
        );
        let missing = dir.path().join("missing");
        let missing = missing.to_str().expect("utf-8 path");
        assert!(find_depkit_home_from_env(Some(missing)).is_err());
    }
}
