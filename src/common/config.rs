//! User configuration, read from `config.toml` in the platform config
//! directory. Every field has a default so an absent or partial file works.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const APP_DIR: &str = "zed-switcher";

pub fn config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub editor: EditorSettings,
    pub timing: TimingSettings,
    pub paths: PathSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EditorSettings {
    /// Application name passed to `open -a`.
    pub app_name: String,
    /// Process name as seen by `System Events`.
    pub process_name: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            app_name: "Zed".to_string(),
            process_name: "zed".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TimingSettings {
    pub command_timeout_ms: u64,
    pub workspace_cache_ttl_secs: u64,
    pub refresh_failure_backoff_secs: u64,
    pub frontmost_poll_interval_ms: u64,
    /// How long a modal dialog may keep frontmost polling paused.
    pub dialog_timeout_secs: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            command_timeout_ms: 3_000,
            workspace_cache_ttl_secs: 60,
            refresh_failure_backoff_secs: 5,
            frontmost_poll_interval_ms: 1_000,
            dialog_timeout_secs: 300,
        }
    }
}

impl TimingSettings {
    pub fn command_timeout(&self) -> Duration { Duration::from_millis(self.command_timeout_ms) }

    pub fn workspace_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.workspace_cache_ttl_secs)
    }

    pub fn refresh_failure_backoff(&self) -> Duration {
        Duration::from_secs(self.refresh_failure_backoff_secs)
    }

    pub fn frontmost_poll_interval(&self) -> Duration {
        Duration::from_millis(self.frontmost_poll_interval_ms.max(1))
    }

    pub fn dialog_timeout(&self) -> Duration { Duration::from_secs(self.dialog_timeout_secs) }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    pub workspace_db: Option<PathBuf>,
    pub projects_file: Option<PathBuf>,
    pub sqlite: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            workspace_db: None,
            projects_file: None,
            sqlite: "sqlite3".to_string(),
        }
    }
}

impl PathSettings {
    pub fn workspace_db(&self) -> PathBuf {
        self.workspace_db.clone().unwrap_or_else(|| {
            data_dir().join("Zed").join("db").join("0-stable").join("db.sqlite")
        })
    }

    pub fn projects_file(&self) -> PathBuf {
        self.projects_file
            .clone()
            .unwrap_or_else(|| data_dir().join(APP_DIR).join("projects.json"))
    }
}

fn data_dir() -> PathBuf { dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")) }

impl Config {
    pub fn parse(text: &str) -> anyhow::Result<Config> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Reads the configuration at `path`, falling back to defaults when the
    /// file does not exist.
    pub fn read(path: &Path) -> anyhow::Result<Config> {
        match fs::read_to_string(path) {
            Ok(text) => {
                Self::parse(&text).with_context(|| format!("in {}", path.display()))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        match path.map(Path::to_path_buf).or_else(config_file) {
            Some(path) => Self::read(&path),
            None => Ok(Config::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
        assert_eq!(
            Config::default().timing.command_timeout(),
            Duration::from_secs(3)
        );
        assert_eq!(
            Config::default().timing.workspace_cache_ttl(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [editor]
            process_name = "Zed Preview"

            [timing]
            command_timeout_ms = 500

            [paths]
            workspace_db = "/tmp/db.sqlite"
            "#,
        )
        .unwrap();

        assert_eq!(config.editor.process_name, "Zed Preview");
        assert_eq!(config.editor.app_name, "Zed");
        assert_eq!(config.timing.command_timeout(), Duration::from_millis(500));
        assert_eq!(config.timing.frontmost_poll_interval_ms, 1_000);
        assert_eq!(config.timing.dialog_timeout(), Duration::from_secs(300));
        assert_eq!(config.paths.workspace_db(), PathBuf::from("/tmp/db.sqlite"));
        assert_eq!(config.paths.sqlite, "sqlite3");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::parse("[timing]\npoll = 3\n").is_err());
    }

    #[test]
    fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::read(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
