//! Turns the raw window title list into [`LiveWindow`]s joined against the
//! workspace path cache.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use super::{TITLE_SEPARATOR, UNTITLED_TITLE, untitled_label};
use crate::actor::command_queue::{CommandError, CommandRunner};
use crate::common::collections::HashSet;
use crate::model::server::LiveWindow;
use crate::model::workspace_cache::{WorkspacePathCache, WorkspacePaths};
use crate::sys::script::{self, PROCESS_NOT_RUNNING};

#[derive(Debug, Error)]
pub enum WindowQueryError {
    #[error("editor is not running")]
    NotRunning,
    #[error(transparent)]
    Command(CommandError),
}

impl From<CommandError> for WindowQueryError {
    fn from(err: CommandError) -> Self {
        let not_running = format!("({PROCESS_NOT_RUNNING})");
        match err {
            CommandError::ExternalFailure { ref stderr, .. } if stderr.contains(&not_running) => {
                WindowQueryError::NotRunning
            }
            err => WindowQueryError::Command(err),
        }
    }
}

pub struct WindowReconciler {
    runner: Arc<dyn CommandRunner>,
    workspaces: WorkspacePathCache,
    process_name: String,
}

impl WindowReconciler {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workspaces: WorkspacePathCache,
        process_name: String,
    ) -> Self {
        Self { runner, workspaces, process_name }
    }

    /// Lists the editor's open windows. Any failure, including the editor
    /// not running, reads as no windows.
    #[instrument(skip(self))]
    pub async fn list_windows(&self) -> Vec<LiveWindow> {
        let titles = match self.fetch_titles().await {
            Ok(titles) => titles,
            Err(WindowQueryError::NotRunning) => return Vec::new(),
            Err(err) => {
                debug!(%err, "window titles unavailable");
                return Vec::new();
            }
        };
        let workspaces = self.workspaces.get_cached();
        reconcile(&titles, &workspaces)
    }

    pub async fn fetch_titles(&self) -> Result<Vec<String>, WindowQueryError> {
        let output = self.runner.run(script::list_window_titles(&self.process_name)).await?;
        Ok(parse_titles(&output))
    }
}

/// Splits `osascript`'s rendering of a list of strings.
///
/// Titles that themselves contain `", "` are split too; the automation
/// facility gives no way to tell the difference.
pub fn parse_titles(output: &str) -> Vec<String> {
    output
        .split(", ")
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .collect()
}

/// The project a title belongs to: everything before the first separator.
pub fn project_name(title: &str) -> &str {
    title.split_once(TITLE_SEPARATOR).map_or(title, |(name, _)| name).trim()
}

/// Builds the window list in enumeration order.
///
/// Untitled windows are numbered by position in this call only; two calls
/// may number the same window differently if the enumeration order changes.
/// Several windows of the same project collapse into the first one.
pub fn reconcile(titles: &[String], workspaces: &WorkspacePaths) -> Vec<LiveWindow> {
    let mut windows = Vec::with_capacity(titles.len());
    let mut seen = HashSet::default();
    let mut untitled = 0;

    for title in titles {
        if title == UNTITLED_TITLE {
            untitled += 1;
            windows.push(LiveWindow {
                raw_title: title.clone(),
                name: untitled_label(untitled),
                path: None,
                untitled_index: Some(untitled),
            });
            continue;
        }

        let name = project_name(title);
        if !seen.insert(name.to_string()) {
            continue;
        }
        windows.push(LiveWindow {
            raw_title: title.clone(),
            name: name.to_string(),
            path: workspaces.get(name).cloned(),
            untitled_index: None,
        });
    }
    windows
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::actor::command_queue::fake::FakeRunner;
    use crate::sys::script::ExternalCommand;

    fn titles(raw: &[&str]) -> Vec<String> { raw.iter().map(|t| t.to_string()).collect() }

    fn workspaces(entries: &[(&str, &str)]) -> WorkspacePaths {
        entries.iter().map(|(name, path)| (name.to_string(), PathBuf::from(path))).collect()
    }

    #[test]
    fn splits_osascript_list_output() {
        assert_eq!(
            parse_titles("myapp — main.rs, empty project, other\n"),
            titles(&["myapp — main.rs", "empty project", "other"])
        );
        assert!(parse_titles("").is_empty());
    }

    #[test]
    fn project_name_drops_active_file_suffix() {
        assert_eq!(project_name("myapp — src — main.rs"), "myapp");
        assert_eq!(project_name("myapp"), "myapp");
    }

    #[test]
    fn collapses_projects_and_numbers_untitled_windows() {
        let windows = reconcile(
            &titles(&["myapp — main.rs", "myapp — lib.rs", "empty project", "empty project"]),
            &workspaces(&[("myapp", "/Users/x/myapp")]),
        );

        assert_eq!(windows, vec![
            LiveWindow {
                raw_title: "myapp — main.rs".into(),
                name: "myapp".into(),
                path: Some(PathBuf::from("/Users/x/myapp")),
                untitled_index: None,
            },
            LiveWindow {
                raw_title: "empty project".into(),
                name: "empty project (1)".into(),
                path: None,
                untitled_index: Some(1),
            },
            LiveWindow {
                raw_title: "empty project".into(),
                name: "empty project (2)".into(),
                path: None,
                untitled_index: Some(2),
            },
        ]);
    }

    #[test]
    fn unknown_project_has_no_path() {
        let windows = reconcile(&titles(&["scratch — notes.md"]), &WorkspacePaths::default());
        assert_eq!(windows[0].name, "scratch");
        assert_eq!(windows[0].path, None);
    }

    fn reconciler(runner: Arc<FakeRunner>) -> WindowReconciler {
        let cache = WorkspacePathCache::new(
            runner.clone(),
            ExternalCommand::new("workspace-paths", "sqlite3", ["db"]),
            std::time::Duration::from_secs(60),
            std::time::Duration::from_secs(5),
        );
        WindowReconciler::new(runner, cache, "zed".to_string())
    }

    #[test_log::test(tokio::test)]
    async fn editor_not_running_lists_nothing() {
        let runner = FakeRunner::new(|command| match command.label {
            "list-window-titles" => Err(CommandError::ExternalFailure {
                label: command.label,
                status: Some(1),
                stderr: "execution error: not running (-600)".to_string(),
            }),
            _ => Ok(String::new()),
        })
        .shared();
        let reconciler = reconciler(runner.clone());

        let err = reconciler.fetch_titles().await.unwrap_err();
        assert!(matches!(err, WindowQueryError::NotRunning));
        assert!(reconciler.list_windows().await.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn timeout_lists_nothing() {
        let runner = FakeRunner::new(|command| {
            Err(CommandError::Timeout {
                label: command.label,
                timeout: std::time::Duration::from_secs(3),
            })
        })
        .shared();
        assert!(reconciler(runner).list_windows().await.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn listing_uses_cached_paths_without_waiting() {
        let runner = FakeRunner::new(|command| match command.label {
            "list-window-titles" => Ok("myapp — main.rs".to_string()),
            _ => Ok("/Users/x/myapp".to_string()),
        })
        .with_delay(std::time::Duration::from_millis(20))
        .shared();
        let reconciler = reconciler(runner.clone());

        // The first listing starts the database refresh but doesn't wait.
        let first = reconciler.list_windows().await;
        assert_eq!(first[0].path, None);

        reconciler.workspaces.get_fresh().await;
        let second = reconciler.list_windows().await;
        assert_eq!(second[0].path, Some(PathBuf::from("/Users/x/myapp")));
    }
}
