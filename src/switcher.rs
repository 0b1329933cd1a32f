//! Ties the command queue, workspace cache, reconciler and activation
//! resolver together behind the operations the UI layer calls.

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

pub mod activation;
pub mod reconciler;

use self::activation::{Activation, ActivationResolver, ActivationTarget};
use self::reconciler::WindowReconciler;
use crate::actor::command_queue::{CommandQueue, CommandRunner};
use crate::actor::frontmost::FrontmostPoller;
use crate::common::config::Config;
use crate::model::projects::{ProjectStore, ProjectsError, WorkspaceEntry};
use crate::model::server::{LiveWindow, WorkspaceData};
use crate::model::workspace_cache::WorkspacePathCache;
use crate::sys::dialog::{self, MainThread, PollSuppression};
use crate::sys::script;

/// Title Zed gives a window with no folder open.
pub const UNTITLED_TITLE: &str = "empty project";

/// Separates the project name from the active file in a window title.
pub const TITLE_SEPARATOR: &str = " — ";

static UNTITLED_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{} \((\d+)\)$", regex::escape(UNTITLED_TITLE)))
        .expect("untitled label pattern is valid")
});

pub fn untitled_label(index: usize) -> String { format!("{UNTITLED_TITLE} ({index})") }

pub fn parse_untitled_label(name: &str) -> Option<usize> {
    let captures = UNTITLED_LABEL.captures(name)?;
    captures[1].parse().ok().filter(|index| *index > 0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenOutcome {
    /// An existing window was raised.
    Raised,
    /// No window matched, so the editor was asked to open the path.
    Launched(PathBuf),
    /// No window matched and there was no path to open.
    NotFound,
}

pub struct Switcher {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    workspaces: WorkspacePathCache,
    reconciler: WindowReconciler,
    resolver: ActivationResolver,
    projects: ProjectStore,
    suppression: PollSuppression,
    main_thread: MainThread,
}

impl Switcher {
    /// Starts the command queue on the current runtime and warms the
    /// workspace cache. Dialogs are shown through `main_thread`.
    pub fn new(config: Config, main_thread: MainThread) -> Self {
        let queue = CommandQueue::spawn(config.timing.command_timeout());
        let switcher = Self::with_runner(config, Arc::new(queue), main_thread);
        switcher.workspaces.get_cached();
        switcher
    }

    pub fn with_runner(
        config: Config,
        runner: Arc<dyn CommandRunner>,
        main_thread: MainThread,
    ) -> Self {
        let workspaces = WorkspacePathCache::new(
            runner.clone(),
            script::workspace_paths_query(&config.paths.sqlite, &config.paths.workspace_db()),
            config.timing.workspace_cache_ttl(),
            config.timing.refresh_failure_backoff(),
        );
        let process_name = config.editor.process_name.clone();
        Self {
            reconciler: WindowReconciler::new(
                runner.clone(),
                workspaces.clone(),
                process_name.clone(),
            ),
            resolver: ActivationResolver::new(runner.clone(), process_name),
            projects: ProjectStore::new(config.paths.projects_file()),
            suppression: PollSuppression::new(),
            main_thread,
            workspaces,
            runner,
            config,
        }
    }

    /// Starts the frontmost-application poller; it runs until `cancel` fires.
    pub fn spawn_frontmost_poller(
        &self,
        cancel: CancellationToken,
    ) -> watch::Receiver<Option<String>> {
        let (poller, rx) = FrontmostPoller::new(
            self.runner.clone(),
            self.config.timing.frontmost_poll_interval(),
            self.suppression.clone(),
            cancel,
        );
        tokio::spawn(poller.run());
        rx
    }

    pub async fn list_windows(&self) -> Vec<LiveWindow> { self.reconciler.list_windows().await }

    /// Every workspace the editor remembers, sorted by name.
    pub async fn workspaces(&self) -> Vec<WorkspaceData> {
        let paths = self.workspaces.get_fresh().await;
        let mut workspaces: Vec<WorkspaceData> = paths
            .iter()
            .map(|(name, path)| WorkspaceData {
                display_name: name.clone(),
                path: path.clone(),
            })
            .collect();
        workspaces.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        workspaces
    }

    pub async fn get_projects(&self) -> Result<Vec<WorkspaceEntry>, ProjectsError> {
        Ok(self.projects.load(&self.workspaces).await?.entries)
    }

    pub async fn save_projects(&self, projects: &[WorkspaceEntry]) -> Result<(), ProjectsError> {
        self.projects.save(projects).await
    }

    /// Raises the target's window, or opens it in the editor when no window
    /// matches and a path is known.
    #[instrument(skip(self))]
    pub async fn open_project(&self, target: &ActivationTarget) -> OpenOutcome {
        if self.resolver.activate(target).await == Activation::Raised {
            return OpenOutcome::Raised;
        }

        let path = match target {
            ActivationTarget::Path(path) => Some(path.clone()),
            ActivationTarget::Name(name) => self.workspaces.get_cached().get(name).cloned(),
        };
        let Some(path) = path else {
            return OpenOutcome::NotFound;
        };

        match self.runner.run(script::open_in_editor(&self.config.editor.app_name, &path)).await {
            Ok(_) => {
                info!(path = %path.display(), "opened project in a new window");
                // The editor records the workspace on open; pick it up next read.
                self.workspaces.invalidate();
                OpenOutcome::Launched(path)
            }
            Err(err) => {
                warn!(%err, path = %path.display(), "failed to open project");
                OpenOutcome::NotFound
            }
        }
    }

    /// Opens the `index`-th (1-based) saved project. Bound to global
    /// shortcuts.
    pub async fn activate_nth(&self, index: usize) -> Result<OpenOutcome, ProjectsError> {
        let projects = self.get_projects().await?;
        let Some(entry) = index.checked_sub(1).and_then(|i| projects.get(i)) else {
            return Ok(OpenOutcome::NotFound);
        };
        let target = match &entry.path {
            Some(path) => ActivationTarget::Path(path.clone()),
            None => ActivationTarget::Name(entry.display_name.clone()),
        };
        Ok(self.open_project(&target).await)
    }

    /// Shows the folder picker with frontmost polling paused.
    pub async fn pick_folder(&self) -> Option<WorkspaceEntry> {
        dialog::pick_folder(
            &self.suppression,
            &self.main_thread,
            self.config.timing.dialog_timeout(),
        )
        .await
        .map(WorkspaceEntry::from_path)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::actor::command_queue::fake::FakeRunner;

    fn switcher(dir: &Path, runner: Arc<FakeRunner>) -> Switcher {
        let mut config = Config::default();
        config.paths.projects_file = Some(dir.join("projects.json"));
        config.paths.workspace_db = Some(dir.join("db.sqlite"));
        let (main_thread, _) = MainThread::channel();
        Switcher::with_runner(config, runner, main_thread)
    }

    #[test]
    fn untitled_labels_round_trip() {
        assert_eq!(untitled_label(3), "empty project (3)");
        assert_eq!(parse_untitled_label("empty project (3)"), Some(3));
        assert_eq!(parse_untitled_label("empty project (0)"), None);
        assert_eq!(parse_untitled_label("empty project"), None);
        assert_eq!(parse_untitled_label("my empty project (3)"), None);
    }

    #[tokio::test]
    async fn unmatched_path_is_opened_in_the_editor() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new(|command| match command.label {
            "raise-window" => Ok("false".to_string()),
            _ => Ok(String::new()),
        })
        .shared();
        let switcher = switcher(dir.path(), runner.clone());

        let outcome = switcher.open_project(&ActivationTarget::parse("/Users/x/bar")).await;

        assert_eq!(outcome, OpenOutcome::Launched(PathBuf::from("/Users/x/bar")));
        let open = runner.calls().into_iter().find(|c| c.label == "open-in-editor").unwrap();
        assert_eq!(open.args, vec!["-a", "Zed", "/Users/x/bar"]);
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new(|_| Ok("false".to_string())).shared();
        let switcher = switcher(dir.path(), runner.clone());

        let outcome = switcher.open_project(&ActivationTarget::Name("nope".into())).await;
        assert_eq!(outcome, OpenOutcome::NotFound);
        assert!(runner.calls().iter().all(|c| c.label != "open-in-editor"));
    }

    #[tokio::test]
    async fn nth_project_is_raised() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new(|command| match command.label {
            "raise-window" => Ok("true".to_string()),
            _ => Ok(String::new()),
        })
        .shared();
        let switcher = switcher(dir.path(), runner.clone());
        switcher
            .save_projects(&[
                WorkspaceEntry::from_path(PathBuf::from("/Users/x/foo")),
                WorkspaceEntry::from_path(PathBuf::from("/Users/x/bar")),
            ])
            .await
            .unwrap();

        assert_eq!(switcher.activate_nth(2).await.unwrap(), OpenOutcome::Raised);
        let script = runner.calls()[0].script().unwrap().to_string();
        assert!(script.contains(r#"t is "bar""#));

        assert_eq!(switcher.activate_nth(0).await.unwrap(), OpenOutcome::NotFound);
        assert_eq!(switcher.activate_nth(3).await.unwrap(), OpenOutcome::NotFound);
    }
}
