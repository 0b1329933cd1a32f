//! Raises the editor window belonging to a project.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{TITLE_SEPARATOR, UNTITLED_TITLE, parse_untitled_label};
use crate::actor::command_queue::CommandRunner;
use crate::model::server::LiveWindow;
use crate::sys::script;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ActivationTarget {
    Path(PathBuf),
    Name(String),
}

impl ActivationTarget {
    /// Absolute paths are paths; anything else is a window or project name.
    pub fn parse(raw: &str) -> Self {
        let path = Path::new(raw);
        if path.is_absolute() {
            ActivationTarget::Path(path.to_path_buf())
        } else {
            ActivationTarget::Name(raw.to_string())
        }
    }

    /// The window name to look for.
    pub fn candidate_name(&self) -> Option<String> {
        match self {
            ActivationTarget::Path(path) => {
                path.file_name().map(|name| name.to_string_lossy().into_owned())
            }
            ActivationTarget::Name(name) => Some(name.clone()),
        }
    }
}

impl From<&LiveWindow> for ActivationTarget {
    fn from(window: &LiveWindow) -> Self { ActivationTarget::Name(window.name.clone()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Raised,
    NoMatch,
}

pub struct ActivationResolver {
    runner: Arc<dyn CommandRunner>,
    process_name: String,
}

impl ActivationResolver {
    pub fn new(runner: Arc<dyn CommandRunner>, process_name: String) -> Self {
        Self { runner, process_name }
    }

    /// Raises the matching window. A target with no window, or a failed
    /// script, is a silent [`Activation::NoMatch`].
    #[instrument(skip(self))]
    pub async fn activate(&self, target: &ActivationTarget) -> Activation {
        let Some(name) = target.candidate_name() else {
            return Activation::NoMatch;
        };
        let command = match parse_untitled_label(&name) {
            Some(index) => {
                script::raise_nth_window_titled(&self.process_name, UNTITLED_TITLE, index)
            }
            None => script::raise_window_named(&self.process_name, &name, TITLE_SEPARATOR),
        };

        match self.runner.run(command).await {
            Ok(output) if script::was_raised(&output) => Activation::Raised,
            Ok(_) => {
                debug!(%name, "no window to activate");
                Activation::NoMatch
            }
            Err(err) => {
                debug!(%err, %name, "activation script failed");
                Activation::NoMatch
            }
        }
    }
}
