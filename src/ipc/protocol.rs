use serde::{Deserialize, Serialize};

use crate::model::projects::WorkspaceEntry;
use crate::model::server::{LiveWindow, WorkspaceData};
use crate::switcher::OpenOutcome;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub id: u64,
    pub request: Request,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    /// `None` when the request line could not be parsed.
    pub id: Option<u64>,
    pub response: Response,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Request {
    GetProjects,
    SaveProjects { projects: Vec<WorkspaceEntry> },
    ListWindows,
    ListWorkspaces,
    /// `target` is an absolute path or a window/project name.
    OpenProject { target: String },
    /// 1-based position in the saved project list.
    ActivateNth { index: usize },
    PickFolder,
    Frontmost,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Response {
    Projects { projects: Vec<WorkspaceEntry> },
    Saved,
    Windows { windows: Vec<LiveWindow> },
    Workspaces { workspaces: Vec<WorkspaceData> },
    Opened { outcome: OpenOutcome },
    Picked { project: Option<WorkspaceEntry> },
    Frontmost { application: Option<String> },
    Error { message: String },
}

impl Response {
    pub fn error(err: impl std::fmt::Display) -> Self {
        Response::Error { message: err.to_string() }
    }
}
