use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One open editor window as seen by the switcher. Rebuilt on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveWindow {
    pub raw_title: String,
    /// Project name, or `empty project (N)` for untitled windows.
    pub name: String,
    pub path: Option<PathBuf>,
    /// Position among untitled windows in this query, starting at 1. Not
    /// stable across queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub untitled_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceData {
    pub display_name: String,
    pub path: PathBuf,
}
