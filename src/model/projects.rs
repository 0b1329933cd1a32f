//! The user's curated project list, stored as a JSON array.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::common::collections::HashSet;
use crate::model::workspace_cache::WorkspacePathCache;

#[derive(Debug, Error)]
pub enum ProjectsError {
    #[error("project list I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed project list {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEntry {
    pub path: Option<PathBuf>,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity<'a> {
    Path(&'a Path),
    Name(&'a str),
}

impl WorkspaceEntry {
    pub fn from_path(path: PathBuf) -> Self {
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path: Some(path), display_name, color: None }
    }

    pub fn identity(&self) -> Identity<'_> {
        match &self.path {
            Some(path) => Identity::Path(path),
            None => Identity::Name(&self.display_name),
        }
    }
}

/// On-disk element: the current shape, or the `{ "name": .. }` shape older
/// versions wrote.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Current(WorkspaceEntry),
    Legacy { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedProjects {
    pub entries: Vec<WorkspaceEntry>,
    /// Whether legacy entries were upgraded and written back.
    pub migrated: bool,
}

/// Handle to the project list file. Clones share one lock, which is held for
/// the whole of a load (including any migration write) and of a save, so a
/// save can never be overwritten by a migration that read the file earlier.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ProjectStore {
    pub fn new(path: PathBuf) -> Self { Self { path, lock: Arc::default() } }

    /// Loads the list, upgrading legacy entries by resolving their names
    /// against the workspace cache. An upgraded list is saved immediately so
    /// the migration only happens once.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn load(
        &self,
        workspaces: &WorkspacePathCache,
    ) -> Result<LoadedProjects, ProjectsError> {
        let _lock = self.lock.lock().await;
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no project list yet");
                return Ok(LoadedProjects { entries: Vec::new(), migrated: false });
            }
            Err(source) => return Err(self.io_error(source)),
        };
        if text.trim().is_empty() {
            return Ok(LoadedProjects { entries: Vec::new(), migrated: false });
        }

        let stored: Vec<StoredEntry> = serde_json::from_str(&text)
            .map_err(|source| ProjectsError::Json { path: self.path.clone(), source })?;

        if !stored.iter().any(|entry| matches!(entry, StoredEntry::Legacy { .. })) {
            let entries = stored
                .into_iter()
                .filter_map(|entry| match entry {
                    StoredEntry::Current(entry) => Some(entry),
                    StoredEntry::Legacy { .. } => None,
                })
                .collect();
            return Ok(LoadedProjects { entries, migrated: false });
        }

        let known = workspaces.get_fresh().await;
        let entries: Vec<WorkspaceEntry> = stored
            .into_iter()
            .map(|entry| match entry {
                StoredEntry::Current(entry) => entry,
                StoredEntry::Legacy { name } => WorkspaceEntry {
                    path: known.get(&name).cloned(),
                    display_name: name,
                    color: None,
                },
            })
            .collect();
        self.write(&entries).await?;
        info!(count = entries.len(), "upgraded legacy project list");
        Ok(LoadedProjects { entries, migrated: true })
    }

    /// Replaces the list. Entries sharing an identity with an earlier entry
    /// are dropped.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn save(&self, entries: &[WorkspaceEntry]) -> Result<(), ProjectsError> {
        let mut seen = HashSet::default();
        let unique: Vec<&WorkspaceEntry> =
            entries.iter().filter(|entry| seen.insert(entry.identity())).collect();
        if unique.len() < entries.len() {
            warn!(dropped = entries.len() - unique.len(), "dropped duplicate projects");
        }

        let _lock = self.lock.lock().await;
        self.write(&unique).await
    }

    async fn write<T: Serialize>(&self, entries: &[T]) -> Result<(), ProjectsError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|source| ProjectsError::Json { path: self.path.clone(), source })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| self.io_error(source))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(|source| self.io_error(source))?;
        fs::rename(&tmp, &self.path).await.map_err(|source| self.io_error(source))?;
        debug!(count = entries.len(), "project list saved");
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> ProjectsError {
        ProjectsError::Io { path: self.path.clone(), source }
    }
}
