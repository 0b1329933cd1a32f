//! Maps workspace display names to their paths, read from Zed's workspace
//! history database.
//!
//! Reads never wait on the database unless asked to: [`WorkspacePathCache::get_cached`]
//! hands back whatever is held and kicks off a background refresh when the
//! mapping is older than the TTL. At most one refresh runs at a time; every
//! caller that needs one attaches to the refresh already in flight.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::actor::command_queue::{CommandError, CommandRunner};
use crate::common::collections::HashMap;
use crate::sys::script::ExternalCommand;

pub type WorkspacePaths = HashMap<String, PathBuf>;

type RefreshFuture = Shared<BoxFuture<'static, Arc<WorkspacePaths>>>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("unrecognized workspace query output: {0}")]
    Parse(String),
}

#[derive(Clone)]
pub struct WorkspacePathCache {
    inner: Arc<Inner>,
}

struct Inner {
    runner: Arc<dyn CommandRunner>,
    query: ExternalCommand,
    ttl: Duration,
    failure_backoff: Duration,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    paths: Arc<WorkspacePaths>,
    last_updated: Option<Instant>,
    last_failed: Option<Instant>,
    in_flight: Option<RefreshFuture>,
}

impl WorkspacePathCache {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        query: ExternalCommand,
        ttl: Duration,
        failure_backoff: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                query,
                ttl,
                failure_backoff,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Returns the current mapping without waiting. If it is stale, a
    /// refresh is started in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn get_cached(&self) -> Arc<WorkspacePaths> {
        let mut state = self.inner.state.lock();
        if self.inner.needs_refresh(&state) {
            self.refresh_locked(&mut state);
        }
        state.paths.clone()
    }

    /// Returns the mapping, waiting for a refresh first if it is stale.
    pub async fn get_fresh(&self) -> Arc<WorkspacePaths> {
        let refresh = {
            let mut state = self.inner.state.lock();
            if !self.inner.needs_refresh(&state) {
                return state.paths.clone();
            }
            self.refresh_locked(&mut state)
        };
        refresh.await
    }

    /// Marks the mapping stale so the next read refreshes it.
    pub fn invalidate(&self) {
        let mut state = self.inner.state.lock();
        state.last_updated = None;
        state.last_failed = None;
    }

    pub fn is_refreshing(&self) -> bool { self.inner.state.lock().in_flight.is_some() }

    fn refresh_locked(&self, state: &mut State) -> RefreshFuture {
        if let Some(refresh) = &state.in_flight {
            trace!("joining in-flight workspace refresh");
            return refresh.clone();
        }
        let inner = self.inner.clone();
        let refresh = async move { inner.refresh().await }.boxed().shared();
        state.in_flight = Some(refresh.clone());
        // Driven by its own task so it completes even if every waiter goes away.
        tokio::spawn(refresh.clone());
        refresh
    }
}

impl Inner {
    fn needs_refresh(&self, state: &State) -> bool {
        if state.in_flight.is_some() {
            return true;
        }
        if state.last_failed.is_some_and(|at| at.elapsed() < self.failure_backoff) {
            return false;
        }
        state.last_updated.is_none_or(|at| at.elapsed() > self.ttl)
    }

    #[instrument(skip_all)]
    async fn refresh(self: Arc<Self>) -> Arc<WorkspacePaths> {
        let result = self.runner.run(self.query.clone()).await;
        let parsed = result
            .map_err(CacheError::from)
            .and_then(|output| parse_workspace_paths(&output));

        let mut state = self.state.lock();
        state.in_flight = None;
        match parsed {
            Ok(paths) => {
                debug!(count = paths.len(), "workspace paths refreshed");
                state.paths = Arc::new(paths);
                state.last_updated = Some(Instant::now());
                state.last_failed = None;
            }
            Err(err) => {
                warn!(%err, "workspace refresh failed, keeping previous mapping");
                state.last_failed = Some(Instant::now());
            }
        }
        state.paths.clone()
    }
}

/// Parses newline-separated workspace paths, most recently used first. The
/// final path component is the display name, and the first path to claim a
/// name keeps it.
pub fn parse_workspace_paths(output: &str) -> Result<WorkspacePaths, CacheError> {
    let mut paths = WorkspacePaths::default();
    let mut saw_input = false;
    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        saw_input = true;
        let path = Path::new(line);
        let Some(name) = path.is_absolute().then(|| path.file_name()).flatten() else {
            trace!(line, "skipping non-path row");
            continue;
        };
        paths
            .entry(name.to_string_lossy().into_owned())
            .or_insert_with(|| path.to_path_buf());
    }
    if saw_input && paths.is_empty() {
        return Err(CacheError::Parse(output.chars().take(120).collect()));
    }
    Ok(paths)
}
