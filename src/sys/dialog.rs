//! The native folder picker, the main-thread loop it is shown from, and the
//! flag that pauses frontmost-app polling while it is on screen.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, instrument, warn};

/// Shared switch that pauses the frontmost-application poller.
///
/// While a modal folder picker is open, "which app is frontmost" is
/// meaningless and polling it makes the switcher fight the dialog for focus.
#[derive(Clone, Debug, Default)]
pub struct PollSuppression(Arc<AtomicUsize>);

impl PollSuppression {
    pub fn new() -> Self { Self::default() }

    pub fn is_suppressed(&self) -> bool { self.0.load(Ordering::Acquire) > 0 }

    /// Suppresses polling until the returned guard is dropped.
    pub fn suppress(&self) -> SuppressionGuard {
        self.0.fetch_add(1, Ordering::AcqRel);
        SuppressionGuard(self.0.clone())
    }

    /// Runs `fut` with polling suppressed. The flag is cleared however the
    /// future ends, including when it is dropped part-way or panics.
    pub async fn while_suppressed<F: Future>(&self, fut: F) -> F::Output {
        let _guard = self.suppress();
        fut.await
    }
}

#[must_use = "polling resumes as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SuppressionGuard(Arc<AtomicUsize>);

impl Drop for SuppressionGuard {
    fn drop(&mut self) { self.0.fetch_sub(1, Ordering::AcqRel); }
}

type Job = Box<dyn FnOnce() + Send>;

/// Handle for running work on the process's main thread. AppKit only
/// presents panels from there, and the tokio runtime lives elsewhere.
#[derive(Clone, Debug)]
pub struct MainThread(crossbeam_channel::Sender<Job>);

/// The receiving end of [`MainThread`], driven by `main`.
pub struct MainThreadLoop(crossbeam_channel::Receiver<Job>);

impl MainThread {
    pub fn channel() -> (MainThread, MainThreadLoop) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (MainThread(tx), MainThreadLoop(rx))
    }

    /// Runs `f` on the main thread and waits for its result. Returns `None`
    /// if the loop has exited.
    pub async fn run<T: Send + 'static>(
        &self,
        f: impl FnOnce() -> T + Send + 'static,
    ) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            _ = tx.send(f());
        });
        self.0.send(job).ok()?;
        rx.await.ok()
    }
}

impl MainThreadLoop {
    /// Runs jobs in order until every [`MainThread`] handle is dropped.
    pub fn run(self) {
        for job in self.0 {
            job();
        }
        debug!("main thread loop finished");
    }
}

/// Shows a modal dialog on the main thread with polling suppressed. After
/// `timeout` the wait is abandoned and polling resumes, even if the dialog
/// is still open.
pub async fn show_modal<T: Send + 'static>(
    suppression: &PollSuppression,
    main: &MainThread,
    timeout: Duration,
    show: impl FnOnce() -> T + Send + 'static,
) -> Option<T> {
    match suppression.while_suppressed(time::timeout(timeout, main.run(show))).await {
        Ok(shown) => shown,
        Err(_) => {
            warn!(?timeout, "dialog still open, resuming polling");
            None
        }
    }
}

/// Shows the native folder picker. Returns `None` if the user cancels.
#[instrument(skip(suppression, main))]
pub async fn pick_folder(
    suppression: &PollSuppression,
    main: &MainThread,
    timeout: Duration,
) -> Option<PathBuf> {
    let path = show_modal(suppression, main, timeout, || {
        rfd::FileDialog::new().set_title("Add project").pick_folder()
    })
    .await
    .flatten();
    debug!(?path, "folder picker closed");
    path
}
