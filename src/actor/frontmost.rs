//! Polls which application is frontmost so the switcher can follow the
//! editor. Polls go through the command queue like every other script, and
//! are skipped entirely while [`PollSuppression`] is held.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::actor::command_queue::CommandRunner;
use crate::sys::dialog::PollSuppression;
use crate::sys::script;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

pub struct FrontmostPoller {
    runner: Arc<dyn CommandRunner>,
    interval: Duration,
    suppression: PollSuppression,
    tx: watch::Sender<Option<String>>,
    cancel: CancellationToken,
}

impl FrontmostPoller {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        interval: Duration,
        suppression: PollSuppression,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<Option<String>>) {
        let (tx, rx) = watch::channel(None);
        let poller = Self {
            runner,
            interval,
            suppression,
            tx,
            cancel,
        };
        (poller, rx)
    }

    pub async fn run(self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.suppression.is_suppressed() {
                        trace!("frontmost poll suppressed");
                        continue;
                    }
                    self.poll_once().await;
                }
            }
        }
        debug!("frontmost poller stopped");
    }

    async fn poll_once(&self) {
        let name = match self.runner.run(script::frontmost_application()).await {
            Ok(name) => Some(name.trim().to_string()).filter(|name| !name.is_empty()),
            Err(err) => {
                trace!(%err, "frontmost query failed");
                return;
            }
        };
        self.tx.send_if_modified(|current| {
            if *current == name {
                return false;
            }
            debug!(?name, "frontmost application changed");
            *current = name;
            true
        });
    }
}
