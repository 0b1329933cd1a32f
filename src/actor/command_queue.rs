//! Serializes every external automation call.
//!
//! The macOS automation facility misbehaves when one process drives several
//! `osascript` invocations at once, and spawning a process per request from a
//! polling loop piles processes up. The queue actor runs exactly one command
//! at a time, in submission order, each under a hard timeout after which the
//! child is killed and the queue moves on.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time;
use tracing::{Instrument, debug, instrument, trace, warn};

use crate::actor;
use crate::sys::script::ExternalCommand;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{label} timed out after {timeout:?}")]
    Timeout { label: &'static str, timeout: Duration },
    #[error("{label} exited with status {status:?}: {stderr}")]
    ExternalFailure {
        label: &'static str,
        status: Option<i32>,
        stderr: String,
    },
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("command queue has shut down")]
    QueueClosed,
}

pub type CommandResult = Result<String, CommandError>;

/// Anything that can execute an [`ExternalCommand`] on behalf of a caller.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: ExternalCommand) -> BoxFuture<'static, CommandResult>;
}

#[derive(Debug)]
pub enum Event {
    Run {
        command: ExternalCommand,
        response: oneshot::Sender<CommandResult>,
    },
}

pub type Sender = actor::Sender<Event>;
pub type Receiver = actor::Receiver<Event>;

/// Handle to a running queue actor.
#[derive(Clone, Debug)]
pub struct CommandQueue {
    tx: Sender,
}

impl CommandQueue {
    /// Starts the queue actor on the current tokio runtime.
    pub fn spawn(timeout: Duration) -> Self {
        let (tx, rx) = actor::channel();
        tokio::spawn(CommandQueueActor::new(rx, timeout).run());
        Self { tx }
    }

    pub async fn submit(&self, command: ExternalCommand) -> CommandResult {
        let (response, rx) = oneshot::channel();
        if self.tx.try_send(Event::Run { command, response }).is_err() {
            return Err(CommandError::QueueClosed);
        }
        rx.await.unwrap_or(Err(CommandError::QueueClosed))
    }
}

impl CommandRunner for CommandQueue {
    fn run(&self, command: ExternalCommand) -> BoxFuture<'static, CommandResult> {
        let queue = self.clone();
        async move { queue.submit(command).await }.boxed()
    }
}

pub struct CommandQueueActor {
    rx: Receiver,
    timeout: Duration,
}

impl CommandQueueActor {
    pub fn new(rx: Receiver, timeout: Duration) -> Self { Self { rx, timeout } }

    pub async fn run(mut self) {
        while let Some((span, event)) = self.rx.recv().await {
            self.handle_event(event).instrument(span).await;
        }
        debug!("command queue stopped");
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Run { command, response } => {
                let result = self.execute(&command).await;
                if response.send(result).is_err() {
                    trace!(%command, "caller went away before the result arrived");
                }
            }
        }
    }

    #[instrument(skip_all, fields(label = command.label))]
    async fn execute(&self, command: &ExternalCommand) -> CommandResult {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let outcome = time::timeout(self.timeout, collect_output(&mut child)).await;
        let (status, stdout, stderr) = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CommandError::Spawn {
                    program: command.program.clone(),
                    source,
                });
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "external command timed out, killing it");
                if let Err(err) = child.kill().await {
                    warn!(%err, "failed to kill timed out command");
                }
                return Err(CommandError::Timeout {
                    label: command.label,
                    timeout: self.timeout,
                });
            }
        };

        if status.success() {
            trace!(bytes = stdout.len(), "external command succeeded");
            Ok(stdout.trim_end_matches(['\n', '\r']).to_string())
        } else {
            debug!(?status, %stderr, "external command failed");
            Err(CommandError::ExternalFailure {
                label: command.label,
                status: status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

async fn collect_output(child: &mut Child) -> io::Result<(ExitStatus, String, String)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, stdout, stderr) =
        tokio::join!(child.wait(), read_all(stdout), read_all(stderr));
    Ok((status?, stdout?, stderr?))
}

async fn read_all(pipe: Option<impl AsyncRead + Unpin>) -> io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::FutureExt;
    use futures::future::BoxFuture;
    use parking_lot::Mutex;

    use super::{CommandResult, CommandRunner};
    use crate::sys::script::ExternalCommand;

    type Responder = Box<dyn FnMut(&ExternalCommand) -> CommandResult + Send>;

    /// Records every command and answers from a closure.
    pub(crate) struct FakeRunner {
        responder: Mutex<Responder>,
        calls: Mutex<Vec<ExternalCommand>>,
        delay: Duration,
    }

    impl FakeRunner {
        pub(crate) fn new(
            responder: impl FnMut(&ExternalCommand) -> CommandResult + Send + 'static,
        ) -> Self {
            Self {
                responder: Mutex::new(Box::new(responder)),
                calls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn shared(self) -> Arc<Self> { Arc::new(self) }

        pub(crate) fn calls(&self) -> Vec<ExternalCommand> { self.calls.lock().clone() }

        pub(crate) fn call_count(&self) -> usize { self.calls.lock().len() }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, command: ExternalCommand) -> BoxFuture<'static, CommandResult> {
            let result = {
                let mut responder = self.responder.lock();
                (&mut **responder)(&command)
            };
            self.calls.lock().push(command);
            let delay = self.delay;
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            .boxed()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use futures::future::join_all;
    use pretty_assertions::assert_eq;

    use super::*;

    fn sh(label: &'static str, script: &str) -> ExternalCommand {
        ExternalCommand::new(label, "sh", ["-c", script])
    }

    #[test_log::test(tokio::test)]
    async fn returns_stdout_without_trailing_newline() {
        let queue = CommandQueue::spawn(DEFAULT_TIMEOUT);
        let output = queue.submit(sh("echo", "echo 'a, b'")).await.unwrap();
        assert_eq!(output, "a, b");
    }

    #[test_log::test(tokio::test)]
    async fn nonzero_exit_carries_stderr() {
        let queue = CommandQueue::spawn(DEFAULT_TIMEOUT);
        let err = queue.submit(sh("fail", "echo boom >&2; exit 3")).await.unwrap_err();
        match err {
            CommandError::ExternalFailure { label, status, stderr } => {
                assert_eq!(label, "fail");
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn missing_program_is_a_spawn_error() {
        let queue = CommandQueue::spawn(DEFAULT_TIMEOUT);
        let command = ExternalCommand::new("missing", "/nonexistent/zed-switcher-test", [""; 0]);
        let err = queue.submit(command).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }), "{err:?}");

        // The queue keeps serving after a failed spawn.
        assert_eq!(queue.submit(sh("after", "echo ok")).await.unwrap(), "ok");
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn runs_one_command_at_a_time_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("lock");
        let log = dir.path().join("log");
        let queue = CommandQueue::spawn(DEFAULT_TIMEOUT);

        let submissions = (0..8).map(|i| {
            let script = format!(
                "if [ -e '{lock}' ]; then echo overlap >> '{log}'; fi; \
                 touch '{lock}'; sleep 0.05; echo {i} >> '{log}'; rm '{lock}'",
                lock = lock.display(),
                log = log.display(),
            );
            queue.submit(sh("step", &script))
        });
        let results = join_all(submissions).await;
        assert!(results.iter().all(Result::is_ok), "{results:?}");

        let log = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines, vec!["0", "1", "2", "3", "4", "5", "6", "7"]);
    }

    #[test_log::test(tokio::test)]
    async fn stuck_command_is_killed_and_the_next_one_runs() {
        let queue = CommandQueue::spawn(Duration::from_millis(200));
        let started = Instant::now();

        let (stuck, next) = tokio::join!(
            queue.submit(sh("stuck", "exec sleep 30")),
            queue.submit(sh("next", "echo next")),
        );

        assert!(matches!(stuck, Err(CommandError::Timeout { label: "stuck", .. })));
        assert_eq!(next.unwrap(), "next");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test_log::test(tokio::test)]
    async fn dropped_handle_closes_the_queue() {
        let (tx, rx) = actor::channel::<Event>();
        drop(rx);
        let queue = CommandQueue { tx };
        let err = queue.submit(sh("closed", "true")).await.unwrap_err();
        assert!(matches!(err, CommandError::QueueClosed));
    }
}
