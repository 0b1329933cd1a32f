use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, info_span, warn};

use super::protocol::{Request, RequestEnvelope, Response, ResponseEnvelope};
use crate::switcher::Switcher;
use crate::switcher::activation::ActivationTarget;

/// Reads request lines from `input` until EOF and writes one response line
/// per request to `output`. Requests are handled concurrently, so responses
/// may come back out of order; match them up by `id`.
pub async fn serve<R, W>(
    switcher: Arc<Switcher>,
    frontmost: watch::Receiver<Option<String>>,
    input: R,
    mut output: W,
) -> io::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<ResponseEnvelope>();
    let mut tx = Some(tx);
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line(), if tx.is_some() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Some(tx) = &tx {
                        dispatch(&switcher, &frontmost, tx, &line);
                    }
                }
                None => {
                    debug!("request stream closed");
                    tx = None;
                }
            },
            reply = rx.recv() => match reply {
                Some(reply) => write_reply(&mut output, &reply).await?,
                None => break,
            },
        }
    }
    Ok(output)
}

fn dispatch(
    switcher: &Arc<Switcher>,
    frontmost: &watch::Receiver<Option<String>>,
    tx: &mpsc::UnboundedSender<ResponseEnvelope>,
    line: &str,
) {
    let envelope: RequestEnvelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(%err, "malformed request");
            _ = tx.send(ResponseEnvelope { id: None, response: Response::error(err) });
            return;
        }
    };

    let switcher = switcher.clone();
    let frontmost = frontmost.clone();
    let tx = tx.clone();
    let span = info_span!("request", id = envelope.id);
    tokio::spawn(
        async move {
            let response = handle(&switcher, &frontmost, envelope.request).await;
            _ = tx.send(ResponseEnvelope { id: Some(envelope.id), response });
        }
        .instrument(span),
    );
}

pub async fn handle(
    switcher: &Switcher,
    frontmost: &watch::Receiver<Option<String>>,
    request: Request,
) -> Response {
    debug!(?request);
    match request {
        Request::GetProjects => match switcher.get_projects().await {
            Ok(projects) => Response::Projects { projects },
            Err(err) => Response::error(err),
        },
        Request::SaveProjects { projects } => match switcher.save_projects(&projects).await {
            Ok(()) => Response::Saved,
            Err(err) => Response::error(err),
        },
        Request::ListWindows => Response::Windows { windows: switcher.list_windows().await },
        Request::ListWorkspaces => Response::Workspaces { workspaces: switcher.workspaces().await },
        Request::OpenProject { target } => Response::Opened {
            outcome: switcher.open_project(&ActivationTarget::parse(&target)).await,
        },
        Request::ActivateNth { index } => match switcher.activate_nth(index).await {
            Ok(outcome) => Response::Opened { outcome },
            Err(err) => Response::error(err),
        },
        Request::PickFolder => Response::Picked { project: switcher.pick_folder().await },
        Request::Frontmost => Response::Frontmost { application: frontmost.borrow().clone() },
    }
}

async fn write_reply<W: AsyncWrite + Unpin>(
    output: &mut W,
    reply: &ResponseEnvelope,
) -> io::Result<()> {
    let mut line = serde_json::to_vec(reply)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await
}
