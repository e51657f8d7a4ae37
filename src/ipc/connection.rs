//! Per-connection task: reads one request, hands it to the daemon loop and
//! writes back the reply. A subscription keeps the connection open and
//! streams status lines until either side goes away.

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;

use super::codec::{CodecError, RequestCodec};
use super::protocol::{Request, Response};

/// A request waiting for the daemon loop.
#[derive(Debug)]
pub struct IpcCommand {
    pub request: Request,
    pub reply: oneshot::Sender<Reply>,
}

/// The daemon loop's answer to an [`IpcCommand`].
#[derive(Debug)]
pub enum Reply {
    Done(Response),
    Subscribed(mpsc::UnboundedReceiver<String>),
}

#[derive(Debug, thiserror::Error)]
enum ConnectionError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("daemon loop closed")]
    DaemonGone,
    #[error("reply channel closed")]
    ReplyDropped,
}

/// Serve one client connection on its own task.
pub fn spawn_connection(stream: UnixStream, commands: mpsc::UnboundedSender<IpcCommand>) {
    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, commands).await {
            tracing::debug!(error = %e, "ipc connection closed");
        }
    });
}

async fn handle_connection(
    stream: UnixStream,
    commands: mpsc::UnboundedSender<IpcCommand>,
) -> Result<(), ConnectionError> {
    let mut framed = Framed::new(stream, RequestCodec);

    let request = match framed.next().await {
        Some(Ok(request)) => request,
        Some(Err(e)) => {
            let _ = framed.send(Response::Error(e.to_string()).line()).await;
            return Err(e.into());
        }
        None => return Ok(()),
    };
    tracing::debug!(?request, "ipc request");

    let (reply_tx, reply_rx) = oneshot::channel();
    commands
        .send(IpcCommand {
            request,
            reply: reply_tx,
        })
        .map_err(|_| ConnectionError::DaemonGone)?;

    match reply_rx.await.map_err(|_| ConnectionError::ReplyDropped)? {
        Reply::Done(response) => framed.send(response.line()).await?,
        Reply::Subscribed(mut lines) => loop {
            tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => framed.send(line).await?,
                    None => break,
                },
                frame = framed.next() => match frame {
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                },
            }
        },
    }
    Ok(())
}
