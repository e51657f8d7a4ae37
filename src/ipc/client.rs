//! Client side of the control socket, used by `rhkc`.

use std::path::Path;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use super::codec::{CodecError, RequestCodec};
use super::protocol::{Request, Response};
use crate::status::EventMask;

/// Pauses between connection attempts while the daemon starts up.
const RETRY_DELAYS_MS: [u64; 10] = [10, 25, 50, 100, 125, 150, 200, 300, 400, 500];

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("can't connect to {path}: {source}")]
    Connect {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("reading reply: {0}")]
    Read(#[from] LinesCodecError),
    #[error("daemon closed the connection without replying")]
    NoReply,
    #[error("unexpected reply '{0}'")]
    Unexpected(String),
}

/// Connect to `path`, retrying for a couple of seconds.
pub async fn connect(path: &Path) -> Result<UnixStream, ClientError> {
    for (attempt, ms) in RETRY_DELAYS_MS.iter().enumerate() {
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(e) => tracing::debug!(
                path = %path.display(),
                attempt = attempt + 1,
                error = %e,
                "connect failed, retrying"
            ),
        }
        tokio::time::sleep(Duration::from_millis(*ms)).await;
    }
    UnixStream::connect(path)
        .await
        .map_err(|source| ClientError::Connect {
            path: path.display().to_string(),
            source,
        })
}

type Requests = FramedWrite<OwnedWriteHalf, RequestCodec>;
type Lines = FramedRead<OwnedReadHalf, LinesCodec>;

async fn send(path: &Path, request: Request) -> Result<(Requests, Lines), ClientError> {
    let (read, write) = connect(path).await?.into_split();
    let mut requests = FramedWrite::new(write, RequestCodec);
    requests.send(request).await?;
    Ok((requests, FramedRead::new(read, LinesCodec::new())))
}

/// Send a bind or unbind and wait for the daemon's answer.
pub async fn request(path: &Path, request: Request) -> Result<Response, ClientError> {
    let (_requests, mut lines) = send(path, request).await?;
    let line = lines.next().await.ok_or(ClientError::NoReply)??;
    Response::parse(&line).ok_or(ClientError::Unexpected(line))
}

/// Status lines from a subscription. The daemon ends a subscription whose
/// write half is shut down, so both halves live here.
pub struct Subscription {
    _requests: Requests,
    lines: Lines,
}

impl Subscription {
    /// The next line, or `None` once the daemon hangs up.
    pub async fn next_line(&mut self) -> Result<Option<String>, ClientError> {
        Ok(self.lines.next().await.transpose()?)
    }
}

pub async fn subscribe(path: &Path, mask: EventMask) -> Result<Subscription, ClientError> {
    let (requests, lines) = send(path, Request::Subscribe(mask)).await?;
    Ok(Subscription {
        _requests: requests,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_gives_up_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let err = connect(&dir.path().join("absent")).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
    }

    #[tokio::test]
    async fn connect_waits_for_the_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sock");
        let late = path.clone();
        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            let listener = tokio::net::UnixListener::bind(&late).unwrap();
            listener.accept().await.unwrap();
        });
        connect(&path).await.unwrap();
        server.await.unwrap();
    }
}
