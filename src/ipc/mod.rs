//! Control socket.
//!
//! The daemon listens on a Unix socket at `$RHKD_SOCKET_PATH`, else
//! `/tmp/rhkd_socket_<DISPLAY>`. Each connection carries one request.
//! Connection tasks forward requests to the daemon loop, which owns the
//! session and answers through a oneshot channel.

pub mod client;
pub mod codec;
mod connection;
mod handler;
pub mod protocol;

use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};

use crate::session::env::Environment;

pub use self::connection::{IpcCommand, Reply, spawn_connection};
pub use self::handler::handle_request;
use self::protocol::SOCKET_ENV;

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("another daemon is listening on {0}")]
    AlreadyRunning(PathBuf),
    #[error("failed to create directory {path}: {source}")]
    Mkdir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to bind socket {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `$RHKD_SOCKET_PATH`, else `/tmp/rhkd_socket_<DISPLAY>` with `_` for an
/// unset display.
pub fn socket_path(env: &impl Environment) -> PathBuf {
    env.non_empty(SOCKET_ENV).map(PathBuf::from).unwrap_or_else(|| {
        let display = env.non_empty("DISPLAY").unwrap_or_else(|| "_".to_string());
        PathBuf::from(format!("/tmp/rhkd_socket_{display}"))
    })
}

/// A listening control socket. The socket file is removed on drop.
#[derive(Debug)]
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcServer {
    /// Listen on `path`, replacing a stale socket left by a dead daemon.
    pub async fn bind(path: &Path) -> Result<Self, IpcError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|source| IpcError::Mkdir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let bind_error = |source: std::io::Error| IpcError::Bind {
            path: path.to_path_buf(),
            source,
        };
        let listener = match UnixListener::bind(path) {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                if UnixStream::connect(path).await.is_ok() {
                    return Err(IpcError::AlreadyRunning(path.to_path_buf()));
                }
                tracing::info!(path = %path.display(), "removing stale socket");
                std::fs::remove_file(path).map_err(bind_error)?;
                UnixListener::bind(path).map_err(bind_error)?
            }
            Err(e) => return Err(bind_error(e)),
        };
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub async fn accept(&self) -> std::io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "socket not removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio::sync::mpsc;

    use super::protocol::{BindRequest, Request, Response};
    use super::*;
    use crate::status::EventMask;

    #[test]
    fn socket_path_sources() {
        let env = HashMap::from([(SOCKET_ENV, "/run/rhkd.sock"), ("DISPLAY", ":0")]);
        assert_eq!(socket_path(&env), PathBuf::from("/run/rhkd.sock"));
        let env = HashMap::from([("DISPLAY", ":1")]);
        assert_eq!(socket_path(&env), PathBuf::from("/tmp/rhkd_socket_:1"));
        let env: HashMap<&str, &str> = HashMap::new();
        assert_eq!(socket_path(&env), PathBuf::from("/tmp/rhkd_socket__"));
    }

    #[tokio::test]
    async fn requests_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sock");
        let server = IpcServer::bind(&path).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel::<IpcCommand>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    stream = server.accept() => {
                        if let Ok(stream) = stream {
                            spawn_connection(stream, tx.clone());
                        }
                    }
                    Some(command) = rx.recv() => {
                        let reply = match command.request {
                            Request::Bind(bind) => Reply::Done(Response::Ok(bind.hotkey)),
                            Request::Unbind { hotkey } => Reply::Done(Response::Error(hotkey)),
                            Request::Subscribe(mask) => {
                                let (lines_tx, lines_rx) = mpsc::unbounded_channel();
                                let _ = lines_tx.send(format!("mask {}", mask.bits()));
                                let _ = lines_tx.send("BBegin chain".to_string());
                                Reply::Subscribed(lines_rx)
                            }
                        };
                        let _ = command.reply.send(reply);
                    }
                }
            }
        });

        let bind = Request::Bind(BindRequest {
            hotkey: "super + a".into(),
            command: "true".into(),
            ..BindRequest::default()
        });
        assert_eq!(
            client::request(&path, bind).await.unwrap(),
            Response::Ok("super + a".into())
        );
        let unbind = Request::Unbind {
            hotkey: "super + b".into(),
        };
        assert_eq!(
            client::request(&path, unbind).await.unwrap(),
            Response::Error("super + b".into())
        );

        let mut lines = client::subscribe(&path, EventMask::CHAIN | EventMask::TIMEOUT)
            .await
            .unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("mask 24"));
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("BBegin chain")
        );
        // The daemon side dropped its sender, so the stream ends.
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sock");
        // A bound then dropped std listener leaves the file behind.
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let server = IpcServer::bind(&path).await.unwrap();
        assert_eq!(server.path(), path);
        drop(server);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn live_socket_is_not_stolen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sock");
        let _server = IpcServer::bind(&path).await.unwrap();
        let err = IpcServer::bind(&path).await.unwrap_err();
        assert!(matches!(err, IpcError::AlreadyRunning(_)));
    }

    #[tokio::test]
    async fn missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/rhkd/sock");
        let server = IpcServer::bind(&path).await.unwrap();
        assert!(server.path().exists());
    }
}
