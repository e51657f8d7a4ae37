//! The daemon's main loop. X11 events, signals, control socket requests
//! and the chain timeout all end up as calls on the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::UnixStream;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::Instant;

use crate::chain::TimerAction;
use crate::display::DisplayError;
use crate::ipc::{self, IpcCommand, IpcServer};
use crate::session::env::ProcessEnv;
use crate::session::{Bootstrapper, Session, SessionError, SessionOptions};
use crate::x11::X11Display;
use crate::x11::events::{self, DisplayEvent};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Display(#[from] DisplayError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("X11 event thread exited unexpectedly")]
    Disconnected,
}

struct Signals {
    reload: Signal,
    toggle_grab: Signal,
    hangup: Signal,
    interrupt: Signal,
    terminate: Signal,
}

impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            reload: signal(SignalKind::user_defined1())?,
            toggle_grab: signal(SignalKind::user_defined2())?,
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }
}

/// Run the daemon until a terminating signal arrives.
pub async fn run(options: SessionOptions) -> Result<(), DaemonError> {
    let mut boot = Bootstrapper::new();
    let session = boot.init_globals(&options, X11Display::connect, &ProcessEnv)?;
    session.grab()?;
    tracing::info!(
        config = %session.config_file().display(),
        extra_configs = session.extra_configs().len(),
        shell = session.shell(),
        pid = session.pid(),
        screen = session.display().screen_num(),
        hotkeys = session.hotkeys().len(),
        "hotkeys grabbed"
    );
    tracing::debug!(
        abort = %session.abort_chord(),
        locks = ?session.lock_masks(),
        "chain control"
    );

    let socket = ipc::socket_path(&ProcessEnv);
    let server = match IpcServer::bind(&socket).await {
        Ok(server) => {
            tracing::info!(path = %server.path().display(), "control socket listening");
            Some(server)
        }
        Err(e) => {
            tracing::warn!(error = %e, "control socket disabled");
            None
        }
    };
    let mut control = Control {
        server,
        requests: mpsc::unbounded_channel(),
    };

    let stop = Arc::new(AtomicBool::new(false));
    let (mut events, x11_thread) =
        events::spawn_event_thread(Arc::clone(session.display().conn()), Arc::clone(&stop))?;

    let result = match Signals::install() {
        Ok(mut signals) => event_loop(session, &mut events, &mut signals, &mut control).await,
        Err(e) => Err(e.into()),
    };

    stop.store(true, Ordering::Relaxed);
    if let Err(e) = session.ungrab() {
        tracing::warn!(error = %e, "ungrab on shutdown failed");
    }
    // Exits within one poll interval.
    if let Err(e) = x11_thread.join() {
        tracing::warn!("X11 event thread panicked: {e:?}");
    }
    drop(control);
    tracing::info!("daemon stopped");
    result
}

/// The control socket and the channel its connections report to.
struct Control {
    server: Option<IpcServer>,
    requests: (
        mpsc::UnboundedSender<IpcCommand>,
        UnboundedReceiver<IpcCommand>,
    ),
}

/// Next connection, or never when the socket is disabled.
async fn accept(server: Option<&IpcServer>) -> std::io::Result<UnixStream> {
    match server {
        Some(server) => server.accept().await,
        None => std::future::pending().await,
    }
}

async fn event_loop(
    session: &mut Session<X11Display>,
    events: &mut UnboundedReceiver<DisplayEvent>,
    signals: &mut Signals,
    control: &mut Control,
) -> Result<(), DaemonError> {
    let mut deadline: Option<Instant> = None;
    let (requests_tx, requests) = &mut control.requests;

    while session.is_running() {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::error!("X11 event thread died, shutting down");
                    return Err(DaemonError::Disconnected);
                };
                match event {
                    DisplayEvent::Key { keycode, state, event } => {
                        match session.process_key(keycode, state, event)? {
                            TimerAction::Arm => deadline = Some(Instant::now() + session.timeout()),
                            TimerAction::Cancel => deadline = None,
                            TimerAction::Keep => {}
                        }
                    }
                    DisplayEvent::MappingChanged => {
                        if session.refresh_mapping()? {
                            deadline = None;
                        }
                    }
                }
            }

            () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                session.chain_timeout();
            }

            stream = accept(control.server.as_ref()) => match stream {
                Ok(stream) => ipc::spawn_connection(stream, requests_tx.clone()),
                Err(e) => tracing::warn!(error = %e, "control socket accept failed"),
            },

            Some(command) = requests.recv() => {
                let reply = ipc::handle_request(session, command.request);
                if !session.is_chained() {
                    deadline = None;
                }
                // The connection may have gone away meanwhile.
                let _ = command.reply.send(reply);
            }

            _ = signals.reload.recv() => {
                tracing::info!(
                    chained = session.is_chained(),
                    locked = session.is_locked(),
                    "received SIGUSR1, reloading"
                );
                deadline = None;
                session.reload_cmd();
            }

            _ = signals.toggle_grab.recv() => {
                tracing::info!(grabbed = session.is_grabbed(), "received SIGUSR2, toggling grab");
                session.toggle_grab()?;
            }

            _ = signals.hangup.recv() => {
                tracing::info!("received SIGHUP, shutting down");
                session.stop();
            }

            _ = signals.interrupt.recv() => {
                tracing::info!("received SIGINT, shutting down");
                session.stop();
            }

            _ = signals.terminate.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                session.stop();
            }
        }
    }
    Ok(())
}
