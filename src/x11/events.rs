//! Event thread: polls the X11 connection and forwards key events.

use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::Mapping;
use x11rb::rust_connection::RustConnection;

use crate::hotkey::KeyEventKind;

/// Events the daemon acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Key {
        keycode: u8,
        state: u16,
        event: KeyEventKind,
    },
    /// The keyboard or modifier mapping changed.
    MappingChanged,
}

/// Keep key presses, key releases and keyboard mapping changes.
pub fn classify(event: &Event) -> Option<DisplayEvent> {
    match event {
        Event::KeyPress(e) => Some(DisplayEvent::Key {
            keycode: e.detail,
            state: u16::from(e.state),
            event: KeyEventKind::Press,
        }),
        Event::KeyRelease(e) => Some(DisplayEvent::Key {
            keycode: e.detail,
            state: u16::from(e.state),
            event: KeyEventKind::Release,
        }),
        Event::MappingNotify(e)
            if e.request == Mapping::KEYBOARD || e.request == Mapping::MODIFIER =>
        {
            Some(DisplayEvent::MappingChanged)
        }
        _ => None,
    }
}

/// Spawn a thread that polls the X11 connection for events.
///
/// Polls the connection fd with a 100ms timeout so the `stop` flag is
/// checked regularly. The channel closes when the thread exits.
pub fn spawn_event_thread(
    conn: Arc<RustConnection>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<(UnboundedReceiver<DisplayEvent>, JoinHandle<()>)> {
    let (tx, rx) = unbounded_channel();

    let handle = std::thread::Builder::new()
        .name("x11-events".into())
        .spawn(move || {
            let raw_fd = conn.stream().as_raw_fd();

            while !stop.load(Ordering::Relaxed) {
                // SAFETY: raw_fd is the X11 connection fd, valid while conn is alive.
                let borrowed = unsafe { BorrowedFd::borrow_raw(raw_fd) };
                let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];

                match poll(&mut fds, PollTimeout::from(100u16)) {
                    Ok(0) => continue,
                    Ok(_) => loop {
                        match conn.poll_for_event() {
                            Ok(Some(event)) => {
                                let Some(event) = classify(&event) else {
                                    continue;
                                };
                                if tx.send(event).is_err() {
                                    return;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                tracing::error!(error = %e, "X11 connection error");
                                return;
                            }
                        }
                    },
                    Err(nix::Error::EINTR) => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "poll error on X11 fd");
                        return;
                    }
                }
            }
        })?;

    Ok((rx, handle))
}
