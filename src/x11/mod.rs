//! `x11rb` implementation of [`Display`].
//!
//! Keys are grabbed on the root window in synchronous keyboard mode: the
//! server freezes the keyboard after each grabbed event until
//! `AllowEvents` says whether to replay it to the focused client. Consumed
//! events are released with `SyncKeyboard` so the grab stays frozen for
//! the next key.

pub mod events;

use std::sync::Arc;

use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::{self, Allow, GrabMode, ModMask, Window};
use x11rb::rust_connection::RustConnection;

use crate::display::{AllowMode, Display, DisplayError, KeyboardMapping, ModifierMapping};

/// `AnyKey` for `UngrabKey`.
const ANY_KEY: u8 = 0;

/// Connection to the X server and the root window of its screen.
pub struct X11Display {
    conn: Arc<RustConnection>,
    screen_num: usize,
    root: Window,
}

impl X11Display {
    /// Connect to `$DISPLAY`.
    pub fn connect() -> Result<Self, DisplayError> {
        let (conn, screen_num) =
            RustConnection::connect(None).map_err(|e| DisplayError::Connect(e.to_string()))?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or(DisplayError::NoScreen(screen_num))?
            .root;
        tracing::debug!(screen = screen_num, root, "connected to X11 display");

        Ok(Self {
            conn: Arc::new(conn),
            screen_num,
            root,
        })
    }

    /// Shared connection for the event thread.
    pub fn conn(&self) -> &Arc<RustConnection> {
        &self.conn
    }

    pub fn screen_num(&self) -> usize {
        self.screen_num
    }
}

fn protocol(what: &str, e: impl std::fmt::Display) -> DisplayError {
    DisplayError::Protocol(format!("{what}: {e}"))
}

impl Display for X11Display {
    fn keyboard_mapping(&self) -> Result<KeyboardMapping, DisplayError> {
        let setup = self.conn.setup();
        let min_keycode = setup.min_keycode;
        let count = setup.max_keycode - min_keycode + 1;

        let reply = xproto::get_keyboard_mapping(&*self.conn, min_keycode, count)
            .map_err(|e| protocol("get_keyboard_mapping", e))?
            .reply()
            .map_err(|e| protocol("get_keyboard_mapping reply", e))?;

        Ok(KeyboardMapping {
            min_keycode,
            keysyms_per_keycode: usize::from(reply.keysyms_per_keycode),
            keysyms: reply.keysyms,
        })
    }

    fn modifier_mapping(&self) -> Result<ModifierMapping, DisplayError> {
        let reply = xproto::get_modifier_mapping(&*self.conn)
            .map_err(|e| protocol("get_modifier_mapping", e))?
            .reply()
            .map_err(|e| protocol("get_modifier_mapping reply", e))?;

        Ok(ModifierMapping {
            keycodes_per_modifier: usize::from(reply.keycodes_per_modifier()),
            keycodes: reply.keycodes,
        })
    }

    fn grab_key(&self, keycode: u8, modifiers: u16) -> Result<bool, DisplayError> {
        let cookie = xproto::grab_key(
            &*self.conn,
            true,
            self.root,
            ModMask::from(modifiers),
            keycode,
            GrabMode::ASYNC,
            GrabMode::SYNC,
        )
        .map_err(|e| protocol("grab_key", e))?;

        match cookie.check() {
            Ok(()) => Ok(true),
            Err(ReplyError::X11Error(e)) => {
                tracing::debug!(keycode, modifiers, error = ?e, "grab_key refused");
                Ok(false)
            }
            Err(e) => Err(protocol("grab_key", e)),
        }
    }

    fn ungrab_all(&self) -> Result<(), DisplayError> {
        xproto::ungrab_key(&*self.conn, ANY_KEY, self.root, ModMask::ANY)
            .map_err(|e| protocol("ungrab_key", e))?;
        Ok(())
    }

    fn allow_events(&self, mode: AllowMode) -> Result<(), DisplayError> {
        let allow = match mode {
            AllowMode::Replay => Allow::REPLAY_KEYBOARD,
            AllowMode::Sync => Allow::SYNC_KEYBOARD,
        };
        xproto::allow_events(&*self.conn, allow, x11rb::CURRENT_TIME)
            .map_err(|e| protocol("allow_events", e))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), DisplayError> {
        self.conn.flush().map_err(|e| protocol("flush", e))
    }
}
