//! The X server operations the session depends on.
//!
//! The session, grab manager and dispatcher only talk to the server
//! through [`Display`], so the bootstrapper can run against a fake server
//! in tests. The `x11rb` implementation lives in [`crate::x11`].

/// Display errors.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("can't open display: {0}")]
    Connect(String),
    #[error("can't acquire screen {0}")]
    NoScreen(usize),
    #[error("X11: {0}")]
    Protocol(String),
}

/// Raw keyboard mapping as reported by `GetKeyboardMapping`.
#[derive(Debug, Clone, Default)]
pub struct KeyboardMapping {
    pub min_keycode: u8,
    pub keysyms_per_keycode: usize,
    /// Row-major: `keysyms_per_keycode` entries per keycode.
    pub keysyms: Vec<u32>,
}

/// Raw modifier mapping as reported by `GetModifierMapping`.
///
/// Eight rows (Shift, Lock, Control, Mod1..Mod5) of
/// `keycodes_per_modifier` keycodes each; 0 marks an unused slot.
#[derive(Debug, Clone, Default)]
pub struct ModifierMapping {
    pub keycodes_per_modifier: usize,
    pub keycodes: Vec<u8>,
}

/// How a frozen keyboard event is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowMode {
    /// Hand the event on to the focused client.
    Replay,
    /// Swallow the event. The keyboard freezes again on the next event
    /// of the grab, so later keys can still be replayed.
    Sync,
}

/// Server operations used by the session.
pub trait Display {
    /// Current keyboard mapping for the full keycode range.
    fn keyboard_mapping(&self) -> Result<KeyboardMapping, DisplayError>;

    /// Current modifier mapping.
    fn modifier_mapping(&self) -> Result<ModifierMapping, DisplayError>;

    /// Grab `keycode` with `modifiers` on the root window.
    ///
    /// Returns `Ok(false)` when another client already holds the grab.
    fn grab_key(&self, keycode: u8, modifiers: u16) -> Result<bool, DisplayError>;

    /// Release every key grab on the root window.
    fn ungrab_all(&self) -> Result<(), DisplayError>;

    /// Release the frozen keyboard.
    fn allow_events(&self, mode: AllowMode) -> Result<(), DisplayError>;

    /// Flush pending requests.
    fn flush(&self) -> Result<(), DisplayError>;
}

#[cfg(test)]
pub mod fake {
    //! In-memory server with a small US-like layout.

    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::hotkey::keysym;

    pub const KC_ESCAPE: u8 = 9;
    pub const KC_TAB: u8 = 23;
    pub const KC_RETURN: u8 = 36;
    pub const KC_CONTROL_L: u8 = 37;
    pub const KC_SHIFT_L: u8 = 50;
    pub const KC_SPACE: u8 = 65;
    pub const KC_ALT_L: u8 = 64;
    pub const KC_CAPS_LOCK: u8 = 66;
    pub const KC_NUM_LOCK: u8 = 77;
    pub const KC_SCROLL_LOCK: u8 = 78;
    pub const KC_LEVEL3: u8 = 92;
    pub const KC_SUPER_L: u8 = 133;
    pub const KC_MODE_SWITCH: u8 = 203;
    pub const KC_BRACKETLEFT: u8 = 34;
    pub const KC_BRACKETRIGHT: u8 = 35;

    /// Keycode of digit `'1'..='9'`, `'0'`.
    pub fn kc_digit(d: char) -> u8 {
        match d {
            '0' => 19,
            d => 10 + (d as u8 - b'1'),
        }
    }

    /// Keycode of lowercase letter `c`.
    pub fn kc_letter(c: char) -> u8 {
        100 + (c as u8 - b'a')
    }

    pub fn keyboard_mapping() -> KeyboardMapping {
        const MIN: u8 = 8;
        const PER: usize = 2;
        let mut keysyms = vec![0u32; (255 - MIN as usize + 1) * PER];
        let mut set = |kc: u8, syms: [u32; 2]| {
            let base = (kc - MIN) as usize * PER;
            keysyms[base] = syms[0];
            keysyms[base + 1] = syms[1];
        };

        set(KC_ESCAPE, [keysym::XK_ESCAPE, 0]);
        set(KC_TAB, [keysym::XK_TAB, 0]);
        set(KC_RETURN, [keysym::XK_RETURN, 0]);
        set(KC_CONTROL_L, [keysym::XK_CONTROL_L, 0]);
        set(KC_SHIFT_L, [keysym::XK_SHIFT_L, 0]);
        set(KC_SPACE, [0x20, 0]);
        set(KC_ALT_L, [keysym::XK_ALT_L, keysym::XK_META_L]);
        set(KC_CAPS_LOCK, [keysym::XK_CAPS_LOCK, 0]);
        set(KC_NUM_LOCK, [keysym::XK_NUM_LOCK, 0]);
        set(KC_SCROLL_LOCK, [keysym::XK_SCROLL_LOCK, 0]);
        set(KC_LEVEL3, [keysym::XK_ISO_LEVEL3_SHIFT, 0]);
        set(KC_SUPER_L, [keysym::XK_SUPER_L, 0]);
        set(KC_MODE_SWITCH, [keysym::XK_MODE_SWITCH, 0]);
        set(KC_BRACKETLEFT, [0x5b, 0x7b]);
        set(KC_BRACKETRIGHT, [0x5d, 0x7d]);
        for d in "1234567890".chars() {
            set(kc_digit(d), [d as u32, 0]);
        }
        for c in 'a'..='z' {
            set(kc_letter(c), [c as u32, c.to_ascii_uppercase() as u32]);
        }

        KeyboardMapping {
            min_keycode: MIN,
            keysyms_per_keycode: PER,
            keysyms,
        }
    }

    pub fn modifier_mapping() -> ModifierMapping {
        ModifierMapping {
            keycodes_per_modifier: 2,
            keycodes: vec![
                KC_SHIFT_L, 0, // Shift
                KC_CAPS_LOCK, 0, // Lock
                KC_CONTROL_L, 0, // Control
                KC_ALT_L, 0, // Mod1
                KC_NUM_LOCK, 0, // Mod2
                0, 0, // Mod3
                KC_SUPER_L, 0, // Mod4
                KC_LEVEL3, KC_MODE_SWITCH, // Mod5
            ],
        }
    }

    /// Records every request it receives.
    #[derive(Default)]
    pub struct FakeDisplay {
        pub grabs: RefCell<Vec<(u8, u16)>>,
        pub conflicts: RefCell<Vec<u8>>,
        pub allowed: RefCell<Vec<AllowMode>>,
        pub ungrab_calls: Cell<usize>,
        pub flushes: Cell<usize>,
    }

    impl Display for FakeDisplay {
        fn keyboard_mapping(&self) -> Result<KeyboardMapping, DisplayError> {
            Ok(keyboard_mapping())
        }

        fn modifier_mapping(&self) -> Result<ModifierMapping, DisplayError> {
            Ok(modifier_mapping())
        }

        fn grab_key(&self, keycode: u8, modifiers: u16) -> Result<bool, DisplayError> {
            if self.conflicts.borrow().contains(&keycode) {
                return Ok(false);
            }
            self.grabs.borrow_mut().push((keycode, modifiers));
            Ok(true)
        }

        fn ungrab_all(&self) -> Result<(), DisplayError> {
            self.ungrab_calls.set(self.ungrab_calls.get() + 1);
            self.grabs.borrow_mut().clear();
            Ok(())
        }

        fn allow_events(&self, mode: AllowMode) -> Result<(), DisplayError> {
            self.allowed.borrow_mut().push(mode);
            Ok(())
        }

        fn flush(&self) -> Result<(), DisplayError> {
            self.flushes.set(self.flushes.get() + 1);
            Ok(())
        }
    }
}
