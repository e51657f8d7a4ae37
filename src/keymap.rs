//! Keysym/keycode lookup for the current server mapping.
//!
//! Built from the server's keyboard and modifier mappings. Resolves the
//! modifiers whose bit depends on the server layout (alt, super, hyper,
//! meta, mode_switch) and the lock keys that are ignored when matching.

use std::collections::HashMap;

use x11rb::protocol::xproto::{Keysym, ModMask};

use crate::display::{Display, DisplayError, KeyboardMapping, ModifierMapping};
use crate::hotkey::keysym;

/// Mask of the eight modifier bits (Shift..Mod5).
const MODIFIER_BITS: u16 = 0x00ff;

/// Fallback when no key produces `Num_Lock`.
const NUM_LOCK_FALLBACK: u16 = 0x0010;

/// Layout-dependent modifier bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StandardModifiers {
    pub alt: u16,
    pub super_: u16,
    pub hyper: u16,
    pub meta: u16,
    pub mode_switch: u16,
}

/// Modifier bits of the lock keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockMasks {
    pub num_lock: u16,
    pub caps_lock: u16,
    pub scroll_lock: u16,
}

impl LockMasks {
    /// Every distinct OR-combination of the lock masks, starting with 0.
    ///
    /// A grab is registered once per combination so hotkeys fire
    /// regardless of lock state.
    pub fn combinations(&self) -> Vec<u16> {
        let masks = [self.num_lock, self.caps_lock, self.scroll_lock];
        let mut out = vec![0u16];
        for mask in masks.into_iter().filter(|&m| m != 0) {
            let existing = out.clone();
            for base in existing {
                let combined = base | mask;
                if !out.contains(&combined) {
                    out.push(combined);
                }
            }
        }
        out
    }

    /// Strip lock bits and pointer-button bits from an event state.
    pub fn clean(&self, state: u16) -> u16 {
        let locks = self.num_lock | self.caps_lock | self.scroll_lock;
        state & !locks & MODIFIER_BITS
    }
}

/// Keysym and keycode tables for one server mapping.
#[derive(Debug, Clone)]
pub struct Keymap {
    min_keycode: u8,
    keysyms_per_keycode: usize,
    keysyms: Vec<Keysym>,
    modifiers: ModifierMapping,
    by_keysym: HashMap<Keysym, Vec<u8>>,
}

impl Keymap {
    pub fn new(keyboard: KeyboardMapping, modifiers: ModifierMapping) -> Self {
        let mut by_keysym: HashMap<Keysym, Vec<u8>> = HashMap::new();
        if keyboard.keysyms_per_keycode > 0 {
            for (i, row) in keyboard
                .keysyms
                .chunks(keyboard.keysyms_per_keycode)
                .enumerate()
            {
                let Some(keycode) = u8::try_from(i)
                    .ok()
                    .and_then(|i| keyboard.min_keycode.checked_add(i))
                else {
                    break;
                };
                for &sym in row.iter().filter(|&&s| s != 0) {
                    let codes = by_keysym.entry(sym).or_default();
                    if !codes.contains(&keycode) {
                        codes.push(keycode);
                    }
                }
            }
        }

        Self {
            min_keycode: keyboard.min_keycode,
            keysyms_per_keycode: keyboard.keysyms_per_keycode,
            keysyms: keyboard.keysyms,
            modifiers,
            by_keysym,
        }
    }

    /// Query both mappings from the server.
    pub fn load(display: &impl Display) -> Result<Self, DisplayError> {
        Ok(Self::new(
            display.keyboard_mapping()?,
            display.modifier_mapping()?,
        ))
    }

    /// Every keycode producing `keysym` in any column.
    pub fn keycodes(&self, keysym: Keysym) -> &[u8] {
        self.by_keysym
            .get(&keysym)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First-column keysym of `keycode`.
    pub fn keysym(&self, keycode: u8) -> Option<Keysym> {
        let index = usize::from(keycode.checked_sub(self.min_keycode)?);
        let sym = *self.keysyms.get(index * self.keysyms_per_keycode)?;
        (sym != 0).then_some(sym)
    }

    /// Modifier bits whose rows contain any keycode of `keysym`.
    pub fn modfield_for_keysym(&self, keysym: Keysym) -> u16 {
        let per = self.modifiers.keycodes_per_modifier;
        if per == 0 {
            return 0;
        }
        let codes = self.keycodes(keysym);
        let mut modfield = 0u16;
        for (row, slots) in self.modifiers.keycodes.chunks(per).take(8).enumerate() {
            if slots.iter().any(|kc| *kc != 0 && codes.contains(kc)) {
                modfield |= 1 << row;
            }
        }
        modfield
    }

    /// Resolve the layout-dependent modifiers.
    pub fn standard_modifiers(&self) -> StandardModifiers {
        let pair = |l, r| self.modfield_for_keysym(l) | self.modfield_for_keysym(r);
        StandardModifiers {
            alt: pair(keysym::XK_ALT_L, keysym::XK_ALT_R),
            super_: pair(keysym::XK_SUPER_L, keysym::XK_SUPER_R),
            hyper: pair(keysym::XK_HYPER_L, keysym::XK_HYPER_R),
            meta: pair(keysym::XK_META_L, keysym::XK_META_R),
            mode_switch: self.modfield_for_keysym(keysym::XK_MODE_SWITCH),
        }
    }

    /// Resolve the lock-key modifiers.
    pub fn lock_masks(&self) -> LockMasks {
        let num_lock = match self.modfield_for_keysym(keysym::XK_NUM_LOCK) {
            0 => NUM_LOCK_FALLBACK,
            mask => mask,
        };
        LockMasks {
            num_lock,
            caps_lock: u16::from(ModMask::LOCK),
            scroll_lock: self.modfield_for_keysym(keysym::XK_SCROLL_LOCK),
        }
    }
}
