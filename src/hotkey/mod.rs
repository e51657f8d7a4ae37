//! Chords, hotkeys and the session's hotkey list.

pub mod keysym;

use std::fmt;

use x11rb::protocol::xproto::Keysym;

/// Modifier value matching any modifier state (X11 `AnyModifier`).
pub const MOD_ANY: u16 = 0x8000;

/// Whether a chord fires on key press or key release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEventKind {
    #[default]
    Press,
    Release,
}

/// A single key/modifier combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    /// Text as written in the configuration, normalized spacing.
    pub repr: String,
    pub keysym: Keysym,
    /// X11 modifier mask, or [`MOD_ANY`].
    pub modfield: u16,
    pub event: KeyEventKind,
    /// Replay the event to the focused client instead of swallowing it.
    pub replay: bool,
    /// The chain locks after this chord until the abort chord.
    pub lock_chain: bool,
}

impl Chord {
    /// Build a press chord with no prefixes.
    pub fn new(repr: impl Into<String>, keysym: Keysym, modfield: u16) -> Self {
        Self {
            repr: repr.into(),
            keysym,
            modfield,
            event: KeyEventKind::Press,
            replay: false,
            lock_chain: false,
        }
    }

    /// Check whether a key event triggers this chord.
    ///
    /// `input.modfield` must already have lock and pointer-button bits
    /// removed.
    pub fn matches(&self, input: &KeyInput) -> bool {
        self.keysym == input.keysym
            && self.event == input.event
            && (self.modfield == MOD_ANY || self.modfield == input.modfield)
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

/// A key event translated to keysym space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub keysym: Keysym,
    pub modfield: u16,
    pub event: KeyEventKind,
}

/// Rotation state of a hotkey that shares its chain with its siblings.
///
/// Each activation of the chain fires the sibling whose `delay` is zero
/// and rotates every sibling's delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    pub period: u32,
    pub delay: u32,
}

impl Cycle {
    /// Advance the rotation, returning whether this member fires.
    pub fn step(&mut self) -> bool {
        let fire = self.delay == 0;
        self.delay = if fire { self.period - 1 } else { self.delay - 1 };
        fire
    }
}

/// A chain bound to a command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hotkey {
    pub chain: Vec<Chord>,
    pub command: String,
    /// Wait for the command to finish before handling further keys.
    pub sync: bool,
    pub cycle: Option<Cycle>,
    /// First line of the comment block above the binding.
    pub title: Option<String>,
    /// Remaining lines of that comment block, sequences expanded.
    pub description: Option<String>,
}

impl Hotkey {
    /// Chain text, e.g. `super + w ; a`.
    pub fn chain_repr(&self) -> String {
        progress_repr(&self.chain)
    }

    /// Human-readable name: the title, else the description, else the
    /// command.
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or(self.command.trim())
    }
}

/// Join chords the way they are written: `;` between chained chords,
/// `:` after a locking chord.
pub fn progress_repr(chords: &[Chord]) -> String {
    let mut out = String::new();
    for (i, chord) in chords.iter().enumerate() {
        if i > 0 {
            out.push_str(if chords[i - 1].lock_chain { " : " } else { " ; " });
        }
        out.push_str(&chord.repr);
    }
    out
}

/// The session's ordered hotkey list.
#[derive(Debug, Default)]
pub struct HotkeyList {
    hotkeys: Vec<Hotkey>,
}

impl HotkeyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail.
    pub fn push(&mut self, hotkey: Hotkey) {
        self.hotkeys.push(hotkey);
    }

    /// Drop every hotkey, leaving the list empty.
    pub fn clear(&mut self) {
        self.hotkeys.clear();
    }

    pub fn len(&self) -> usize {
        self.hotkeys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotkeys.is_empty()
    }

    #[cfg(test)]
    pub fn head(&self) -> Option<&Hotkey> {
        self.hotkeys.first()
    }

    #[cfg(test)]
    pub fn tail(&self) -> Option<&Hotkey> {
        self.hotkeys.last()
    }

    /// Keep only the hotkeys for which `keep` holds, returning how many
    /// were removed.
    pub fn retain(&mut self, keep: impl FnMut(&Hotkey) -> bool) -> usize {
        let before = self.hotkeys.len();
        self.hotkeys.retain(keep);
        before - self.hotkeys.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hotkey> {
        self.hotkeys.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Hotkey> {
        self.hotkeys.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Hotkey> {
        self.hotkeys.get_mut(index)
    }
}

impl<'a> IntoIterator for &'a HotkeyList {
    type Item = &'a Hotkey;
    type IntoIter = std::slice::Iter<'a, Hotkey>;

    fn into_iter(self) -> Self::IntoIter {
        self.hotkeys.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hotkey(command: &str) -> Hotkey {
        Hotkey {
            chain: vec![Chord::new("a", 0x61, 0)],
            command: command.into(),
            ..Hotkey::default()
        }
    }

    #[test]
    fn chord_matches_exact_modifiers() {
        let chord = Chord::new("super + a", 0x61, 0x40);
        let input = KeyInput {
            keysym: 0x61,
            modfield: 0x40,
            event: KeyEventKind::Press,
        };
        assert!(chord.matches(&input));
        assert!(!chord.matches(&KeyInput { modfield: 0x41, ..input }));
        assert!(!chord.matches(&KeyInput {
            event: KeyEventKind::Release,
            ..input
        }));
    }

    #[test]
    fn chord_any_modifier() {
        let chord = Chord::new("any + a", 0x61, MOD_ANY);
        let input = KeyInput {
            keysym: 0x61,
            modfield: 0x45,
            event: KeyEventKind::Press,
        };
        assert!(chord.matches(&input));
    }

    #[test]
    fn cycle_rotates_through_members() {
        let mut members = [
            Cycle { period: 3, delay: 0 },
            Cycle { period: 3, delay: 1 },
            Cycle { period: 3, delay: 2 },
        ];
        let mut fired = Vec::new();
        for _ in 0..6 {
            let winners: Vec<usize> = members
                .iter_mut()
                .enumerate()
                .filter_map(|(i, c)| c.step().then_some(i))
                .collect();
            assert_eq!(winners.len(), 1);
            fired.push(winners[0]);
        }
        assert_eq!(fired, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn progress_repr_marks_locks() {
        let mut first = Chord::new("super + Tab", 0xff09, 0x40);
        first.lock_chain = true;
        let second = Chord::new("a", 0x61, 0);
        let third = Chord::new("b", 0x62, 0);
        assert_eq!(
            progress_repr(&[first, second, third]),
            "super + Tab : a ; b"
        );
    }

    #[test]
    fn list_head_and_tail() {
        let mut list = HotkeyList::new();
        assert!(list.head().is_none() && list.tail().is_none());
        list.push(hotkey("one"));
        list.push(hotkey("two"));
        assert_eq!(list.head().map(|h| h.command.as_str()), Some("one"));
        assert_eq!(list.tail().map(|h| h.command.as_str()), Some("two"));
        list.clear();
        assert!(list.is_empty());
        assert!(list.head().is_none() && list.tail().is_none());
    }

    #[test]
    fn list_retain_reports_removed() {
        let mut list = HotkeyList::new();
        for command in ["one", "two", "three"] {
            list.push(hotkey(command));
        }
        assert_eq!(list.retain(|h| h.command != "two"), 1);
        let commands: Vec<&str> = list.iter().map(|h| h.command.as_str()).collect();
        assert_eq!(commands, vec!["one", "three"]);
    }

    #[test]
    fn label_prefers_title_then_description() {
        let mut h = hotkey("  urxvt ");
        assert_eq!(h.label(), "urxvt");
        h.description = Some("Open a terminal".into());
        assert_eq!(h.label(), "Open a terminal");
        h.title = Some("Terminal".into());
        assert_eq!(h.label(), "Terminal");
    }
}
