//! Matches key input against the hotkey list.
//!
//! Tracks the chords pressed so far. A hotkey whose chain is longer than
//! the progress keeps the chain open; a hotkey whose last chord matches
//! fires. A chord marked `lock_chain` pins the chain at that depth until
//! the abort chord is pressed.
//!
//! Each step into a chain also lists the ways it can go on, so a socket
//! subscriber can show the remaining keys with their labels.

use crate::hotkey::{Chord, HotkeyList, KeyEventKind, KeyInput, progress_repr};
use crate::status::Status;

/// What the caller should do with the chain timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerAction {
    /// Restart the timeout.
    Arm,
    /// Stop the timeout.
    Cancel,
    /// Leave the timeout as it is.
    #[default]
    Keep,
}

/// Result of feeding one key event to the dispatcher.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Indices into the hotkey list of the hotkeys to run, in order.
    pub fired: Vec<usize>,
    /// Hand the event on to the focused client.
    pub replay: bool,
    pub statuses: Vec<Status>,
    pub timer: TimerAction,
}

#[derive(Debug, Default)]
pub struct ChainTracker {
    progress: Vec<KeyInput>,
    chords: Vec<Chord>,
    lock_depth: Option<usize>,
}

impl ChainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_chained(&self) -> bool {
        !self.progress.is_empty()
    }

    pub fn is_locked(&self) -> bool {
        self.lock_depth.is_some()
    }

    /// Forget any chain in progress without reporting it.
    pub fn reset(&mut self) {
        self.progress.clear();
        self.chords.clear();
        self.lock_depth = None;
    }

    /// Chain timed out. Locked chains never time out.
    pub fn timeout(&mut self) -> Vec<Status> {
        let mut statuses = Vec::new();
        if self.is_chained() && !self.is_locked() {
            statuses.push(Status::Timeout);
            self.end(&mut statuses);
        }
        statuses
    }

    pub fn handle(&mut self, hotkeys: &mut HotkeyList, abort: &Chord, input: &KeyInput) -> Outcome {
        let mut out = Outcome::default();

        if self.is_chained() && abort.matches(input) {
            self.end(&mut out.statuses);
            out.timer = TimerAction::Cancel;
            return out;
        }

        let mut candidates = self.candidates(hotkeys, input);
        if candidates.is_empty() && self.awaits_release(hotkeys, input) {
            return out;
        }
        if candidates.is_empty()
            && self.is_chained()
            && !self.is_locked()
            && input.event == KeyEventKind::Press
        {
            self.end(&mut out.statuses);
            candidates = self.candidates(hotkeys, input);
        }
        if candidates.is_empty() {
            out.replay = !self.awaits_release(hotkeys, input);
            return out;
        }

        let depth = self.progress.len();
        out.replay = candidates
            .iter()
            .filter_map(|&i| hotkeys.get(i))
            .any(|h| h.chain[depth].replay);

        let terminal: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| hotkeys.get(i).is_some_and(|h| h.chain.len() == depth + 1))
            .collect();

        if terminal.is_empty() {
            self.advance(hotkeys, candidates[0], input, &mut out.statuses);
        } else {
            self.fire(hotkeys, &terminal, &mut out);
        }

        out.timer = if self.is_chained() && !self.is_locked() {
            TimerAction::Arm
        } else {
            TimerAction::Cancel
        };
        out
    }

    fn candidates(&self, hotkeys: &HotkeyList, input: &KeyInput) -> Vec<usize> {
        let depth = self.progress.len();
        hotkeys
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                h.chain.len() > depth
                    && h.chain.iter().zip(&self.progress).all(|(c, i)| c.matches(i))
                    && h.chain[depth].matches(input)
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// The press of a key whose release completes a chord. Replaying it
    /// would end the keyboard grab before the release is reported.
    fn awaits_release(&self, hotkeys: &HotkeyList, input: &KeyInput) -> bool {
        if input.event != KeyEventKind::Press {
            return false;
        }
        let release = KeyInput {
            event: KeyEventKind::Release,
            ..*input
        };
        !self.candidates(hotkeys, &release).is_empty()
    }

    fn advance(
        &mut self,
        hotkeys: &HotkeyList,
        index: usize,
        input: &KeyInput,
        statuses: &mut Vec<Status>,
    ) {
        let Some(chord) = hotkeys
            .get(index)
            .and_then(|h| h.chain.get(self.progress.len()))
        else {
            return;
        };
        let began = !self.is_chained();
        self.progress.push(*input);
        self.chords.push(chord.clone());
        if chord.lock_chain {
            self.lock_depth = Some(self.progress.len());
        }

        statuses.push(Status::Hotkey(progress_repr(&self.chords)));
        if began {
            statuses.push(Status::BeginChain);
        }
        let depth = self.progress.len();
        for hotkey in hotkeys.iter().filter(|h| {
            h.chain.len() > depth && h.chain.iter().zip(&self.progress).all(|(c, i)| c.matches(i))
        }) {
            statuses.push(Status::Continuation {
                keys: progress_repr(&hotkey.chain[depth..]),
                label: hotkey.label().to_string(),
            });
        }
    }

    fn fire(&mut self, hotkeys: &mut HotkeyList, terminal: &[usize], out: &mut Outcome) {
        let has_cycle = terminal
            .iter()
            .any(|&i| hotkeys.get(i).is_some_and(|h| h.cycle.is_some()));

        if has_cycle {
            for &i in terminal {
                if let Some(cycle) = hotkeys.get_mut(i).and_then(|h| h.cycle.as_mut())
                    && cycle.step()
                {
                    out.fired.push(i);
                }
            }
        } else {
            out.fired.push(terminal[0]);
        }

        if let Some(hotkey) = hotkeys.get(terminal[0]) {
            out.statuses.push(Status::Hotkey(hotkey.chain_repr()));
        }
        for &i in &out.fired {
            if let Some(hotkey) = hotkeys.get(i) {
                out.statuses.push(Status::Command(hotkey.command.clone()));
            }
        }

        match self.lock_depth {
            Some(depth) => {
                self.progress.truncate(depth);
                self.chords.truncate(depth);
            }
            None => self.end(&mut out.statuses),
        }
    }

    fn end(&mut self, statuses: &mut Vec<Status>) {
        if self.is_chained() {
            statuses.push(Status::EndChain);
        }
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{Cycle, Hotkey, keysym};

    const SUPER: u16 = 0x40;

    fn chord(repr: &str, keysym: u32, modfield: u16) -> Chord {
        Chord::new(repr, keysym, modfield)
    }

    fn hotkey(chain: Vec<Chord>, command: &str) -> Hotkey {
        Hotkey {
            chain,
            command: command.into(),
            ..Hotkey::default()
        }
    }

    fn press(keysym: u32, modfield: u16) -> KeyInput {
        KeyInput {
            keysym,
            modfield,
            event: KeyEventKind::Press,
        }
    }

    fn abort() -> Chord {
        chord("Escape", keysym::XK_ESCAPE, 0)
    }

    fn list(hotkeys: Vec<Hotkey>) -> HotkeyList {
        let mut list = HotkeyList::new();
        for h in hotkeys {
            list.push(h);
        }
        list
    }

    #[test]
    fn single_chord_fires() {
        let mut hotkeys = list(vec![hotkey(vec![chord("super + a", 0x61, SUPER)], "one")]);
        let mut tracker = ChainTracker::new();
        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x61, SUPER));
        assert_eq!(out.fired, vec![0]);
        assert!(!out.replay);
        assert_eq!(
            out.statuses,
            vec![
                Status::Hotkey("super + a".into()),
                Status::Command("one".into())
            ]
        );
        assert_eq!(out.timer, TimerAction::Cancel);
        assert!(!tracker.is_chained());
    }

    #[test]
    fn unmatched_is_replayed() {
        let mut hotkeys = list(vec![hotkey(vec![chord("super + a", 0x61, SUPER)], "one")]);
        let mut tracker = ChainTracker::new();
        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x61, 0));
        assert!(out.fired.is_empty());
        assert!(out.replay);
        assert_eq!(out.timer, TimerAction::Keep);
    }

    #[test]
    fn chain_begins_and_completes() {
        let mut hotkeys = list(vec![
            hotkey(vec![chord("super + w", 0x77, SUPER), chord("a", 0x61, 0)], "wa"),
            hotkey(vec![chord("super + w", 0x77, SUPER), chord("b", 0x62, 0)], "wb"),
        ]);
        let mut tracker = ChainTracker::new();

        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x77, SUPER));
        assert!(out.fired.is_empty());
        assert_eq!(
            out.statuses,
            vec![
                Status::Hotkey("super + w".into()),
                Status::BeginChain,
                Status::Continuation {
                    keys: "a".into(),
                    label: "wa".into()
                },
                Status::Continuation {
                    keys: "b".into(),
                    label: "wb".into()
                },
            ]
        );
        assert_eq!(out.timer, TimerAction::Arm);
        assert!(tracker.is_chained());

        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x62, 0));
        assert_eq!(out.fired, vec![1]);
        assert_eq!(
            out.statuses,
            vec![
                Status::Hotkey("super + w ; b".into()),
                Status::Command("wb".into()),
                Status::EndChain,
            ]
        );
        assert_eq!(out.timer, TimerAction::Cancel);
        assert!(!tracker.is_chained());
    }

    #[test]
    fn stray_press_restarts_from_top() {
        let mut hotkeys = list(vec![
            hotkey(vec![chord("super + w", 0x77, SUPER), chord("a", 0x61, 0)], "wa"),
            hotkey(vec![chord("super + q", 0x71, SUPER)], "q"),
        ]);
        let mut tracker = ChainTracker::new();
        tracker.handle(&mut hotkeys, &abort(), &press(0x77, SUPER));
        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x71, SUPER));
        assert_eq!(out.fired, vec![1]);
        assert_eq!(out.statuses[0], Status::EndChain);
    }

    #[test]
    fn release_does_not_break_chain() {
        let mut hotkeys = list(vec![hotkey(
            vec![chord("super + w", 0x77, SUPER), chord("a", 0x61, 0)],
            "wa",
        )]);
        let mut tracker = ChainTracker::new();
        tracker.handle(&mut hotkeys, &abort(), &press(0x77, SUPER));
        let release = KeyInput {
            event: KeyEventKind::Release,
            ..press(0x77, SUPER)
        };
        let out = tracker.handle(&mut hotkeys, &abort(), &release);
        assert!(out.statuses.is_empty());
        assert_eq!(out.timer, TimerAction::Keep);
        assert!(tracker.is_chained());
    }

    #[test]
    fn abort_ends_chain() {
        let mut hotkeys = list(vec![hotkey(
            vec![chord("super + w", 0x77, SUPER), chord("a", 0x61, 0)],
            "wa",
        )]);
        let mut tracker = ChainTracker::new();
        tracker.handle(&mut hotkeys, &abort(), &press(0x77, SUPER));
        let out = tracker.handle(&mut hotkeys, &abort(), &press(keysym::XK_ESCAPE, 0));
        assert!(out.fired.is_empty());
        assert!(!out.replay);
        assert_eq!(out.statuses, vec![Status::EndChain]);
        assert_eq!(out.timer, TimerAction::Cancel);
        assert!(!tracker.is_chained());
    }

    #[test]
    fn abort_outside_chain_is_replayed() {
        let mut hotkeys = HotkeyList::new();
        let mut tracker = ChainTracker::new();
        let out = tracker.handle(&mut hotkeys, &abort(), &press(keysym::XK_ESCAPE, 0));
        assert!(out.replay);
        assert!(out.statuses.is_empty());
    }

    #[test]
    fn locked_chain_stays_until_abort() {
        let mut lock = chord("super + Tab", keysym::XK_TAB, SUPER);
        lock.lock_chain = true;
        let mut hotkeys = list(vec![
            hotkey(vec![lock.clone(), chord("a", 0x61, 0)], "a"),
            hotkey(vec![lock, chord("b", 0x62, 0)], "b"),
        ]);
        let mut tracker = ChainTracker::new();

        let out = tracker.handle(&mut hotkeys, &abort(), &press(keysym::XK_TAB, SUPER));
        assert!(tracker.is_locked());
        assert_eq!(out.timer, TimerAction::Cancel);

        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x61, 0));
        assert_eq!(out.fired, vec![0]);
        assert_eq!(out.statuses[0], Status::Hotkey("super + Tab : a".into()));
        assert!(tracker.is_chained());

        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x62, 0));
        assert_eq!(out.fired, vec![1]);

        // Unknown keys neither fire nor unlock.
        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x63, 0));
        assert!(out.fired.is_empty() && out.replay);
        assert!(tracker.is_locked());

        assert!(tracker.timeout().is_empty());

        let out = tracker.handle(&mut hotkeys, &abort(), &press(keysym::XK_ESCAPE, 0));
        assert_eq!(out.statuses, vec![Status::EndChain]);
        assert!(!tracker.is_chained() && !tracker.is_locked());
    }

    #[test]
    fn timeout_ends_unlocked_chain() {
        let mut hotkeys = list(vec![hotkey(
            vec![chord("super + w", 0x77, SUPER), chord("a", 0x61, 0)],
            "wa",
        )]);
        let mut tracker = ChainTracker::new();
        tracker.handle(&mut hotkeys, &abort(), &press(0x77, SUPER));
        assert_eq!(tracker.timeout(), vec![Status::Timeout, Status::EndChain]);
        assert!(!tracker.is_chained());
        assert!(tracker.timeout().is_empty());
    }

    #[test]
    fn cycle_members_rotate() {
        let mut hotkeys = HotkeyList::new();
        for (delay, command) in ["first", "second", "third"].iter().enumerate() {
            hotkeys.push(Hotkey {
                chain: vec![chord("super + c", 0x63, SUPER)],
                command: command.to_string(),
                cycle: Some(Cycle {
                    period: 3,
                    delay: delay as u32,
                }),
                ..Hotkey::default()
            });
        }
        let mut tracker = ChainTracker::new();
        let fired: Vec<usize> = (0..4)
            .flat_map(|_| tracker.handle(&mut hotkeys, &abort(), &press(0x63, SUPER)).fired)
            .collect();
        assert_eq!(fired, vec![0, 1, 2, 0]);
    }

    fn release(keysym: u32, modfield: u16) -> KeyInput {
        KeyInput {
            event: KeyEventKind::Release,
            ..press(keysym, modfield)
        }
    }

    fn on_release(mut c: Chord) -> Chord {
        c.event = KeyEventKind::Release;
        c
    }

    #[test]
    fn release_chord_swallows_its_press() {
        let mut hotkeys = list(vec![hotkey(vec![on_release(chord("@a", 0x61, 0))], "a")]);
        let mut tracker = ChainTracker::new();

        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x61, 0));
        assert!(out.fired.is_empty());
        assert!(!out.replay);
        assert_eq!(out.timer, TimerAction::Keep);

        let out = tracker.handle(&mut hotkeys, &abort(), &release(0x61, 0));
        assert_eq!(out.fired, vec![0]);
        assert!(!out.replay);

        // Other modifiers are not part of the chord.
        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x61, SUPER));
        assert!(out.replay);
    }

    #[test]
    fn release_chord_inside_chain_keeps_chain() {
        let mut hotkeys = list(vec![hotkey(
            vec![chord("super + w", 0x77, SUPER), on_release(chord("@a", 0x61, 0))],
            "wa",
        )]);
        let mut tracker = ChainTracker::new();
        tracker.handle(&mut hotkeys, &abort(), &press(0x77, SUPER));

        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x61, 0));
        assert!(!out.replay);
        assert!(out.statuses.is_empty());
        assert!(tracker.is_chained());

        let out = tracker.handle(&mut hotkeys, &abort(), &release(0x61, 0));
        assert_eq!(out.fired, vec![0]);
        assert!(!tracker.is_chained());
    }

    #[test]
    fn replay_flag_is_honoured() {
        let mut c = chord("~a", 0x61, 0);
        c.replay = true;
        let mut hotkeys = list(vec![hotkey(vec![c], "a")]);
        let mut tracker = ChainTracker::new();
        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x61, 0));
        assert_eq!(out.fired, vec![0]);
        assert!(out.replay);
    }

    #[test]
    fn continuations_carry_labels() {
        let mut titled = hotkey(
            vec![chord("super + w", 0x77, SUPER), chord("t", 0x74, 0), chord("x", 0x78, 0)],
            "urxvt",
        );
        titled.title = Some("Terminal".into());
        let mut hotkeys = list(vec![
            titled,
            hotkey(vec![chord("super + q", 0x71, SUPER)], "q"),
        ]);
        let mut tracker = ChainTracker::new();
        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x77, SUPER));
        assert_eq!(
            out.statuses[2..],
            [Status::Continuation {
                keys: "t ; x".into(),
                label: "Terminal".into()
            }]
        );

        let out = tracker.handle(&mut hotkeys, &abort(), &press(0x74, 0));
        assert_eq!(
            out.statuses,
            vec![
                Status::Hotkey("super + w ; t".into()),
                Status::Continuation {
                    keys: "x".into(),
                    label: "Terminal".into()
                },
            ]
        );
    }
}
