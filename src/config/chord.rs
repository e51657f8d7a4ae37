//! Parses an expanded binding such as `super + shift + a ; @b`.
//!
//! Chords are separated by `;` (chain) or `:` (the preceding chord locks
//! the chain). Within a chord, `+` separates modifiers from the key; the
//! key may carry `~` (replay) and `@` (release) prefixes.

use x11rb::protocol::xproto::ModMask;

use crate::hotkey::{Chord, KeyEventKind, MOD_ANY, keysym};
use crate::keymap::StandardModifiers;

const MODIFIER_NAMES: &[&str] = &[
    "shift",
    "control",
    "ctrl",
    "lock",
    "alt",
    "super",
    "hyper",
    "meta",
    "mode_switch",
    "mod1",
    "mod2",
    "mod3",
    "mod4",
    "mod5",
    "any",
];

/// Chord syntax errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChordError {
    #[error("empty chord in '{0}'")]
    Empty(String),
    #[error("unknown modifier '{name}'{}", hint(.suggestion))]
    UnknownModifier {
        name: String,
        suggestion: Option<&'static str>,
    },
    #[error("modifier '{0}' is not mapped on this keyboard")]
    UnmappedModifier(String),
    #[error("unknown key '{name}'{}", hint(.suggestion))]
    UnknownKey {
        name: String,
        suggestion: Option<&'static str>,
    },
}

fn hint(suggestion: &Option<&'static str>) -> String {
    match suggestion {
        Some(s) => format!(", but '{s}' is similar"),
        None => String::new(),
    }
}

/// Parse one expanded binding into its chain of chords.
pub fn parse_chain(text: &str, modifiers: &StandardModifiers) -> Result<Vec<Chord>, ChordError> {
    let mut chain = Vec::new();
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        if ch == ';' || ch == ':' {
            let mut chord = parse_chord(&text[start..i], text, modifiers)?;
            chord.lock_chain = ch == ':';
            chain.push(chord);
            start = i + 1;
        }
    }
    chain.push(parse_chord(&text[start..], text, modifiers)?);
    Ok(chain)
}

fn parse_chord(
    text: &str,
    binding: &str,
    modifiers: &StandardModifiers,
) -> Result<Chord, ChordError> {
    let parts: Vec<&str> = text.split('+').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ChordError::Empty(binding.trim().to_string()));
    }
    let Some((&key, mod_parts)) = parts.split_last() else {
        return Err(ChordError::Empty(binding.trim().to_string()));
    };

    let mut modfield = 0u16;
    let mut names = Vec::with_capacity(mod_parts.len());
    for part in mod_parts {
        let name = part.to_ascii_lowercase();
        modfield |= parse_modifier(&name, modifiers)?;
        names.push(name);
    }
    if modfield & MOD_ANY != 0 {
        modfield = MOD_ANY;
    }

    let mut replay = false;
    let mut event = KeyEventKind::Press;
    let mut name = key;
    loop {
        if let Some(rest) = name.strip_prefix('~') {
            replay = true;
            name = rest;
        } else if let Some(rest) = name.strip_prefix('@') {
            event = KeyEventKind::Release;
            name = rest;
        } else {
            break;
        }
    }
    let sym = keysym::lookup(name).ok_or_else(|| ChordError::UnknownKey {
        name: name.to_string(),
        suggestion: keysym::closest(name),
    })?;

    names.push(key.to_string());
    let mut chord = Chord::new(names.join(" + "), sym, modfield);
    chord.event = event;
    chord.replay = replay;
    Ok(chord)
}

fn parse_modifier(name: &str, modifiers: &StandardModifiers) -> Result<u16, ChordError> {
    let layout = |mask: u16| {
        if mask == 0 {
            Err(ChordError::UnmappedModifier(name.to_string()))
        } else {
            Ok(mask)
        }
    };
    match name {
        "shift" => Ok(ModMask::SHIFT.into()),
        "control" | "ctrl" => Ok(ModMask::CONTROL.into()),
        "lock" => Ok(ModMask::LOCK.into()),
        "mod1" => Ok(ModMask::M1.into()),
        "mod2" => Ok(ModMask::M2.into()),
        "mod3" => Ok(ModMask::M3.into()),
        "mod4" => Ok(ModMask::M4.into()),
        "mod5" => Ok(ModMask::M5.into()),
        "any" => Ok(MOD_ANY),
        "alt" => layout(modifiers.alt),
        "super" => layout(modifiers.super_),
        "hyper" => layout(modifiers.hyper),
        "meta" => layout(modifiers.meta),
        "mode_switch" => layout(modifiers.mode_switch),
        _ => Err(ChordError::UnknownModifier {
            name: name.to_string(),
            suggestion: keysym::closest_in(name, MODIFIER_NAMES.iter().copied()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::fake;
    use crate::keymap::Keymap;

    fn mods() -> StandardModifiers {
        Keymap::new(fake::keyboard_mapping(), fake::modifier_mapping()).standard_modifiers()
    }

    fn m(mask: ModMask) -> u16 {
        mask.into()
    }

    #[test]
    fn single_chord() {
        let chain = parse_chain("super + shift + a", &mods()).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].repr, "super + shift + a");
        assert_eq!(chain[0].keysym, 0x61);
        assert_eq!(chain[0].modfield, m(ModMask::M4) | m(ModMask::SHIFT));
        assert_eq!(chain[0].event, KeyEventKind::Press);
        assert!(!chain[0].lock_chain);
    }

    #[test]
    fn repr_normalizes_spacing_and_case() {
        let chain = parse_chain("Super+Return", &mods()).unwrap();
        assert_eq!(chain[0].repr, "super + Return");
    }

    #[test]
    fn chain_separators() {
        let chain = parse_chain("super + Tab : bracketleft ; b", &mods()).unwrap();
        assert_eq!(chain.len(), 3);
        assert!(chain[0].lock_chain);
        assert!(!chain[1].lock_chain);
        assert_eq!(chain[1].repr, "bracketleft");
        assert_eq!(chain[2].keysym, 0x62);
    }

    #[test]
    fn key_prefixes() {
        let chain = parse_chain("alt + ~@x ; @~y", &mods()).unwrap();
        for chord in &chain {
            assert!(chord.replay);
            assert_eq!(chord.event, KeyEventKind::Release);
        }
        assert_eq!(chain[0].keysym, 0x78);
        assert_eq!(chain[0].repr, "alt + ~@x");
    }

    #[test]
    fn any_modifier_absorbs_others() {
        let chain = parse_chain("any + shift + F1", &mods()).unwrap();
        assert_eq!(chain[0].modfield, MOD_ANY);
    }

    #[test]
    fn ctrl_alias() {
        let a = parse_chain("ctrl + a", &mods()).unwrap();
        let b = parse_chain("control + a", &mods()).unwrap();
        assert_eq!(a[0].modfield, b[0].modfield);
    }

    #[test]
    fn unknown_key_suggests() {
        let err = parse_chain("super + Retrun", &mods()).unwrap_err();
        assert_eq!(
            err,
            ChordError::UnknownKey {
                name: "Retrun".into(),
                suggestion: Some("Return"),
            }
        );
        assert_eq!(
            err.to_string(),
            "unknown key 'Retrun', but 'Return' is similar"
        );
    }

    #[test]
    fn unknown_modifier_suggests() {
        let err = parse_chain("supr + a", &mods()).unwrap_err();
        assert_eq!(err.to_string(), "unknown modifier 'supr', but 'super' is similar");
    }

    #[test]
    fn unmapped_layout_modifier() {
        assert_eq!(
            parse_chain("hyper + a", &mods()),
            Err(ChordError::UnmappedModifier("hyper".into()))
        );
    }

    #[test]
    fn empty_chords_rejected() {
        assert!(matches!(
            parse_chain("super + ", &mods()),
            Err(ChordError::Empty(_))
        ));
        assert!(matches!(
            parse_chain("a ; ; b", &mods()),
            Err(ChordError::Empty(_))
        ));
    }
}
