//! X keysym names and values.
//!
//! Every name from the X keysym headers is known, the XF86 vendor keys
//! included. A single character names its own keysym, and anything else
//! can be written in hexadecimal (`0x1008ff13`).

mod table;

use x11rb::protocol::xproto::Keysym;

use self::table::{LEGACY, NAMED};

pub const XK_BACKSPACE: Keysym = 0xff08;
pub const XK_TAB: Keysym = 0xff09;
pub const XK_RETURN: Keysym = 0xff0d;
pub const XK_ESCAPE: Keysym = 0xff1b;
pub const XK_SCROLL_LOCK: Keysym = 0xff14;
pub const XK_NUM_LOCK: Keysym = 0xff7f;
pub const XK_MODE_SWITCH: Keysym = 0xff7e;
pub const XK_SHIFT_L: Keysym = 0xffe1;
pub const XK_CONTROL_L: Keysym = 0xffe3;
pub const XK_CAPS_LOCK: Keysym = 0xffe5;
pub const XK_META_L: Keysym = 0xffe7;
pub const XK_META_R: Keysym = 0xffe8;
pub const XK_ALT_L: Keysym = 0xffe9;
pub const XK_ALT_R: Keysym = 0xffea;
pub const XK_SUPER_L: Keysym = 0xffeb;
pub const XK_SUPER_R: Keysym = 0xffec;
pub const XK_HYPER_L: Keysym = 0xffed;
pub const XK_HYPER_R: Keysym = 0xffee;
pub const XK_ISO_LEVEL3_SHIFT: Keysym = 0xfe03;

/// XK_F1; F2..F35 follow consecutively.
const XK_F1: Keysym = 0xffbe;

/// Keysyms for Unicode code points outside Latin-1 start here.
const UNICODE_OFFSET: Keysym = 0x0100_0000;

/// Map a keysym name to its value.
///
/// Accepts the names in the table, single characters (letters map to
/// their lowercase keysym), `F1`-`F35` and `0x`-prefixed hexadecimal
/// values.
pub fn lookup(name: &str) -> Option<Keysym> {
    let mut chars = name.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        return char_keysym(ch);
    }

    if let Some(rest) = name.strip_prefix('F')
        && let Ok(n) = rest.parse::<u32>()
        && (1..=35).contains(&n)
    {
        return Some(XK_F1 + n - 1);
    }

    if let Some(hex) = name.strip_prefix("0x") {
        return Keysym::from_str_radix(hex, 16).ok();
    }

    NAMED
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, sym)| sym)
}

/// Keysym of a single character, after lowercasing.
///
/// ASCII and Latin-1 keysyms equal their code point. Characters with a
/// legacy keysym (Cyrillic, Greek, the Euro sign...) use it, since that
/// is what keyboard mappings carry. The rest use the Unicode keysym range.
fn char_keysym(ch: char) -> Option<Keysym> {
    let mut lower = ch.to_lowercase();
    let ch = match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => ch,
    };
    let cp = u32::from(ch);
    match cp {
        0x20..=0x7e | 0xa0..=0xff => Some(cp),
        0..=0x1f | 0x7f..=0x9f => None,
        _ => Some(
            LEGACY
                .binary_search_by_key(&cp, |&(c, _)| c)
                .map_or(UNICODE_OFFSET + cp, |i| LEGACY[i].1),
        ),
    }
}

/// Closest known keysym name, for "did you mean" hints.
pub fn closest(name: &str) -> Option<&'static str> {
    closest_in(name, NAMED.iter().map(|(n, _)| *n))
}

/// Closest candidate within an edit distance of a third of the input.
pub fn closest_in<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let wanted = name.to_ascii_lowercase();
    let limit = (wanted.len() / 3).max(1);
    candidates
        .map(|c| (edit_distance(&wanted, &c.to_ascii_lowercase()), c))
        .filter(|(d, _)| *d <= limit)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_characters() {
        assert_eq!(lookup("a"), Some(0x61));
        assert_eq!(lookup("C"), Some(0x63));
        assert_eq!(lookup("9"), Some(0x39));
        assert_eq!(lookup("["), Some(0x5b));
        assert_eq!(lookup(" "), Some(0x20));
    }

    #[test]
    fn latin1_names() {
        assert_eq!(lookup("adiaeresis"), Some(0xe4));
        assert_eq!(lookup("eacute"), Some(0xe9));
        assert_eq!(lookup("ssharp"), Some(0xdf));
        assert_eq!(lookup("Odiaeresis"), Some(0xd6));
        assert_eq!(lookup("nobreakspace"), Some(0xa0));
    }

    #[test]
    fn other_scripts_by_name() {
        assert_eq!(lookup("Cyrillic_a"), Some(0x6c1));
        assert_eq!(lookup("Greek_alpha"), Some(0x7e1));
        assert_eq!(lookup("EuroSign"), Some(0x20ac));
        assert_eq!(lookup("Left"), lookup("left"));
    }

    #[test]
    fn non_ascii_characters() {
        assert_eq!(lookup("ä"), Some(0xe4));
        assert_eq!(lookup("Ä"), Some(0xe4));
        assert_eq!(lookup("ß"), Some(0xdf));
        // Legacy keysyms win over the Unicode range.
        assert_eq!(lookup("а"), Some(0x6c1));
        assert_eq!(lookup("Ж"), lookup("Cyrillic_zhe"));
        assert_eq!(lookup("€"), Some(0x20ac));
        assert_eq!(lookup("→"), lookup("rightarrow"));
        assert_eq!(lookup("☃"), Some(0x0100_2603));
        assert_eq!(lookup("\u{7}"), None);
    }

    #[test]
    fn legacy_table_is_sorted() {
        assert!(LEGACY.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn function_keys() {
        assert_eq!(lookup("F1"), Some(0xffbe));
        assert_eq!(lookup("F12"), Some(0xffc9));
        assert_eq!(lookup("F35"), Some(0xffe0));
        assert_eq!(lookup("F36"), None);
        assert_eq!(lookup("F0"), None);
    }

    #[test]
    fn named_keys() {
        assert_eq!(lookup("Return"), Some(XK_RETURN));
        assert_eq!(lookup("Escape"), Some(XK_ESCAPE));
        assert_eq!(lookup("bracketleft"), Some(0x5b));
        assert_eq!(lookup("Page_Down"), lookup("Next"));
        assert_eq!(lookup("XF86AudioRaiseVolume"), Some(0x1008ff13));
    }

    #[test]
    fn names_are_case_sensitive() {
        assert_eq!(lookup("return"), None);
        assert_eq!(lookup("ESCAPE"), None);
    }

    #[test]
    fn hexadecimal_keysyms() {
        assert_eq!(lookup("0xff0d"), Some(XK_RETURN));
        assert_eq!(lookup("0xzz"), None);
    }

    #[test]
    fn unknown_names() {
        assert_eq!(lookup(""), None);
        assert_eq!(lookup("FooBar"), None);
    }

    #[test]
    fn closest_suggests_typos() {
        assert_eq!(closest("Retrun"), Some("Return"));
        assert_eq!(closest("escape"), Some("Escape"));
        assert_eq!(closest("qqqqqqqqqqqq"), None);
    }
}
