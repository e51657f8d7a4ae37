//! Hotkey configuration files.
//!
//! Invalid blocks are logged with their line number and skipped; only an
//! unreadable file is an error for the caller.

pub mod chord;
pub mod expand;
pub mod scanner;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::hotkey::{Cycle, Hotkey, HotkeyList};
use crate::keymap::StandardModifiers;

use self::chord::ChordError;
use self::expand::{ExpandError, Order, Template};
use self::scanner::{Block, ScanError};

/// Errors the caller must handle.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single block was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Expand(#[from] ExpandError),
    #[error(transparent)]
    Chord(#[from] ChordError),
    #[error("{binding} bindings but {command} commands")]
    Mismatch { binding: usize, command: usize },
}

/// Outcome of parsing one file.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Hotkeys appended to the list.
    pub loaded: usize,
    /// Skipped blocks with their starting line.
    pub errors: Vec<(usize, BlockError)>,
}

/// Read `path` and append its hotkeys to `list`.
pub fn load_config(
    path: &Path,
    modifiers: &StandardModifiers,
    list: &mut HotkeyList,
) -> Result<LoadReport, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let report = parse_str(&text, modifiers, list);
    for (line, err) in &report.errors {
        warn!(path = %path.display(), line, error = %err, "skipping hotkey");
    }
    debug!(path = %path.display(), loaded = report.loaded, "config loaded");
    Ok(report)
}

/// Parse configuration text and append its hotkeys to `list`.
pub fn parse_str(text: &str, modifiers: &StandardModifiers, list: &mut HotkeyList) -> LoadReport {
    let (blocks, scan_errors) = scanner::scan(text);
    let mut report = LoadReport {
        loaded: 0,
        errors: scan_errors
            .into_iter()
            .map(|(line, e)| (line, e.into()))
            .collect(),
    };

    for block in blocks {
        match build_hotkeys(&block, modifiers) {
            Ok(hotkeys) => {
                report.loaded += hotkeys.len();
                for hotkey in hotkeys {
                    list.push(hotkey);
                }
            }
            Err(e) => report.errors.push((block.line, e)),
        }
    }
    report.errors.sort_by_key(|(line, _)| *line);
    report
}

/// Expand one block into its hotkeys.
pub fn build_hotkeys(
    block: &Block,
    modifiers: &StandardModifiers,
) -> Result<Vec<Hotkey>, BlockError> {
    let binding = Template::parse(&block.binding)?;
    let command = Template::parse(&block.command)?;
    let nb = binding.permutations();
    let nc = command.permutations();

    let bindings = binding.expand(Order::LastFastest);
    let pairs: Vec<(String, String, Option<Cycle>)> = if nb == nc {
        bindings
            .into_iter()
            .zip(command.expand(Order::LastFastest))
            .map(|(b, c)| (b, c, None))
            .collect()
    } else if nc == 1 {
        let shared = command.expand(Order::LastFastest).remove(0);
        bindings
            .into_iter()
            .map(|b| (b, shared.clone(), None))
            .collect()
    } else if nb == 1 {
        let period = u32::try_from(nc).map_err(|_| BlockError::Mismatch {
            binding: nb,
            command: nc,
        })?;
        command
            .expand(Order::FirstFastest)
            .into_iter()
            .zip(0..)
            .map(|(c, delay)| (bindings[0].clone(), c, Some(Cycle { period, delay })))
            .collect()
    } else {
        return Err(BlockError::Mismatch {
            binding: nb,
            command: nc,
        });
    };

    let descriptions = describe(block.description.as_deref(), pairs.len(), nb == 1 && nc > 1);
    let mut hotkeys = Vec::with_capacity(pairs.len());
    for ((b, c, cycle), description) in pairs.into_iter().zip(descriptions) {
        let chain = chord::parse_chain(&b, modifiers)?;
        let c = c.trim();
        let (command, sync) = match c.strip_prefix(';') {
            Some(rest) => (rest.trim_start().to_string(), true),
            None => (c.to_string(), false),
        };
        hotkeys.push(Hotkey {
            chain,
            command,
            sync,
            cycle,
            title: block.title.clone(),
            description,
        });
    }
    Ok(hotkeys)
}

/// One description per hotkey. Sequences in the description are expanded
/// when they pair up with the hotkeys; otherwise the text is shared as is.
fn describe(description: Option<&str>, count: usize, cycling: bool) -> Vec<Option<String>> {
    let Some(text) = description else {
        return vec![None; count];
    };
    let order = if cycling { Order::FirstFastest } else { Order::LastFastest };
    match Template::parse(text) {
        Ok(t) if t.permutations() == count => t.expand(order).into_iter().map(Some).collect(),
        Ok(t) if t.permutations() == 1 => vec![t.expand(order).pop(); count],
        _ => vec![Some(text.to_string()); count],
    }
}

/// Chain texts a binding expands to, e.g. `super + {a,b}` gives
/// `super + a` and `super + b`.
pub fn chain_reprs(
    binding: &str,
    modifiers: &StandardModifiers,
) -> Result<HashSet<String>, BlockError> {
    Template::parse(binding)?
        .expand(Order::LastFastest)
        .iter()
        .map(|b| -> Result<String, BlockError> {
            Ok(crate::hotkey::progress_repr(&chord::parse_chain(b, modifiers)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::display::fake;
    use crate::keymap::Keymap;

    fn mods() -> StandardModifiers {
        Keymap::new(fake::keyboard_mapping(), fake::modifier_mapping()).standard_modifiers()
    }

    fn parse(text: &str) -> (HotkeyList, LoadReport) {
        let mut list = HotkeyList::new();
        let report = parse_str(text, &mods(), &mut list);
        (list, report)
    }

    fn commands(list: &HotkeyList) -> Vec<&str> {
        list.iter().map(|h| h.command.as_str()).collect()
    }

    #[test]
    fn paired_sequences() {
        let (list, report) = parse("super + {h,j,k,l}\n\tbspc node -f {west,south,north,east}\n");
        assert!(report.errors.is_empty());
        assert_eq!(report.loaded, 4);
        let chains: Vec<String> = list.iter().map(|h| h.chain_repr()).collect();
        assert_eq!(chains, vec!["super + h", "super + j", "super + k", "super + l"]);
        assert_eq!(
            commands(&list),
            vec![
                "bspc node -f west",
                "bspc node -f south",
                "bspc node -f north",
                "bspc node -f east",
            ]
        );
    }

    #[test]
    fn shared_command() {
        let (list, _) = parse("{super,alt} + q\n\tkill\n");
        assert_eq!(commands(&list), vec!["kill", "kill"]);
        assert!(list.iter().all(|h| h.cycle.is_none()));
    }

    #[test]
    fn single_binding_with_sequences_cycles() {
        let (list, report) = parse("super + c\n\techo {a,b} {1,2}\n");
        assert!(report.errors.is_empty());
        assert_eq!(commands(&list), vec!["echo a 1", "echo b 1", "echo a 2", "echo b 2"]);
        let cycles: Vec<Cycle> = list.iter().filter_map(|h| h.cycle).collect();
        assert_eq!(cycles.len(), 4);
        for (i, cycle) in cycles.iter().enumerate() {
            assert_eq!(cycle.period, 4);
            assert_eq!(cycle.delay, i as u32);
        }
    }

    #[test]
    fn sync_prefix() {
        let (list, _) = parse("super + s\n\t; sleep 1\nsuper + a\n\techo ;\n");
        let first = list.get(0).unwrap();
        assert!(first.sync);
        assert_eq!(first.command, "sleep 1");
        let second = list.get(1).unwrap();
        assert!(!second.sync);
        assert_eq!(second.command, "echo ;");
    }

    #[test]
    fn bad_blocks_are_skipped() {
        let text = "\
super + {a,b,c}
\techo {1,2}

super + Retrun
\tterm

super + x
\tgood
";
        let (list, report) = parse(text);
        assert_eq!(commands(&list), vec!["good"]);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(
            report.errors[0],
            (1, BlockError::Mismatch { binding: 3, command: 2 })
        );
        assert!(matches!(report.errors[1], (4, BlockError::Chord(_))));
    }

    #[test]
    fn structural_errors_are_reported_in_line_order() {
        let (list, report) = parse("super + {a\n\tx\n\tstray\n");
        assert!(list.is_empty());
        let lines: Vec<usize> = report.errors.iter().map(|(l, _)| *l).collect();
        assert_eq!(lines, vec![1, 3]);
    }

    #[test]
    fn load_appends_in_file_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "super + a\n\tfirst\n\nsuper + b\n\tsecond").unwrap();
        let mut list = HotkeyList::new();
        list.push(Hotkey {
            chain: Vec::new(),
            command: "existing".into(),
            ..Hotkey::default()
        });
        let report = load_config(file.path(), &mods(), &mut list).unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(commands(&list), vec!["existing", "first", "second"]);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let err = load_config(&path, &mods(), &mut HotkeyList::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn oversized_block_is_skipped() {
        let (list, report) = parse("super + {a-z}{a-z}{a-z}\n\tx\n\nsuper + y\n\tok\n");
        assert_eq!(commands(&list), vec!["ok"]);
        assert_eq!(
            report.errors,
            vec![(1, BlockError::Expand(ExpandError::TooLarge))]
        );
    }

    #[test]
    fn descriptions_follow_their_commands() {
        let text = "\
# Focus
# Focus the {west,east} node
super + {h,l}
\tbspc node -f {west,east}
";
        let (list, _) = parse(text);
        let described: Vec<(&str, &str)> = list
            .iter()
            .map(|h| (h.title.as_deref().unwrap(), h.description.as_deref().unwrap()))
            .collect();
        assert_eq!(
            described,
            vec![
                ("Focus", "Focus the west node"),
                ("Focus", "Focus the east node"),
            ]
        );
    }

    #[test]
    fn unmatched_description_is_shared() {
        let (list, _) = parse("# T\n# pick {one,two,three}\nsuper + {a,b}\n\tx\n");
        assert!(list
            .iter()
            .all(|h| h.description.as_deref() == Some("pick {one,two,three}")));
    }

    #[test]
    fn chain_reprs_expand_bindings() {
        let reprs = chain_reprs("super + {a,b} ; c", &mods()).unwrap();
        let mut reprs: Vec<String> = reprs.into_iter().collect();
        reprs.sort();
        assert_eq!(reprs, vec!["super + a ; c", "super + b ; c"]);
        assert!(chain_reprs("super + Retrun", &mods()).is_err());
    }
}
