//! Splits configuration text into binding/command blocks.
//!
//! Lines starting with `#` are comments. A trailing `\` joins the next
//! line. A binding is a non-indented line; its command is the following
//! indented line. A blank line closes a binding that has no command yet.
//!
//! Comment lines directly above a binding describe it: the first is its
//! title, the rest are joined into its description.

/// A binding with its command, as found in the file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    /// 1-based line where the binding starts.
    pub line: usize,
    pub binding: String,
    pub command: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Structural errors, reported per block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("binding '{0}' has no command")]
    MissingCommand(String),
    #[error("command '{0}' has no binding")]
    OrphanCommand(String),
}

/// A logical line after joining continuations.
struct Logical {
    line: usize,
    text: String,
}

fn logical_lines(text: &str) -> Vec<Logical> {
    let mut out = Vec::new();
    let mut pending: Option<Logical> = None;

    for (i, raw) in text.lines().enumerate() {
        let raw = raw.trim_end();
        let (body, continues) = match raw.strip_suffix('\\') {
            Some(body) if !raw.trim_start().starts_with('#') => (body, true),
            _ => (raw, false),
        };

        let current = match pending.take() {
            Some(mut joined) => {
                joined.text.push_str(body.trim_start());
                joined
            }
            None => Logical {
                line: i + 1,
                text: body.to_string(),
            },
        };

        if continues {
            pending = Some(current);
        } else {
            out.push(current);
        }
    }
    out.extend(pending);
    out
}

/// Scan `text` into blocks, collecting structural errors with their line.
pub fn scan(text: &str) -> (Vec<Block>, Vec<(usize, ScanError)>) {
    let mut blocks = Vec::new();
    let mut errors = Vec::new();
    let mut binding: Option<Block> = None;
    let mut comments: Vec<String> = Vec::new();

    for logical in logical_lines(text) {
        let trimmed = logical.text.trim();
        if let Some(comment) = trimmed.strip_prefix('#') {
            comments.push(comment.trim().to_string());
            continue;
        }
        if trimmed.is_empty() {
            comments.clear();
            if let Some(b) = binding.take() {
                errors.push((b.line, ScanError::MissingCommand(b.binding)));
            }
            continue;
        }

        let indented = logical.text.starts_with([' ', '\t']);
        if indented {
            comments.clear();
            match binding.take() {
                Some(b) => blocks.push(Block {
                    command: trimmed.to_string(),
                    ..b
                }),
                None => errors.push((
                    logical.line,
                    ScanError::OrphanCommand(trimmed.to_string()),
                )),
            }
        } else {
            if let Some(b) = binding.take() {
                errors.push((b.line, ScanError::MissingCommand(b.binding)));
            }
            let (title, description) = describe(std::mem::take(&mut comments));
            binding = Some(Block {
                line: logical.line,
                binding: trimmed.to_string(),
                command: String::new(),
                title,
                description,
            });
        }
    }

    if let Some(b) = binding {
        errors.push((b.line, ScanError::MissingCommand(b.binding)));
    }
    (blocks, errors)
}

fn describe(comments: Vec<String>) -> (Option<String>, Option<String>) {
    let mut lines = comments.into_iter().filter(|c| !c.is_empty());
    let title = lines.next();
    let description = lines.collect::<Vec<_>>().join(" ");
    (title, Some(description).filter(|d| !d.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_and_command() {
        let (blocks, errors) = scan("# terminal\nsuper + Return\n\turxvt\n\nsuper + b\n  firefox\n");
        assert!(errors.is_empty());
        assert_eq!(
            blocks,
            vec![
                Block {
                    line: 2,
                    binding: "super + Return".into(),
                    command: "urxvt".into(),
                    title: Some("terminal".into()),
                    description: None,
                },
                Block {
                    line: 5,
                    binding: "super + b".into(),
                    command: "firefox".into(),
                    ..Block::default()
                },
            ]
        );
    }

    #[test]
    fn continuation_joins_lines() {
        let text = "super + \\\n    {a,b}\n\techo \\\n\t  {1,2}\n";
        let (blocks, errors) = scan(text);
        assert!(errors.is_empty());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].line, 1);
        assert_eq!(blocks[0].binding, "super + {a,b}");
        assert_eq!(blocks[0].command, "echo {1,2}");
    }

    #[test]
    fn comment_never_continues() {
        let (blocks, errors) = scan("# trailing \\\nsuper + a\n\tfoo\n");
        assert!(errors.is_empty());
        assert_eq!(blocks[0].binding, "super + a");
    }

    #[test]
    fn missing_command_is_reported() {
        let (blocks, errors) = scan("super + a\n\nsuper + b\nsuper + c\n\tfoo\nsuper + d");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].binding, "super + c");
        assert_eq!(
            errors,
            vec![
                (1, ScanError::MissingCommand("super + a".into())),
                (3, ScanError::MissingCommand("super + b".into())),
                (6, ScanError::MissingCommand("super + d".into())),
            ]
        );
    }

    #[test]
    fn orphan_command_is_reported() {
        let (blocks, errors) = scan("\n    stray\nsuper + a\n\tfoo\n\tbar\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            errors,
            vec![
                (2, ScanError::OrphanCommand("stray".into())),
                (5, ScanError::OrphanCommand("bar".into())),
            ]
        );
    }

    #[test]
    fn comment_block_titles_the_binding() {
        let text = "\
# unrelated

# Focus
# Move focus {west,east}
#   in the current desktop
super + {h,l}
\tbspc node -f {west,east}
";
        let (blocks, errors) = scan(text);
        assert!(errors.is_empty());
        assert_eq!(blocks[0].title.as_deref(), Some("Focus"));
        assert_eq!(
            blocks[0].description.as_deref(),
            Some("Move focus {west,east} in the current desktop")
        );
    }

    #[test]
    fn comments_after_a_command_start_fresh() {
        let (blocks, _) = scan("# A\nsuper + a\n\tfoo\nsuper + b\n\tbar\n");
        assert_eq!(blocks[0].title.as_deref(), Some("A"));
        assert_eq!(blocks[1].title, None);
    }
}
