//! Sequence expansion: `super + {a,b}` gives `super + a` and `super + b`.
//!
//! A template is literal text interleaved with `{…}` sequences. Elements
//! are separated by `,`; `_` stands for the empty element and `x-y` with
//! single characters is an inclusive range. `\{`, `\}` and `\,` are
//! literal.
//!
//! Columns in errors count characters, starting at 1.

/// Upper bound on the strings one template may expand to.
pub const MAX_PERMUTATIONS: usize = 4096;

/// Sequence syntax errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    #[error("unterminated sequence starting at column {0}")]
    Unterminated(usize),
    #[error("nested sequence at column {0}")]
    Nested(usize),
    #[error("unmatched '}}' at column {0}")]
    Unmatched(usize),
    #[error("invalid range '{0}'")]
    InvalidRange(String),
    #[error("sequences expand to more than {MAX_PERMUTATIONS} permutations")]
    TooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Sequence(Vec<String>),
}

/// Which sequence varies fastest across consecutive permutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// The last sequence varies fastest (bindings and their commands).
    LastFastest,
    /// The first sequence varies fastest (cycling commands).
    FirstFastest,
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self, ExpandError> {
        let mut segments = Vec::new();
        let mut text_buf = String::new();
        // Open sequence: start column, finished elements, current element.
        let mut open: Option<(usize, Vec<String>, String)> = None;
        let mut chars = text.chars().enumerate().peekable();

        while let Some((col, ch)) = chars.next() {
            let in_sequence = open.is_some();
            let buf = match open.as_mut() {
                Some((_, _, element)) => element,
                None => &mut text_buf,
            };
            match ch {
                '\\' => match chars.peek() {
                    Some(&(_, next @ ('{' | '}' | ','))) => {
                        buf.push(next);
                        chars.next();
                    }
                    _ => buf.push('\\'),
                },
                '{' => {
                    if in_sequence {
                        return Err(ExpandError::Nested(col + 1));
                    }
                    if !text_buf.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text_buf)));
                    }
                    open = Some((col + 1, Vec::new(), String::new()));
                }
                '}' => {
                    let Some((_, mut elements, last)) = open.take() else {
                        return Err(ExpandError::Unmatched(col + 1));
                    };
                    elements.push(last);
                    segments.push(Segment::Sequence(expand_elements(elements)?));
                }
                ',' if in_sequence => {
                    if let Some((_, elements, element)) = open.as_mut() {
                        elements.push(std::mem::take(element));
                    }
                }
                ch => buf.push(ch),
            }
        }

        if let Some((start, _, _)) = open {
            return Err(ExpandError::Unterminated(start));
        }
        if !text_buf.is_empty() {
            segments.push(Segment::Text(text_buf));
        }

        let template = Self { segments };
        template
            .sequences()
            .try_fold(1usize, |acc, e| acc.checked_mul(e.len()))
            .filter(|&n| n <= MAX_PERMUTATIONS)
            .ok_or(ExpandError::TooLarge)?;
        Ok(template)
    }

    /// Number of strings the template expands to, at most
    /// [`MAX_PERMUTATIONS`].
    pub fn permutations(&self) -> usize {
        self.sequences().map(<[String]>::len).product()
    }

    /// Expand every permutation in the requested order.
    pub fn expand(&self, order: Order) -> Vec<String> {
        let lengths: Vec<usize> = self.sequences().map(<[String]>::len).collect();
        let total = self.permutations();
        let mut out = Vec::with_capacity(total);

        for n in 0..total {
            let mut picks = vec![0usize; lengths.len()];
            let mut rest = n;
            let positions: Box<dyn Iterator<Item = usize>> = match order {
                Order::LastFastest => Box::new((0..lengths.len()).rev()),
                Order::FirstFastest => Box::new(0..lengths.len()),
            };
            for pos in positions {
                picks[pos] = rest % lengths[pos];
                rest /= lengths[pos];
            }

            let mut s = String::new();
            let mut seq = 0;
            for segment in &self.segments {
                match segment {
                    Segment::Text(t) => s.push_str(t),
                    Segment::Sequence(elements) => {
                        s.push_str(&elements[picks[seq]]);
                        seq += 1;
                    }
                }
            }
            out.push(s);
        }
        out
    }

    fn sequences(&self) -> impl Iterator<Item = &[String]> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Sequence(e) => Some(e.as_slice()),
            Segment::Text(_) => None,
        })
    }
}

/// Resolve `_` and ranges inside one sequence.
fn expand_elements(raw: Vec<String>) -> Result<Vec<String>, ExpandError> {
    let mut out = Vec::with_capacity(raw.len());
    for element in raw {
        let trimmed = element.trim();
        if trimmed == "_" {
            out.push(String::new());
            continue;
        }
        let chars: Vec<char> = trimmed.chars().collect();
        if let [lo, '-', hi] = chars[..]
            && lo.is_ascii_alphanumeric()
            && hi.is_ascii_alphanumeric()
        {
            if lo > hi {
                return Err(ExpandError::InvalidRange(trimmed.to_string()));
            }
            out.extend((lo..=hi).map(String::from));
            continue;
        }
        out.push(element);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(text: &str) -> Vec<String> {
        Template::parse(text).unwrap().expand(Order::LastFastest)
    }

    #[test]
    fn plain_text_is_single_permutation() {
        let t = Template::parse("super + a").unwrap();
        assert_eq!(t.permutations(), 1);
        assert_eq!(t.expand(Order::LastFastest), vec!["super + a"]);
    }

    #[test]
    fn last_sequence_varies_fastest() {
        assert_eq!(
            expand("super + {a,b} ; {1-3}"),
            vec![
                "super + a ; 1",
                "super + a ; 2",
                "super + a ; 3",
                "super + b ; 1",
                "super + b ; 2",
                "super + b ; 3",
            ]
        );
    }

    #[test]
    fn first_sequence_varies_fastest_for_cycles() {
        let t = Template::parse("echo {1,2} {3,4}").unwrap();
        assert_eq!(
            t.expand(Order::FirstFastest),
            vec!["echo 1 3", "echo 2 3", "echo 1 4", "echo 2 4"]
        );
    }

    #[test]
    fn underscore_is_empty_element() {
        assert_eq!(
            expand("super + {_,shift + }c"),
            vec!["super + c", "super + shift + c"]
        );
    }

    #[test]
    fn whitespace_inside_elements_is_kept() {
        assert_eq!(
            expand("echo {some, replacement}"),
            vec!["echo some", "echo  replacement"]
        );
    }

    #[test]
    fn ranges_mix_with_elements() {
        assert_eq!(expand("{1-3,0}").len(), 4);
        assert_eq!(expand("{a-c}"), vec!["a", "b", "c"]);
        assert_eq!(expand("{-first,-second}"), vec!["-first", "-second"]);
    }

    #[test]
    fn escapes_are_literal() {
        assert_eq!(expand(r"awk '\{print $1\}'"), vec!["awk '{print $1}'"]);
        assert_eq!(expand(r"{a\,b,c}"), vec!["a,b", "c"]);
        assert_eq!(expand(r"printf '\n'"), vec![r"printf '\n'"]);
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(
            Template::parse("super + {a,b"),
            Err(ExpandError::Unterminated(9))
        );
        assert_eq!(Template::parse("{a,{b}}"), Err(ExpandError::Nested(4)));
        assert_eq!(Template::parse("a}"), Err(ExpandError::Unmatched(2)));
        assert_eq!(
            Template::parse("{9-1}"),
            Err(ExpandError::InvalidRange("9-1".into()))
        );
    }

    #[test]
    fn columns_count_characters() {
        assert_eq!(Template::parse("ä + ö + {a"), Err(ExpandError::Unterminated(9)));
        assert_eq!(Template::parse("€}"), Err(ExpandError::Unmatched(2)));
    }

    #[test]
    fn oversized_expansions_are_refused() {
        assert_eq!(
            Template::parse(&"{a-z}".repeat(14)),
            Err(ExpandError::TooLarge)
        );
        assert_eq!(
            Template::parse(&"{a-z}".repeat(3)),
            Err(ExpandError::TooLarge)
        );
        // 26 * 26 * 6 stays under the cap.
        let t = Template::parse("{a-z}{a-z}{1-6}").unwrap();
        assert_eq!(t.permutations(), 4056);
    }
}
