//! Structural measurements of a regex pattern.

/// Constructs that make a pattern expensive or hard to read. The Rust engine
/// rejects look-around outright; counting it still produces a clearer bound
/// violation when a pattern compiles under a different syntax.
pub const ADVANCED_CONSTRUCTS: &[&str] = &["(?=", "(?!", "(?<=", "(?<!", "(?:"];

#[derive(Debug, Clone, PartialEq)]
pub struct RegexMetrics {
    /// Pattern length in characters.
    pub length: usize,
    pub quantifiers: usize,
    /// Occurrences of the most frequent advanced construct.
    pub max_advanced_construct: usize,
    pub escaped_characters: usize,
    pub classes_and_alternations: usize,
    /// Share of the pattern taken by `.*` and `.+`.
    pub wildcard_ratio: f64,
}

impl RegexMetrics {
    pub fn of(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut quantifiers = 0;
        let mut escaped_characters = 0;
        let mut classes_and_alternations = 0;
        let mut wildcard_chars = 0;
        let mut in_class = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\\' => {
                    escaped_characters += 1;
                    i += 2;
                    continue;
                }
                '[' if !in_class => {
                    in_class = true;
                    classes_and_alternations += 1;
                }
                ']' if in_class => in_class = false,
                _ if in_class => {}
                '|' => classes_and_alternations += 1,
                '*' | '+' => {
                    quantifiers += 1;
                    if i > 0 && chars[i - 1] == '.' && !is_escaped(&chars, i - 1) {
                        wildcard_chars += 2;
                    }
                }
                // `(?` opens a group; `?` after a quantifier makes it lazy
                '?' if i > 0 && (chars[i - 1] == '(' || is_quantifier_end(chars[i - 1])) => {}
                '?' => quantifiers += 1,
                '{' if counted_repetition_len(&chars[i..]).is_some() => quantifiers += 1,
                _ => {}
            }
            i += 1;
        }

        let max_advanced_construct = ADVANCED_CONSTRUCTS
            .iter()
            .map(|construct| pattern.matches(construct).count())
            .max()
            .unwrap_or(0);

        let length = chars.len();
        let wildcard_ratio = if length == 0 {
            0.0
        } else {
            wildcard_chars as f64 / length as f64
        };

        Self {
            length,
            quantifiers,
            max_advanced_construct,
            escaped_characters,
            classes_and_alternations,
            wildcard_ratio,
        }
    }
}

fn is_escaped(chars: &[char], index: usize) -> bool {
    let backslashes = chars[..index].iter().rev().take_while(|&&c| c == '\\').count();
    backslashes % 2 == 1
}

fn is_quantifier_end(c: char) -> bool {
    matches!(c, '*' | '+' | '?' | '}')
}

/// Length of a `{n}`, `{n,}` or `{n,m}` repetition at the start of `chars`.
fn counted_repetition_len(chars: &[char]) -> Option<usize> {
    let close = chars.iter().position(|&c| c == '}')?;
    let inner = &chars[1..close];
    let valid = !inner.is_empty()
        && inner[0].is_ascii_digit()
        && inner.iter().all(|c| c.is_ascii_digit() || *c == ',')
        && inner.iter().filter(|&&c| c == ',').count() <= 1;
    valid.then_some(close + 1)
}
