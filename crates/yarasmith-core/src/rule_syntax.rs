//! Scanner for the parts of YARA rule text the pipeline inspects: the string
//! definitions and the condition.
//!
//! This is not a YARA parser. Rules reaching it have already been accepted by
//! the syntax checker; the scanner only has to find literals reliably and
//! notice text it cannot make sense of.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

// Section keywords are looked up at line start first so meta values that
// mention them do not shadow the real section.
static STRINGS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*strings\s*:").expect("valid strings section regex"));
static STRINGS_INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bstrings\s*:").expect("valid strings section regex"));
static CONDITION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*condition\s*:").expect("valid condition section regex"));
static CONDITION_INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcondition\s*:").expect("valid condition section regex"));

fn section_end(text: &str, line: &Regex, inline: &Regex) -> Option<usize> {
    line.find(text).or_else(|| inline.find(text)).map(|m| m.end())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("missing condition section")]
    MissingCondition,

    #[error("unterminated text literal {0}")]
    UnterminatedText(String),

    #[error("unterminated hex literal {0}")]
    UnterminatedHex(String),

    #[error("unterminated regex literal {0}")]
    UnterminatedRegex(String),

    #[error("unexpected '{found}' at offset {offset}")]
    UnexpectedToken { found: char, offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Text,
    Hex,
    Regex,
}

/// One `$identifier = <literal> [modifiers]` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringDefinition {
    pub identifier: String,
    pub kind: LiteralKind,
    /// Decoded text, normalized hex bytes, or the raw regex body.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub strings: Vec<StringDefinition>,
    /// Condition text without the closing brace of the rule.
    pub condition: String,
}

pub fn parse_rule(text: &str) -> Result<ParsedRule, RuleParseError> {
    let (strings, condition_start) = match section_end(text, &STRINGS_LINE, &STRINGS_INLINE) {
        Some(start) => {
            let mut scanner = Scanner::new(text, start);
            let strings = scanner.string_definitions()?;
            (strings, scanner.pos)
        }
        None => {
            let start = section_end(text, &CONDITION_LINE, &CONDITION_INLINE)
                .ok_or(RuleParseError::MissingCondition)?;
            (Vec::new(), start)
        }
    };

    let rest = &text[condition_start..];
    let condition = match rest.rfind('}') {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    };

    Ok(ParsedRule {
        strings,
        condition: condition.to_string(),
    })
}

/// Normalize a hex literal body to upper-case, single-space separated tokens.
///
/// Jumps (`[2-4]`) stay whole, `~` binds to the byte it negates, and
/// alternation punctuation becomes its own token.
pub fn normalize_hex(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '[' => {
                let end = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| i + p + 1)
                    .unwrap_or(chars.len());
                tokens.push(chars[i..end].iter().collect::<String>());
                i = end;
            }
            '(' | ')' | '|' => {
                tokens.push(chars[i].to_string());
                i += 1;
            }
            '~' => {
                let end = (i + 3).min(chars.len());
                tokens.push(chars[i..end].iter().collect::<String>().to_uppercase());
                i = end;
            }
            _ => {
                let end = (i + 2).min(chars.len());
                tokens.push(chars[i..end].iter().collect::<String>().to_uppercase());
                i = end;
            }
        }
    }

    tokens.join(" ")
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn unexpected(&self) -> RuleParseError {
        match self.peek() {
            // the rule closed before a condition section started
            None | Some('}') => RuleParseError::MissingCondition,
            Some(found) => RuleParseError::UnexpectedToken {
                found,
                offset: self.pos,
            },
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = &self.src[self.pos..];
            if rest.starts_with("//") {
                self.pos += rest.find('\n').unwrap_or(rest.len());
            } else if rest.starts_with("/*") {
                self.pos += rest.find("*/").map(|p| p + 2).unwrap_or(rest.len());
            } else if self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            } else {
                return;
            }
        }
    }

    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// Scan definitions up to and including `condition:`.
    fn string_definitions(&mut self) -> Result<Vec<StringDefinition>, RuleParseError> {
        let mut definitions = Vec::new();

        loop {
            self.skip_trivia();
            match self.peek() {
                Some('$') => {
                    self.bump();
                    let identifier = format!("${}", self.word());
                    definitions.push(self.definition(identifier)?);
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    let start = self.pos;
                    if self.word() == "condition" {
                        self.skip_trivia();
                        if self.peek() == Some(':') {
                            self.bump();
                            return Ok(definitions);
                        }
                    }
                    self.pos = start;
                    return Err(self.unexpected());
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn definition(&mut self, identifier: String) -> Result<StringDefinition, RuleParseError> {
        self.skip_trivia();
        if self.peek() != Some('=') {
            return Err(self.unexpected());
        }
        self.bump();
        self.skip_trivia();

        let (kind, value) = match self.peek() {
            Some('"') => (LiteralKind::Text, self.text_literal(&identifier)?),
            Some('{') => (LiteralKind::Hex, self.hex_literal(&identifier)?),
            Some('/') => (LiteralKind::Regex, self.regex_literal(&identifier)?),
            _ => return Err(self.unexpected()),
        };
        self.skip_modifiers();

        Ok(StringDefinition {
            identifier,
            kind,
            value,
        })
    }

    fn text_literal(&mut self, identifier: &str) -> Result<String, RuleParseError> {
        let unterminated = || RuleParseError::UnterminatedText(identifier.to_string());
        self.bump();
        let mut value = String::new();

        loop {
            match self.bump().ok_or_else(unterminated)? {
                '"' => return Ok(value),
                '\n' => return Err(unterminated()),
                '\\' => match self.bump().ok_or_else(unterminated)? {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    'x' => {
                        let digits: String = (0..2).filter_map(|_| self.bump()).collect();
                        match u8::from_str_radix(&digits, 16) {
                            Ok(byte) => value.push(char::from(byte)),
                            Err(_) => {
                                value.push_str("\\x");
                                value.push_str(&digits);
                            }
                        }
                    }
                    c @ ('"' | '\\') => value.push(c),
                    c => {
                        value.push('\\');
                        value.push(c);
                    }
                },
                c => value.push(c),
            }
        }
    }

    fn hex_literal(&mut self, identifier: &str) -> Result<String, RuleParseError> {
        self.bump();
        let start = self.pos;
        let len = self.src[start..]
            .find('}')
            .ok_or_else(|| RuleParseError::UnterminatedHex(identifier.to_string()))?;
        self.pos = start + len + 1;
        Ok(normalize_hex(&self.src[start..start + len]))
    }

    fn regex_literal(&mut self, identifier: &str) -> Result<String, RuleParseError> {
        let unterminated = || RuleParseError::UnterminatedRegex(identifier.to_string());
        self.bump();
        let start = self.pos;

        loop {
            match self.bump().ok_or_else(unterminated)? {
                '/' => break,
                '\n' => return Err(unterminated()),
                '\\' => {
                    self.bump().ok_or_else(unterminated)?;
                }
                _ => {}
            }
        }
        let body = self.src[start..self.pos - 1].to_string();
        // trailing flags such as /i or /is
        self.word();
        Ok(body)
    }

    /// Skip `nocase wide xor(0x01-0xff) base64("...")` and similar.
    fn skip_modifiers(&mut self) {
        loop {
            self.skip_trivia();
            if !self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                return;
            }
            let start = self.pos;
            if self.word() == "condition" {
                self.pos = start;
                return;
            }
            if self.peek() == Some('(') {
                self.skip_arguments();
            }
        }
    }

    fn skip_arguments(&mut self) {
        let mut in_quotes = false;
        while let Some(c) = self.bump() {
            match c {
                '\\' if in_quotes => {
                    self.bump();
                }
                '"' => in_quotes = !in_quotes,
                ')' if !in_quotes => return,
                _ => {}
            }
        }
    }
}
