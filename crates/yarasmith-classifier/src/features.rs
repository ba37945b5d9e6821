use log::debug;

use yarasmith_core::rule_syntax::{LiteralKind, StringDefinition, parse_rule};

/// Module references that make a rule depend on metadata instead of content.
const WEAK_INDICATORS: &[&str] = &["pe.imphash", "hash.sha256", "cuckoo."];

/// Structural features of a rule that feed the complexity score.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleFeatures {
    pub strings: Vec<StringDefinition>,
    /// Boolean clauses joined by `and`/`or`; at least 1.
    pub condition_clauses: usize,
    pub uses_all_of: bool,
    pub weak_indicator: Option<&'static str>,
}

impl RuleFeatures {
    pub fn from_text(rule_id: &str, text: &str) -> Self {
        let weak_indicator = WEAK_INDICATORS
            .iter()
            .copied()
            .find(|indicator| text.contains(indicator));

        match parse_rule(text) {
            Ok(parsed) => Self {
                strings: parsed.strings,
                condition_clauses: count_clauses(&parsed.condition),
                uses_all_of: uses_all_of(&parsed.condition),
                weak_indicator,
            },
            Err(e) => {
                debug!("Scoring {} without structure: {}", rule_id, e);
                Self {
                    condition_clauses: 1,
                    weak_indicator,
                    ..Self::default()
                }
            }
        }
    }

    pub fn literal_weight(kind: LiteralKind) -> f64 {
        match kind {
            LiteralKind::Hex => 3.0,
            LiteralKind::Text => 1.0,
            LiteralKind::Regex => 0.5,
        }
    }
}

/// Words of the condition outside quoted and regex literals.
fn condition_words(condition: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = condition.chars();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' => quote = Some('"'),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '$' => current.push(c),
            _ => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn count_clauses(condition: &str) -> usize {
    1 + condition_words(condition)
        .iter()
        .filter(|w| *w == "and" || *w == "or")
        .count()
}

fn uses_all_of(condition: &str) -> bool {
    condition_words(condition)
        .windows(2)
        .any(|pair| pair[0] == "all" && pair[1] == "of")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_counting() {
        assert_eq!(count_clauses("true"), 1);
        assert_eq!(count_clauses("$a and ($b or $c)"), 3);
        assert_eq!(count_clauses("$a and \"and or\" == \"x\""), 2);
    }

    #[test]
    fn test_all_of_detection() {
        assert!(uses_all_of("uint16(0) == 0x5A4D and all of ($s*)"));
        assert!(!uses_all_of("any of them"));
        assert!(!uses_all_of("$call_of_duty"));
    }

    #[test]
    fn test_weak_indicator_detected() {
        let text = "import \"pe\"\nrule a { condition: pe.imphash() == \"abc\" }";
        let features = RuleFeatures::from_text("a", text);
        assert_eq!(features.weak_indicator, Some("pe.imphash"));
        assert!(features.strings.is_empty());
    }

    #[test]
    fn test_unparseable_rule_has_no_strings() {
        let features = RuleFeatures::from_text("a", "rule a { strings: $a = \"x");
        assert!(features.strings.is_empty());
        assert_eq!(features.condition_clauses, 1);
    }
}
