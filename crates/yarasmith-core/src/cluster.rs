//! Extracted strings and similarity clusters.

use serde::{Deserialize, Serialize};

/// Upper bound (inclusive) of the short length class.
pub const SHORT_STRING_MAX_LEN: usize = 20;
/// Upper bound (inclusive) of the medium length class.
pub const MEDIUM_STRING_MAX_LEN: usize = 100;

/// Character make-up of a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharsetClass {
    /// Hex byte sequence taken from a `{ .. }` literal.
    Hex,
    Alphanumeric,
    Printable,
    Binary,
}

impl CharsetClass {
    pub fn of_text(value: &str) -> Self {
        if value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            CharsetClass::Alphanumeric
        } else if value.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
            CharsetClass::Printable
        } else {
            CharsetClass::Binary
        }
    }
}

/// Length bucket; clustering never compares strings across buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthClass {
    Short,
    Medium,
    Long,
}

impl LengthClass {
    pub fn of_len(len: usize) -> Self {
        if len <= SHORT_STRING_MAX_LEN {
            LengthClass::Short
        } else if len <= MEDIUM_STRING_MAX_LEN {
            LengthClass::Medium
        } else {
            LengthClass::Long
        }
    }
}

/// A literal pulled out of an acceptable rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtractedString {
    pub value: String,
    pub rule_id: String,
    pub length: usize,
    pub charset: CharsetClass,
}

impl ExtractedString {
    pub fn new(value: impl Into<String>, rule_id: impl Into<String>, charset: CharsetClass) -> Self {
        let value = value.into();
        Self {
            length: value.chars().count(),
            value,
            rule_id: rule_id.into(),
            charset,
        }
    }

    /// Text literal whose charset is inferred from its content.
    pub fn text(value: impl Into<String>, rule_id: impl Into<String>) -> Self {
        let value = value.into();
        let charset = CharsetClass::of_text(&value);
        Self::new(value, rule_id, charset)
    }

    pub fn length_class(&self) -> LengthClass {
        LengthClass::of_len(self.length)
    }
}

/// Strings judged similar enough to share one generalized pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringCluster {
    pub id: usize,
    pub length_class: LengthClass,
    pub representative: String,
    pub members: Vec<ExtractedString>,
}

impl StringCluster {
    /// Member values without duplicates, in first-seen order.
    pub fn distinct_values(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.members
            .iter()
            .map(|m| m.value.as_str())
            .filter(|v| seen.insert(*v))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_classification() {
        assert_eq!(CharsetClass::of_text("malware_v1"), CharsetClass::Alphanumeric);
        assert_eq!(CharsetClass::of_text("cmd.exe /c whoami"), CharsetClass::Printable);
        assert_eq!(CharsetClass::of_text("a\u{1}b"), CharsetClass::Binary);
    }

    #[test]
    fn test_length_class_boundaries() {
        assert_eq!(LengthClass::of_len(20), LengthClass::Short);
        assert_eq!(LengthClass::of_len(21), LengthClass::Medium);
        assert_eq!(LengthClass::of_len(100), LengthClass::Medium);
        assert_eq!(LengthClass::of_len(101), LengthClass::Long);
    }

    #[test]
    fn test_distinct_values_keeps_order() {
        let cluster = StringCluster {
            id: 0,
            length_class: LengthClass::Short,
            representative: "abc1".to_string(),
            members: vec![
                ExtractedString::text("abc1", "r1"),
                ExtractedString::text("abc1", "r2"),
                ExtractedString::text("abc2", "r2"),
            ],
        };
        assert_eq!(cluster.distinct_values(), vec!["abc1", "abc2"]);
        assert_eq!(cluster.len(), 3);
    }
}
