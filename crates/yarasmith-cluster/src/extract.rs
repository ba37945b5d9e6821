use std::collections::HashSet;

use yarasmith_core::rule_syntax::{LiteralKind, parse_rule};
use yarasmith_core::rule_text::is_unacceptable_string;
use yarasmith_core::{CharsetClass, ExtractedString, MalformedRule};

/// Pull text and hex literals out of an accepted rule.
///
/// Regex literals are ignored. Values shorter than `min_len` characters or
/// containing filler text are dropped, and repeated values collapse to the
/// first occurrence.
pub fn extract_strings(
    rule_id: &str,
    rule_text: &str,
    min_len: usize,
) -> Result<Vec<ExtractedString>, MalformedRule> {
    let parsed = parse_rule(rule_text).map_err(|e| MalformedRule::new(rule_id, e.to_string()))?;

    let mut seen = HashSet::new();
    let mut extracted = Vec::new();

    for definition in parsed.strings {
        let charset = match definition.kind {
            LiteralKind::Text => CharsetClass::of_text(&definition.value),
            LiteralKind::Hex => CharsetClass::Hex,
            LiteralKind::Regex => continue,
        };

        if definition.value.chars().count() < min_len || is_unacceptable_string(&definition.value) {
            continue;
        }
        if !seen.insert(definition.value.clone()) {
            continue;
        }

        extracted.push(ExtractedString::new(definition.value, rule_id, charset));
    }

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: &str = r#"rule exploit_12 {
    meta:
        cve_id = "CVE-2021-44228"
    strings:
        $jndi = "${jndi:ldap://" nocase
        $jndi_dup = "${jndi:ldap://"
        $short = "ab"
        $mz = { 4d 5a 90 00 03 }
        $re = /\$\{jndi:(ldap|rmi)/
        $filler = "INSERT INTERESTING STRING HERE"
        $bin = "\x00\x01payload"
    condition:
        any of them
}"#;

    #[test]
    fn test_extracts_text_and_hex() {
        let strings = extract_strings("exploit_12", RULE, 4).unwrap();
        let values: Vec<_> = strings.iter().map(|s| (s.value.as_str(), s.charset)).collect();

        assert_eq!(
            values,
            vec![
                ("${jndi:ldap://", CharsetClass::Printable),
                ("4D 5A 90 00 03", CharsetClass::Hex),
                ("\u{0}\u{1}payload", CharsetClass::Binary),
            ]
        );
        assert!(strings.iter().all(|s| s.rule_id == "exploit_12"));
        assert_eq!(strings[0].length, 14);
    }

    #[test]
    fn test_rule_without_strings_yields_nothing() {
        let strings = extract_strings("r", "rule r { condition: filesize < 10 }", 4).unwrap();
        assert!(strings.is_empty());
    }

    #[test]
    fn test_malformed_rule() {
        let err = extract_strings("r", "rule r { strings: $a = \"never closed", 4).unwrap_err();
        assert_eq!(err.rule_id, "r");
        assert!(err.reason.contains("unterminated text literal $a"));

        let err = extract_strings("r", "rule r { strings: $a = \"abcdef\" }", 4).unwrap_err();
        assert_eq!(err.reason, "missing condition section");
    }
}
