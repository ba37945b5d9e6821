//! Helpers for working with raw YARA rule text and model responses.

use std::sync::LazyLock;

use regex::Regex;

/// Fragments that show a model answered with a template instead of a rule.
const PLACEHOLDER_FRAGMENTS: &[&str] = &[
    "No suitable response",
    "Shellcode bytes here",
    "/* bytes of the shellcode */",
    "$someString",
    "$string1",
    "$data",
    "CHANGE_ME",
    "{ ? ? ? ? }",
    "{ DD DD DD DD }",
    "$hashValue",
    "hash_here",
    "$ip",
    "ip_address_here",
    "domain.com",
    "url_here",
    "/regex_pattern/",
    "$regex",
    "$filePath",
    "filepath_here",
    "$filename",
    "filename.exe",
    "your_IMPHASH",
    "$imphash",
    "CVE-XXXX-XXXX",
    "CVE-????-????",
    "$condition",
    "condition_here",
];

/// Literal values that carry no signal.
const TRASH_STRING_FRAGMENTS: &[&str] = &[
    "interesting string",
    "INSERT INTERESTING STRING",
    "shellcode bytes",
];

static CVE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CVE-(\d{4})-\d+").expect("valid CVE regex"));

/// Cut the rule block out of a model response: from the first `rule ` to the
/// last closing brace. Falls back to the trimmed response.
pub fn extract_rule_block(response: &str) -> String {
    match (response.find("rule "), response.rfind('}')) {
        (Some(start), Some(end)) if end >= start => response[start..=end].trim().to_string(),
        _ => response.trim().to_string(),
    }
}

pub fn is_unacceptable_rule_response(text: &str) -> bool {
    PLACEHOLDER_FRAGMENTS
        .iter()
        .any(|fragment| text.contains(fragment))
}

pub fn is_unacceptable_string(value: &str) -> bool {
    TRASH_STRING_FRAGMENTS
        .iter()
        .any(|fragment| value.contains(fragment))
}

/// Year of the first complete CVE identifier in the text.
pub fn cve_year(text: &str) -> Option<u16> {
    CVE_YEAR
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
