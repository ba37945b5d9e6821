//! Prompt construction for the three model-backed stages.

use yarasmith_core::ThreatDescriptor;

/// Builder for rule generation, rule correction and regex synthesis prompts.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    author: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            author: "yarasmith".to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Author recorded in master rule metadata.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Prompt asking for a YARA rule that detects reuse of a threat.
    pub fn build_rule_generation_prompt(&self, descriptor: &ThreatDescriptor) -> String {
        format!(
            r#"I'm parsing threat investigations (e.g. exploits) and want to create YARA rules to detect them.

## Task

Suggest a solid YARA rule that detects re-usage of this threat in the wild, for example by matching shellcode bytes or distinctive strings. It may be very specific, but never include placeholders such as server.com, your_ip or your_IMPHASH in string definitions.

## Requirements

- The meta section contains only the keys description, reference and cve_id.
- The rule name is exactly {rule_name}. Do not use sub-rule syntax with a colon.
- Do not require a specific starting byte or offset.
- Do not reference anything the reader must replace.
- Respond with the final YARA rule only.

## Threat Description

{body}"#,
            rule_name = descriptor.rule_name(),
            body = descriptor.body,
        )
    }

    /// Prompt asking the model to repair a rule the checker rejected.
    pub fn build_correction_prompt(&self, rule_text: &str, diagnostic: &str) -> String {
        format!(
            r#"The following YARA rule has a syntax error:

{rule_text}

The syntax error is: {diagnostic}

Please fix the YARA rule. If there are references to the pe module or undefined identifiers, remove them. If the rule has an incomplete CVE ID in the meta-data, remove it. Respond with the final YARA rule only."#,
            rule_text = rule_text,
            diagnostic = diagnostic.trim(),
        )
    }

    /// Prompt asking for one regex that generalizes a set of strings.
    pub fn build_regex_prompt(&self, values: &[&str]) -> String {
        let listed = values
            .iter()
            .map(|v| format!("- {v}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"I need a regular expression that matches all of the following strings:

{listed}

The regex must be concise, fast to evaluate and keep false positives low, as it will be used in a security product. Use syntax supported by the Rust regex crate (no look-around, no backreferences).

Output only the regex inside a ``` code block. No explanation."#,
        )
    }

    /// Prompt asking the model to polish an assembled master rule.
    pub fn build_master_rule_prompt(&self, rule_text: &str, date: &str) -> String {
        format!(
            r#"Please revise the following YARA rule and suggest an improved version.

## Requirements

- Include the meta-data fields author = "{author}", date = "{date}" and version = "1.0".
- Add a description meta-data field with an educated guess of the threat the regex patterns target.
- You may choose a better rule name but keep the timestamp and sequence number.
- Keep every regex string unchanged and do not use the fullword modifier.
- Respond with the final YARA rule only.

{rule_text}"#,
            author = self.author,
            date = date,
            rule_text = rule_text,
        )
    }
}
