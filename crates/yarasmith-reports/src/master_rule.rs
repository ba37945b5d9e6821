//! Assembly of accepted patterns into master YARA rules.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::filename::{master_rule_filename, master_rule_name};

/// A generated master rule, before or after refinement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRule {
    pub name: String,
    pub filename: String,
    pub text: String,
    pub pattern_count: usize,
}

impl MasterRule {
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        let path = dir.join(&self.filename);
        fs::write(&path, &self.text).map_err(|e| StoreError::io(&path, e))?;
        Ok(path)
    }

    /// Same rule with different text, e.g. a refined version.
    pub fn with_text(&self, text: String) -> Self {
        Self {
            text,
            ..self.clone()
        }
    }
}

/// Escape a pattern for use inside a `/.../` YARA regex literal.
pub fn escape_regex_literal(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                escaped.push('\\');
                if let Some(next) = chars.next() {
                    escaped.push(next);
                }
            }
            '/' => escaped.push_str("\\/"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Split patterns into rules of at most `max_per_rule` strings each.
pub fn assemble_master_rules(patterns: &[String], max_per_rule: usize, now: DateTime<Utc>) -> Vec<MasterRule> {
    let timestamp = now.format("%Y%m%d%H%M%S").to_string();
    let date = now.format("%Y-%m-%d").to_string();

    patterns
        .chunks(max_per_rule.max(1))
        .enumerate()
        .map(|(index, chunk)| {
            let sequence = index + 1;
            let name = master_rule_name(&timestamp, sequence);
            let strings = chunk
                .iter()
                .enumerate()
                .map(|(i, pattern)| format!("        $re{} = /{}/", i, escape_regex_literal(pattern)))
                .collect::<Vec<_>>()
                .join("\n");

            let text = format!(
                r#"rule {name} {{
    meta:
        description = "Regex signatures synthesized from clusters of similar rule strings"
        date = "{date}"
        patterns = {count}
    strings:
{strings}
    condition:
        any of them
}}"#,
                name = name,
                date = date,
                count = chunk.len(),
                strings = strings,
            );

            MasterRule {
                filename: master_rule_filename(&timestamp, sequence),
                name,
                text,
                pattern_count: chunk.len(),
            }
        })
        .collect()
}
