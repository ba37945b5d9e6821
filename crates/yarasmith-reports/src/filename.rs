/// File name for a stored rule, derived from its descriptor id.
///
/// Path separators and characters that are unsafe on common filesystems are
/// replaced, so two ids only collide if they differ in those characters.
pub fn rule_filename(descriptor_id: &str) -> String {
    let cleaned = descriptor_id
        .trim()
        .replace(std::path::MAIN_SEPARATOR, "-")
        .replace('/', "-")
        .replace('\\', "-")
        .replace("..", "dotdot")
        .replace(':', "_")
        .replace('*', "_")
        .replace('?', "_")
        .replace('<', "_")
        .replace('>', "_")
        .replace('|', "_")
        .replace('"', "_");

    let cleaned = if cleaned.is_empty() {
        "rule".to_string()
    } else {
        cleaned
    };

    format!("{}.yar", cleaned)
}

/// Descriptor id of a stored rule file name (the inverse of [`rule_filename`]
/// for ids without replaced characters).
pub fn descriptor_id_from_filename(filename: &str) -> &str {
    filename.strip_suffix(".yar").unwrap_or(filename)
}

/// `master_regex_rule_<timestamp>_<seq>.yar`, with `seq` counting from 1.
pub fn master_rule_filename(timestamp: &str, sequence: usize) -> String {
    format!("{}.yar", master_rule_name(timestamp, sequence))
}

pub fn master_rule_name(timestamp: &str, sequence: usize) -> String {
    format!("master_regex_rule_{}_{}", timestamp, sequence)
}
