//! Threat descriptors.

use serde::{Deserialize, Serialize};

/// A raw threat report used as the seed for rule generation.
///
/// The identifier is split into a textual prefix and a sequence number
/// (`exploit_1234` → `exploit`, `1234`), which is also how the generated
/// rule is named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatDescriptor {
    pub prefix: String,
    pub number: u64,
    pub body: String,
}

impl ThreatDescriptor {
    pub fn new(prefix: impl Into<String>, number: u64, body: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            number,
            body: body.into(),
        }
    }

    /// Stable identifier, also used to derive output file names.
    pub fn id(&self) -> String {
        format!("{}_{}", self.prefix, self.number)
    }

    /// Name the generated YARA rule is expected to carry.
    pub fn rule_name(&self) -> String {
        self.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_joins_prefix_and_number() {
        let descriptor = ThreatDescriptor::new("exploit", 51917, "body");
        assert_eq!(descriptor.id(), "exploit_51917");
        assert_eq!(descriptor.rule_name(), "exploit_51917");
    }
}
