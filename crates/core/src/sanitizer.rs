use std::collections::{BTreeSet, HashSet};

use serde_json::Value;

const MASK: &str = "***";

/// Replaces the value of any field whose name matches the redaction policy,
/// case-insensitively and at any nesting depth.
#[derive(Clone, Debug, Default)]
pub struct Sanitizer {
    fields: HashSet<String>,
}

impl Sanitizer {
    pub fn new(redact_fields: &BTreeSet<String>) -> Self {
        let fields = redact_fields.iter().map(|field| field.to_ascii_lowercase()).collect();
        Self { fields }
    }

    pub fn sanitize(&self, value: &Value) -> Value {
        match value {
            Value::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, nested)| {
                        if self.fields.contains(&key.to_ascii_lowercase()) {
                            (key.clone(), Value::String(MASK.to_string()))
                        } else {
                            (key.clone(), self.sanitize(nested))
                        }
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|item| self.sanitize(item)).collect()),
            other => other.clone(),
        }
    }
}
