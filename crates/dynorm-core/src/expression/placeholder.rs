//! Attribute-name and attribute-value placeholder allocation.
//!
//! Name placeholders are `#` plus the upper-cased leading characters of the
//! attribute name, lengthened until unique (`customerId` -> `#C`, then
//! `category` -> `#CA`). Value placeholders are `:` plus the attribute name.

use std::collections::BTreeMap;

use serde_json::Value;

/// Allocates placeholders for one expression.
#[derive(Debug, Default)]
pub struct Placeholders {
    /// `#P` -> attribute name.
    names: BTreeMap<String, String>,
    /// attribute name -> `#P`.
    by_attr: BTreeMap<String, String>,
    /// `:p` -> value.
    values: BTreeMap<String, Value>,
}

impl Placeholders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder for an attribute name, allocated on first use.
    pub fn name(&mut self, attr: &str) -> String {
        if let Some(existing) = self.by_attr.get(attr) {
            return existing.clone();
        }

        let stem: String = sanitize(attr).to_ascii_uppercase();
        let stem = if stem.is_empty() { "A".to_owned() } else { stem };

        let placeholder = (1..=stem.len())
            .map(|len| format!("#{}", &stem[..len]))
            .find(|candidate| !self.names.contains_key(candidate))
            .unwrap_or_else(|| {
                (1..)
                    .map(|n| format!("#{stem}{n}"))
                    .find(|candidate| !self.names.contains_key(candidate))
                    .unwrap_or_default()
            });

        self.names.insert(placeholder.clone(), attr.to_owned());
        self.by_attr.insert(attr.to_owned(), placeholder.clone());
        placeholder
    }

    /// Bind a value under `:<attr><suffix>` and return the placeholder.
    pub fn value(&mut self, attr: &str, suffix: &str, value: Value) -> String {
        let stem = sanitize(attr);
        let stem = if stem.is_empty() { "v".to_owned() } else { stem };
        let mut placeholder = format!(":{stem}{suffix}");
        let mut n = 1;
        while self.values.contains_key(&placeholder) {
            placeholder = format!(":{stem}{suffix}{n}");
            n += 1;
        }
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    /// Number of distinct attribute names.
    #[must_use]
    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// Consume into (names, values).
    #[must_use]
    pub fn into_maps(self) -> (BTreeMap<String, String>, BTreeMap<String, Value>) {
        (self.names, self.values)
    }
}

/// Placeholders only accept `[A-Za-z0-9_]`.
fn sanitize(attr: &str) -> String {
    attr.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
