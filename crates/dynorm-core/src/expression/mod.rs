//! Filter compilation into key-condition and filter expressions.
//!
//! The pipeline is:
//!
//! 1. **Classify**: every `where` attribute is matched against the schema's
//!    primary and index keys.
//! 2. **Render**: conditions become fragments over `#Name`/`:value`
//!    placeholders.
//! 3. **Select**: one hash fragment, at most one range fragment and at most
//!    one index are kept as the key condition; everything else is filtered
//!    after the read.

pub mod compiler;
pub mod placeholder;

use std::collections::{BTreeMap, HashMap};

use dynorm_model::AttributeValue;
use dynorm_model::input::{QueryInput, ScanInput};
use serde_json::Value;

use crate::marshal::to_attribute_value;

pub use compiler::{compile_query, compile_scan, plan};
pub use placeholder::Placeholders;

/// A compiled filter, ready to be sent as a `Query` or a `Scan`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionDescriptor {
    /// Secondary index to read from; `None` reads the table itself.
    pub index_name: Option<String>,
    /// `#H = :h` on the selected partition key.
    pub hash_condition: Option<String>,
    /// Comparison on the selected sort key.
    pub range_condition: Option<String>,
    /// Post-read predicates, joined with `AND`.
    pub filter_parts: Vec<String>,
    /// `#P` -> attribute name.
    pub names: BTreeMap<String, String>,
    /// `:p` -> value.
    pub values: BTreeMap<String, Value>,
}

impl ExpressionDescriptor {
    /// Whether a secondary index is selected.
    #[must_use]
    pub fn uses_index(&self) -> bool {
        self.index_name.is_some()
    }

    /// Key-condition fragments, hash first.
    #[must_use]
    pub fn key_condition_parts(&self) -> Vec<&str> {
        self.hash_condition
            .iter()
            .chain(self.range_condition.iter())
            .map(String::as_str)
            .collect()
    }

    /// The key-condition expression, if any key fragment was produced.
    #[must_use]
    pub fn key_condition_expression(&self) -> Option<String> {
        let parts = self.key_condition_parts();
        (!parts.is_empty()).then(|| parts.join(" AND "))
    }

    /// The filter expression.
    ///
    /// Only present when more attributes were named than key fragments
    /// produced.
    #[must_use]
    pub fn filter_expression(&self) -> Option<String> {
        let key_parts = self.key_condition_parts().len();
        (self.names.len() > key_parts && !self.filter_parts.is_empty())
            .then(|| self.filter_parts.join(" AND "))
    }

    fn attribute_values(&self) -> HashMap<String, AttributeValue> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), to_attribute_value(v)))
            .collect()
    }

    fn attribute_names(&self) -> HashMap<String, String> {
        self.names
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// First-page `Query` request for `table`.
    #[must_use]
    pub fn to_query_input(&self, table: &str) -> QueryInput {
        QueryInput {
            table_name: table.to_owned(),
            index_name: self.index_name.clone(),
            key_condition_expression: self.key_condition_expression(),
            filter_expression: self.filter_expression(),
            expression_attribute_names: self.attribute_names(),
            expression_attribute_values: self.attribute_values(),
            ..Default::default()
        }
    }

    /// First-page `Scan` request for `table`.
    #[must_use]
    pub fn to_scan_input(&self, table: &str) -> ScanInput {
        ScanInput {
            table_name: table.to_owned(),
            index_name: self.index_name.clone(),
            filter_expression: self.filter_expression(),
            expression_attribute_names: self.attribute_names(),
            expression_attribute_values: self.attribute_values(),
            ..Default::default()
        }
    }
}

/// How a filter will be executed.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Indexed lookup on a partition.
    Query(ExpressionDescriptor),
    /// Full table scan with post-read filtering.
    Scan(ExpressionDescriptor),
}

impl QueryPlan {
    #[must_use]
    pub fn descriptor(&self) -> &ExpressionDescriptor {
        match self {
            Self::Query(d) | Self::Scan(d) => d,
        }
    }

    #[must_use]
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}
