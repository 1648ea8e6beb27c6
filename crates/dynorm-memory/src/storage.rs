//! Item storage for a single table.
//!
//! ```text
//! DashMap<hash key, BTreeMap<range key, Item>>
//! ```
//!
//! Different partitions are read and written without contention. Inside a
//! partition items stay ordered by range key; tables without a range key use
//! [`SortableAttributeValue::Sentinel`] as the single map key.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use dashmap::DashMap;
use dynorm_model::types::{AttributeDefinition, KeySchemaElement, KeyType, ScalarAttributeType};
use dynorm_model::{AttributeValue, Item};
use thiserror::Error;
use tracing::trace;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("One of the required keys was not given a value: {attr}")]
    MissingKeyAttribute { attr: String },

    #[error("Type mismatch for key {attr}: expected {expected}, got {actual}")]
    InvalidKeyType {
        attr: String,
        expected: String,
        actual: String,
    },

    #[error("Key schema must contain exactly one HASH element, found {found}")]
    InvalidKeySchema { found: usize },

    #[error("No attribute definition for key attribute {attr}")]
    UndefinedKeyAttribute { attr: String },
}

// ---------------------------------------------------------------------------
// Key types
// ---------------------------------------------------------------------------

/// Hash and optional range attribute of a table or index.
#[derive(Debug, Clone)]
pub struct KeySchema {
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
}

#[derive(Debug, Clone)]
pub struct KeyAttribute {
    pub name: String,
    pub attr_type: ScalarAttributeType,
}

impl KeySchema {
    /// Resolve key schema elements against the table's attribute definitions.
    pub fn from_elements(
        elements: &[KeySchemaElement],
        definitions: &[AttributeDefinition],
    ) -> Result<Self, StorageError> {
        let resolve = |element: &KeySchemaElement| {
            definitions
                .iter()
                .find(|d| d.attribute_name == element.attribute_name)
                .map(|d| KeyAttribute {
                    name: d.attribute_name.clone(),
                    attr_type: d.attribute_type,
                })
                .ok_or_else(|| StorageError::UndefinedKeyAttribute {
                    attr: element.attribute_name.clone(),
                })
        };

        let hashes: Vec<_> = elements
            .iter()
            .filter(|e| e.key_type == KeyType::Hash)
            .collect();
        let [hash] = hashes.as_slice() else {
            return Err(StorageError::InvalidKeySchema {
                found: hashes.len(),
            });
        };
        let sort_key = elements
            .iter()
            .find(|e| e.key_type == KeyType::Range)
            .map(resolve)
            .transpose()?;
        Ok(Self {
            partition_key: resolve(hash)?,
            sort_key,
        })
    }

    /// Names of the key attributes, hash first.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.partition_key.name.as_str())
            .chain(self.sort_key.as_ref().map(|k| k.name.as_str()))
    }

    /// Copy only this schema's key attributes out of `item`.
    #[must_use]
    pub fn project_key(&self, item: &Item) -> Item {
        self.attribute_names()
            .filter_map(|name| item.get(name).map(|v| (name.to_owned(), v.clone())))
            .collect()
    }
}

/// The hash and optional range value that address one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimaryKey {
    pub partition_key: SortableAttributeValue,
    pub sort_key: Option<SortableAttributeValue>,
}

// ---------------------------------------------------------------------------
// SortableAttributeValue
// ---------------------------------------------------------------------------

/// A key-eligible value with a total order.
///
/// Strings order by UTF-8 bytes, numbers numerically (as `f64`) and binaries
/// byte by byte. `Sentinel` stands in for the range key of hash-only tables.
#[derive(Debug, Clone)]
pub enum SortableAttributeValue {
    S(String),
    N(String),
    B(bytes::Bytes),
    Sentinel,
}

impl SortableAttributeValue {
    pub fn from_attribute_value(
        attr_name: &str,
        value: &AttributeValue,
    ) -> Result<Self, StorageError> {
        match value {
            AttributeValue::S(s) => Ok(Self::S(s.clone())),
            AttributeValue::N(n) => Ok(Self::N(n.clone())),
            AttributeValue::B(b) => Ok(Self::B(b.clone())),
            other => Err(StorageError::InvalidKeyType {
                attr: attr_name.to_owned(),
                expected: "S, N, or B".to_owned(),
                actual: other.type_descriptor().to_owned(),
            }),
        }
    }

    fn parse_number(n: &str) -> f64 {
        n.parse::<f64>().unwrap_or(f64::NAN)
    }

    /// Cross-type order: strings, then numbers, then binaries.
    fn rank(&self) -> u8 {
        match self {
            Self::S(_) => 0,
            Self::N(_) => 1,
            Self::B(_) => 2,
            Self::Sentinel => 3,
        }
    }
}

impl PartialEq for SortableAttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortableAttributeValue {}

impl PartialOrd for SortableAttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortableAttributeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_type = self.rank().cmp(&other.rank());
        if by_type != Ordering::Equal {
            return by_type;
        }
        match (self, other) {
            (Self::S(a), Self::S(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::N(a), Self::N(b)) => Self::parse_number(a).total_cmp(&Self::parse_number(b)),
            (Self::B(a), Self::B(b)) => a.as_ref().cmp(b.as_ref()),
            _ => Ordering::Equal,
        }
    }
}

impl std::hash::Hash for SortableAttributeValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            // "5" and "5.0" are equal keys.
            Self::N(n) => state.write_u64(Self::parse_number(n).to_bits()),
            Self::S(s) => state.write(s.as_bytes()),
            Self::B(b) => state.write(b),
            Self::Sentinel => {}
        }
    }
}

// ---------------------------------------------------------------------------
// SortKeyCondition
// ---------------------------------------------------------------------------

/// Range key part of a key condition.
#[derive(Debug, Clone)]
pub enum SortKeyCondition {
    Eq(SortableAttributeValue),
    Lt(SortableAttributeValue),
    Le(SortableAttributeValue),
    Gt(SortableAttributeValue),
    Ge(SortableAttributeValue),
    Between(SortableAttributeValue, SortableAttributeValue),
    BeginsWith(String),
}

impl SortKeyCondition {
    #[must_use]
    pub fn matches(&self, value: &SortableAttributeValue) -> bool {
        match self {
            Self::Eq(v) => value == v,
            Self::Lt(v) => value < v,
            Self::Le(v) => value <= v,
            Self::Gt(v) => value > v,
            Self::Ge(v) => value >= v,
            Self::Between(lo, hi) => value >= lo && value <= hi,
            Self::BeginsWith(prefix) => {
                matches!(value, SortableAttributeValue::S(s) if s.starts_with(prefix.as_str()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TableStorage
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TableStorage {
    data: DashMap<SortableAttributeValue, BTreeMap<SortableAttributeValue, Item>>,
    key_schema: KeySchema,
    item_count: AtomicU64,
}

impl TableStorage {
    #[must_use]
    pub fn new(key_schema: KeySchema) -> Self {
        Self {
            data: DashMap::new(),
            key_schema,
            item_count: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn key_schema(&self) -> &KeySchema {
        &self.key_schema
    }

    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.item_count.load(AtomicOrdering::Relaxed)
    }

    /// Insert or replace an item, returning the replaced one.
    pub fn put_item(&self, item: Item) -> Result<Option<Item>, StorageError> {
        let key = extract_primary_key(&self.key_schema, &item)?;
        let sort_key = key.sort_key.unwrap_or(SortableAttributeValue::Sentinel);
        let old = self
            .data
            .entry(key.partition_key)
            .or_default()
            .insert(sort_key, item);
        if old.is_none() {
            self.item_count.fetch_add(1, AtomicOrdering::Relaxed);
        }
        trace!(replaced = old.is_some(), "item stored");
        Ok(old)
    }

    #[must_use]
    pub fn get_item(&self, key: &PrimaryKey) -> Option<Item> {
        let sort_key = key
            .sort_key
            .as_ref()
            .unwrap_or(&SortableAttributeValue::Sentinel);
        self.data
            .get(&key.partition_key)
            .and_then(|partition| partition.get(sort_key).cloned())
    }

    pub fn delete_item(&self, key: &PrimaryKey) -> Option<Item> {
        let sort_key = key
            .sort_key
            .as_ref()
            .unwrap_or(&SortableAttributeValue::Sentinel);
        let removed = {
            let mut partition = self.data.get_mut(&key.partition_key)?;
            partition.remove(sort_key)?
        };
        self.data
            .remove_if(&key.partition_key, |_, partition| partition.is_empty());
        self.item_count.fetch_sub(1, AtomicOrdering::Relaxed);
        Some(removed)
    }

    /// Items of one partition in range key order.
    #[must_use]
    pub fn partition_items(&self, partition_key: &SortableAttributeValue) -> Vec<Item> {
        self.data
            .get(partition_key)
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every item, ordered by hash key then range key.
    #[must_use]
    pub fn all_items(&self) -> Vec<Item> {
        let mut partitions: Vec<_> = self
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().values().cloned().collect::<Vec<_>>()))
            .collect();
        partitions.sort_by(|a, b| a.0.cmp(&b.0));
        partitions.into_iter().flat_map(|(_, items)| items).collect()
    }
}

// ---------------------------------------------------------------------------
// Key extraction
// ---------------------------------------------------------------------------

/// Read and type-check the key attributes of `item`.
pub fn extract_primary_key(key_schema: &KeySchema, item: &Item) -> Result<PrimaryKey, StorageError> {
    let read = |key: &KeyAttribute| {
        let value = item
            .get(&key.name)
            .ok_or_else(|| StorageError::MissingKeyAttribute {
                attr: key.name.clone(),
            })?;
        validate_key_type(&key.name, key.attr_type, value)?;
        SortableAttributeValue::from_attribute_value(&key.name, value)
    };
    Ok(PrimaryKey {
        partition_key: read(&key_schema.partition_key)?,
        sort_key: key_schema.sort_key.as_ref().map(read).transpose()?,
    })
}

/// Check that a key attribute has its declared scalar type.
pub fn validate_key_type(
    attr_name: &str,
    expected: ScalarAttributeType,
    value: &AttributeValue,
) -> Result<(), StorageError> {
    let ok = matches!(
        (expected, value),
        (ScalarAttributeType::S, AttributeValue::S(_))
            | (ScalarAttributeType::N, AttributeValue::N(_))
            | (ScalarAttributeType::B, AttributeValue::B(_))
    );
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKeyType {
            attr: attr_name.to_owned(),
            expected: expected.as_str().to_owned(),
            actual: value.type_descriptor().to_owned(),
        })
    }
}
