//! Table catalogue of the memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dynorm_model::StoreError;
use dynorm_model::input::CreateTableInput;
use dynorm_model::types::{
    AttributeDefinition, GlobalSecondaryIndex, KeySchemaElement, LocalSecondaryIndex,
    ProvisionedThroughput, TableDescription, TableStatus,
};

use crate::storage::{KeySchema, StorageError, TableStorage};

/// All tables, keyed by name.
#[derive(Debug, Default)]
pub struct MemoryState {
    tables: DashMap<String, Arc<MemoryTable>>,
}

impl MemoryState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<Arc<MemoryTable>> {
        self.tables.get(name).map(|r| Arc::clone(r.value()))
    }

    /// Get a table or fail with `ResourceNotFoundException`.
    pub fn require_table(&self, name: &str) -> Result<Arc<MemoryTable>, StoreError> {
        self.get_table(name).ok_or_else(|| {
            StoreError::resource_not_found(format!(
                "Requested resource not found: Table: {name} not found"
            ))
        })
    }

    /// Insert a new table; an existing name fails with `ResourceInUseException`.
    pub fn create_table(&self, table: MemoryTable) -> Result<Arc<MemoryTable>, StoreError> {
        match self.tables.entry(table.name.clone()) {
            Entry::Occupied(e) => Err(StoreError::resource_in_use(format!(
                "Table already exists: {}",
                e.key()
            ))),
            Entry::Vacant(e) => Ok(Arc::clone(e.insert(Arc::new(table)).value())),
        }
    }

    /// Table names in ascending order.
    #[must_use]
    pub fn list_table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }
}

/// A table with its metadata and items.
#[derive(Debug)]
pub struct MemoryTable {
    pub name: String,
    /// Describe calls left that still report `CREATING`.
    pending_polls: AtomicU32,
    pub key_schema_elements: Vec<KeySchemaElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub provisioned_throughput: Option<ProvisionedThroughput>,
    pub gsi_definitions: Vec<GlobalSecondaryIndex>,
    pub lsi_definitions: Vec<LocalSecondaryIndex>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub storage: TableStorage,
}

impl MemoryTable {
    /// Build a table from a create request.
    ///
    /// Every key attribute of the table and its indexes must have an
    /// attribute definition.
    pub fn from_input(input: CreateTableInput, activation_polls: u32) -> Result<Self, StorageError> {
        let key_schema = KeySchema::from_elements(&input.key_schema, &input.attribute_definitions)?;
        let index_keys = input
            .global_secondary_indexes
            .iter()
            .map(|g| &g.key_schema)
            .chain(input.local_secondary_indexes.iter().map(|l| &l.key_schema));
        for elements in index_keys {
            KeySchema::from_elements(elements, &input.attribute_definitions)?;
        }

        Ok(Self {
            name: input.table_name,
            pending_polls: AtomicU32::new(activation_polls),
            key_schema_elements: input.key_schema,
            attribute_definitions: input.attribute_definitions,
            provisioned_throughput: input.provisioned_throughput,
            gsi_definitions: input.global_secondary_indexes,
            lsi_definitions: input.local_secondary_indexes,
            created_at: chrono::Utc::now(),
            storage: TableStorage::new(key_schema),
        })
    }

    /// Status without consuming a poll.
    #[must_use]
    pub fn status(&self) -> TableStatus {
        if self.pending_polls.load(Ordering::Acquire) > 0 {
            TableStatus::Creating
        } else {
            TableStatus::Active
        }
    }

    /// Status as seen by one `DescribeTable` call; each call while the table
    /// is `CREATING` brings it one poll closer to `ACTIVE`.
    pub fn poll_status(&self) -> TableStatus {
        let before = self
            .pending_polls
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if before.is_ok() {
            TableStatus::Creating
        } else {
            TableStatus::Active
        }
    }

    /// Key schema of `index_name`, or of the table itself.
    pub fn key_schema_for(&self, index_name: Option<&str>) -> Result<KeySchema, StoreError> {
        let Some(index_name) = index_name else {
            return Ok(self.storage.key_schema().clone());
        };
        let elements = self
            .gsi_definitions
            .iter()
            .find(|g| g.index_name == index_name)
            .map(|g| &g.key_schema)
            .or_else(|| {
                self.lsi_definitions
                    .iter()
                    .find(|l| l.index_name == index_name)
                    .map(|l| &l.key_schema)
            })
            .ok_or_else(|| {
                StoreError::validation(format!(
                    "The table does not have the specified index: {index_name}"
                ))
            })?;
        KeySchema::from_elements(elements, &self.attribute_definitions)
            .map_err(|e| StoreError::validation(e.to_string()))
    }

    #[must_use]
    pub fn to_description(&self, status: TableStatus) -> TableDescription {
        #[allow(clippy::cast_precision_loss)]
        let creation_time = self.created_at.timestamp_millis() as f64 / 1000.0;
        TableDescription {
            table_name: Some(self.name.clone()),
            table_status: Some(status),
            key_schema: self.key_schema_elements.clone(),
            attribute_definitions: self.attribute_definitions.clone(),
            item_count: Some(i64::try_from(self.storage.item_count()).unwrap_or(i64::MAX)),
            creation_date_time: Some(creation_time),
            provisioned_throughput: self.provisioned_throughput,
            global_secondary_indexes: self.gsi_definitions.clone(),
            local_secondary_indexes: self.lsi_definitions.clone(),
        }
    }
}
