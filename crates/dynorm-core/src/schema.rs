//! Model definitions and the resolved per-model schema.
//!
//! A model is declared as a JSON object of property specs:
//!
//! ```json
//! {
//!   "customerId": { "type": "string", "keyType": "hash" },
//!   "orderId":    { "type": "number", "keyType": "range" },
//!   "id":         { "type": "string", "keyType": "pk", "separator": "--x--" },
//!   "status":     { "type": "string", "index": { "global": { "rangeKey": "orderId", "project": true } } }
//! }
//! ```
//!
//! [`PropertySpec::parse_all`] turns that object into typed specs, and the
//! registry resolves them into an immutable [`ModelSchema`].

use std::collections::BTreeMap;
use std::time::Duration;

use dynorm_model::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, LocalSecondaryIndex,
    Projection, ProjectionType, ProvisionedThroughput, ScalarAttributeType,
};
use dynorm_model::input::CreateTableInput;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DefinitionError;

/// Reserved name of the externally visible identifier.
pub const ID_ATTRIBUTE: &str = "id";

/// Separator used by composite keys unless the `pk` property overrides it.
pub const DEFAULT_SEPARATOR: &str = "--x--";

const DEFAULT_READ_CAPACITY: i64 = 5;
const DEFAULT_WRITE_CAPACITY: i64 = 10;
const DEFAULT_STATUS_INTERVAL_MS: u64 = 5000;

// ---------------------------------------------------------------------------
// Property specs
// ---------------------------------------------------------------------------

/// Declared type of a model property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    /// Objects, arrays and anything else stored as-is.
    Json,
}

impl PropertyType {
    /// Parse a type name case-insensitively. Unknown names map to `Json`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            _ => Self::Json,
        }
    }

    /// Store type of a key attribute with this property type.
    ///
    /// Booleans are stored as strings and dates as epoch milliseconds.
    #[must_use]
    pub fn scalar_type(self) -> Option<ScalarAttributeType> {
        match self {
            Self::String | Self::Boolean => Some(ScalarAttributeType::S),
            Self::Number | Self::Date => Some(ScalarAttributeType::N),
            Self::Json => None,
        }
    }
}

/// Key role a property may claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Hash,
    Range,
    /// Composite identifier synthesized from hash and range.
    Pk,
}

/// Projection requested for a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProjectionSpec {
    #[default]
    KeysOnly,
    All,
    Include(Vec<String>),
}

impl ProjectionSpec {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Array(attrs)) => Self::Include(
                attrs
                    .iter()
                    .filter_map(|a| a.as_str().map(str::to_owned))
                    .collect(),
            ),
            Some(Value::Bool(false) | Value::Null) | None => Self::KeysOnly,
            Some(_) => Self::All,
        }
    }

    /// Wire projection.
    #[must_use]
    pub fn to_projection(&self) -> Projection {
        match self {
            Self::KeysOnly => Projection {
                projection_type: Some(ProjectionType::KeysOnly),
                non_key_attributes: Vec::new(),
            },
            Self::All => Projection {
                projection_type: Some(ProjectionType::All),
                non_key_attributes: Vec::new(),
            },
            Self::Include(attrs) => Projection {
                projection_type: Some(ProjectionType::Include),
                non_key_attributes: attrs.clone(),
            },
        }
    }
}

/// `index.local` of a property.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalIndexSpec {
    /// Overrides `<attr>LocalIndex`.
    pub name: Option<String>,
    pub project: ProjectionSpec,
}

/// `index.global` of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalIndexSpec {
    /// Overrides `<attr>GlobalIndex`.
    pub name: Option<String>,
    pub range_key: Option<String>,
    pub project: ProjectionSpec,
    pub throughput: ProvisionedThroughput,
}

/// One declared property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: String,
    pub kind: PropertyType,
    pub key_type: Option<KeyRole>,
    /// Generate a UUID when the value is missing (hash key only).
    pub uuid: bool,
    /// Composite key separator (`pk` only).
    pub separator: Option<String>,
    pub local_index: Option<LocalIndexSpec>,
    pub global_index: Option<GlobalIndexSpec>,
}

impl PropertySpec {
    /// A plain property of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            key_type: None,
            uuid: false,
            separator: None,
            local_index: None,
            global_index: None,
        }
    }

    /// Mark the property as a key.
    #[must_use]
    pub fn key(mut self, role: KeyRole) -> Self {
        self.key_type = Some(role);
        self
    }

    /// Generate a UUID for this key when absent.
    #[must_use]
    pub fn uuid(mut self) -> Self {
        self.uuid = true;
        self
    }

    /// Parse every property of a model from its JSON declaration.
    ///
    /// Properties keep their declaration order.
    pub fn parse_all(model: &str, properties: &Value) -> Result<Vec<Self>, DefinitionError> {
        let Some(map) = properties.as_object() else {
            return Err(DefinitionError::InvalidProperty {
                model: model.to_owned(),
                property: "*".to_owned(),
                reason: "properties must be a JSON object".to_owned(),
            });
        };
        map.iter()
            .map(|(name, spec)| Self::parse(model, name, spec))
            .collect()
    }

    /// Parse a single property declaration.
    ///
    /// A bare string (`"number"`) is shorthand for `{ "type": "number" }`.
    pub fn parse(model: &str, name: &str, spec: &Value) -> Result<Self, DefinitionError> {
        let invalid = |reason: &str| DefinitionError::InvalidProperty {
            model: model.to_owned(),
            property: name.to_owned(),
            reason: reason.to_owned(),
        };

        let obj = match spec {
            Value::String(kind) => {
                return Ok(Self::new(name, PropertyType::from_name(kind)));
            }
            Value::Object(obj) => obj,
            _ => return Err(invalid("expected an object or a type name")),
        };

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .map_or(PropertyType::Json, PropertyType::from_name);

        let key_type = match obj.get("keyType").and_then(Value::as_str) {
            None => None,
            Some("hash") => Some(KeyRole::Hash),
            Some("range") => Some(KeyRole::Range),
            Some("pk") => Some(KeyRole::Pk),
            Some(other) => return Err(invalid(&format!("unknown keyType `{other}`"))),
        };

        if matches!(key_type, Some(KeyRole::Hash | KeyRole::Range)) && kind.scalar_type().is_none()
        {
            return Err(invalid("key attributes must be string, number, boolean or date"));
        }

        let mut property = Self {
            name: name.to_owned(),
            kind,
            key_type,
            uuid: obj.get("uuid").and_then(Value::as_bool).unwrap_or(false),
            separator: obj
                .get("separator")
                .and_then(Value::as_str)
                .map(str::to_owned),
            local_index: None,
            global_index: None,
        };

        if let Some(index) = obj.get("index") {
            let Some(index) = index.as_object() else {
                return Err(invalid("index must be an object"));
            };
            if kind.scalar_type().is_none() && !index.is_empty() {
                return Err(invalid("indexed attributes must be string, number, boolean or date"));
            }
            if let Some(local) = index.get("local") {
                property.local_index = Some(LocalIndexSpec {
                    name: local.get("name").and_then(Value::as_str).map(str::to_owned),
                    project: ProjectionSpec::from_value(local.get("project")),
                });
            }
            if let Some(global) = index.get("global") {
                let throughput = global.get("throughput");
                let read = throughput
                    .and_then(|t| t.get("read"))
                    .and_then(Value::as_i64)
                    .unwrap_or(DEFAULT_READ_CAPACITY);
                let write = throughput
                    .and_then(|t| t.get("write"))
                    .and_then(Value::as_i64)
                    .unwrap_or(DEFAULT_WRITE_CAPACITY);
                property.global_index = Some(GlobalIndexSpec {
                    name: global.get("name").and_then(Value::as_str).map(str::to_owned),
                    range_key: global
                        .get("rangeKey")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    project: ProjectionSpec::from_value(global.get("project")),
                    throughput: ProvisionedThroughput {
                        read_capacity_units: read,
                        write_capacity_units: write,
                    },
                });
            }
        }

        Ok(property)
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Table-activation polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableStatusSettings {
    /// Poll `DescribeTable` until the table is `ACTIVE`.
    pub wait_till_active: bool,
    /// Poll interval in milliseconds.
    pub time_interval: u64,
}

impl Default for TableStatusSettings {
    fn default() -> Self {
        Self {
            wait_till_active: true,
            time_interval: DEFAULT_STATUS_INTERVAL_MS,
        }
    }
}

impl TableStatusSettings {
    /// Poll interval as a `Duration`.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.time_interval)
    }
}

/// Per-model settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    #[serde(rename = "ReadCapacityUnits")]
    pub read_capacity_units: i64,
    #[serde(rename = "WriteCapacityUnits")]
    pub write_capacity_units: i64,
    pub table_status: TableStatusSettings,
    /// Table name override; defaults to the model name.
    pub table: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            read_capacity_units: DEFAULT_READ_CAPACITY,
            write_capacity_units: DEFAULT_WRITE_CAPACITY,
            table_status: TableStatusSettings::default(),
            table: None,
        }
    }
}

/// Everything needed to define a model.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    pub name: String,
    pub properties: Vec<PropertySpec>,
    pub settings: ModelSettings,
}

impl ModelDefinition {
    /// Definition with default settings.
    #[must_use]
    pub fn new(name: impl Into<String>, properties: Vec<PropertySpec>) -> Self {
        Self {
            name: name.into(),
            properties,
            settings: ModelSettings::default(),
        }
    }

    /// Build a definition from the JSON property declaration and settings.
    ///
    /// `settings` may be `null`, in which case defaults apply.
    pub fn from_json(
        name: impl Into<String>,
        properties: &Value,
        settings: &Value,
    ) -> Result<Self, DefinitionError> {
        let name = name.into();
        let properties = PropertySpec::parse_all(&name, properties)?;
        let settings = if settings.is_null() {
            ModelSettings::default()
        } else {
            ModelSettings::deserialize(settings).map_err(|e| DefinitionError::InvalidProperty {
                model: name.clone(),
                property: "settings".to_owned(),
                reason: e.to_string(),
            })?
        };
        Ok(Self {
            name,
            properties,
            settings,
        })
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }
}

// ---------------------------------------------------------------------------
// Resolved schema
// ---------------------------------------------------------------------------

/// Local indexes share the table's hash key; global ones bring their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Local,
    Global,
}

/// A secondary index's own key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub index_name: String,
    pub kind: IndexKind,
    pub hash_attr: String,
    pub range_attr: Option<String>,
    pub projection: ProjectionSpec,
    /// Global indexes only.
    pub throughput: Option<ProvisionedThroughput>,
}

/// Resolved key schema of a model. Immutable once registered.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    pub name: String,
    pub table_name: String,
    pub hash_key: String,
    pub range_key: Option<String>,
    /// The composite identifier (always `id`) when a range key exists.
    pub composite_key: Option<String>,
    pub separator: String,
    /// Generate the hash key when absent.
    pub hash_key_uuid: bool,
    pub attribute_types: BTreeMap<String, PropertyType>,
    /// Local indexes keyed by their range attribute.
    pub local_indexes: BTreeMap<String, IndexDescriptor>,
    /// Global indexes keyed by their hash attribute.
    pub global_indexes: BTreeMap<String, IndexDescriptor>,
    pub settings: ModelSettings,
}

impl ModelSchema {
    /// Declared type of an attribute, if any.
    #[must_use]
    pub fn attribute_type(&self, attr: &str) -> Option<PropertyType> {
        self.attribute_types.get(attr).copied()
    }

    /// Whether the external identifier is a composite `hash<sep>range` string.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.range_key.is_some() && self.composite_key.is_some()
    }

    /// Name of the attribute holding the external identifier.
    #[must_use]
    pub fn id_attribute(&self) -> &str {
        self.composite_key.as_deref().unwrap_or(&self.hash_key)
    }

    /// Sort field used when a filter has no `order`.
    #[must_use]
    pub fn default_sort_key(&self) -> &str {
        if self.range_key.is_some() {
            self.composite_key.as_deref().unwrap_or(ID_ATTRIBUTE)
        } else {
            &self.hash_key
        }
    }

    /// Whether `attr` is the table's hash or range key.
    #[must_use]
    pub fn is_primary_key_attribute(&self, attr: &str) -> bool {
        attr == self.hash_key || self.range_key.as_deref() == Some(attr)
    }

    /// Type of a foreign key pointing at this model.
    #[must_use]
    pub fn foreign_key_type(&self) -> PropertyType {
        if self.is_composite() {
            PropertyType::String
        } else {
            self.attribute_type(&self.hash_key)
                .unwrap_or(PropertyType::String)
        }
    }

    fn scalar_type_of(&self, attr: &str) -> ScalarAttributeType {
        self.attribute_type(attr)
            .and_then(PropertyType::scalar_type)
            .unwrap_or(ScalarAttributeType::S)
    }

    /// The `CreateTable` request that provisions this model's table.
    ///
    /// Attribute definitions list every key and index key attribute once.
    #[must_use]
    pub fn create_table_input(&self) -> CreateTableInput {
        let mut key_schema = vec![KeySchemaElement::hash(&self.hash_key)];
        let mut defined: Vec<String> = vec![self.hash_key.clone()];
        if let Some(range) = &self.range_key {
            key_schema.push(KeySchemaElement::range(range));
            defined.push(range.clone());
        }

        let local_secondary_indexes: Vec<LocalSecondaryIndex> = self
            .local_indexes
            .values()
            .map(|idx| {
                defined.push(idx.hash_attr.clone());
                let mut schema = vec![KeySchemaElement::hash(&idx.hash_attr)];
                if let Some(range) = &idx.range_attr {
                    defined.push(range.clone());
                    schema.push(KeySchemaElement::range(range));
                }
                LocalSecondaryIndex {
                    index_name: idx.index_name.clone(),
                    key_schema: schema,
                    projection: idx.projection.to_projection(),
                }
            })
            .collect();

        let global_secondary_indexes: Vec<GlobalSecondaryIndex> = self
            .global_indexes
            .values()
            .map(|idx| {
                defined.push(idx.hash_attr.clone());
                let mut schema = vec![KeySchemaElement::hash(&idx.hash_attr)];
                if let Some(range) = &idx.range_attr {
                    defined.push(range.clone());
                    schema.push(KeySchemaElement::range(range));
                }
                GlobalSecondaryIndex {
                    index_name: idx.index_name.clone(),
                    key_schema: schema,
                    projection: idx.projection.to_projection(),
                    provisioned_throughput: idx.throughput,
                }
            })
            .collect();

        let mut attribute_definitions: Vec<AttributeDefinition> = Vec::new();
        for name in defined {
            if attribute_definitions
                .iter()
                .any(|d| d.attribute_name == name)
            {
                continue;
            }
            attribute_definitions.push(AttributeDefinition {
                attribute_type: self.scalar_type_of(&name),
                attribute_name: name,
            });
        }

        CreateTableInput {
            table_name: self.table_name.clone(),
            key_schema,
            attribute_definitions,
            billing_mode: Some(BillingMode::Provisioned),
            provisioned_throughput: Some(ProvisionedThroughput {
                read_capacity_units: self.settings.read_capacity_units,
                write_capacity_units: self.settings.write_capacity_units,
            }),
            global_secondary_indexes,
            local_secondary_indexes,
        }
    }
}
