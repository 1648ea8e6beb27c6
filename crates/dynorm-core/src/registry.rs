//! Model registry: resolves property specs into key schemas.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::DefinitionError;
use crate::schema::{
    DEFAULT_SEPARATOR, ID_ATTRIBUTE, IndexDescriptor, IndexKind, KeyRole, ModelDefinition, ModelSchema,
    PropertySpec, PropertyType,
};

/// Resolved schemas of every defined model, keyed by model name.
///
/// Built once at startup and passed explicitly to whoever needs a schema.
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<ModelSchema>>,
}

impl ModelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and register a model.
    ///
    /// Fails without registering anything if the definition is invalid.
    pub fn define_model(
        &mut self,
        definition: ModelDefinition,
    ) -> Result<Arc<ModelSchema>, DefinitionError> {
        if self.models.contains_key(&definition.name) {
            return Err(DefinitionError::ModelAlreadyDefined(definition.name));
        }
        let schema = Arc::new(resolve_schema(definition)?);
        info!(
            model = %schema.name,
            table = %schema.table_name,
            hash = %schema.hash_key,
            range = ?schema.range_key,
            local_indexes = schema.local_indexes.len(),
            global_indexes = schema.global_indexes.len(),
            "model defined"
        );
        self.models
            .insert(schema.name.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Look up a model by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ModelSchema>> {
        self.models.get(name).cloned()
    }

    /// Names of all registered models (sorted).
    #[must_use]
    pub fn model_names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    /// Type of a foreign key referencing `model`.
    #[must_use]
    pub fn foreign_key_type(&self, model: &str) -> Option<PropertyType> {
        self.models.get(model).map(|s| s.foreign_key_type())
    }
}

#[derive(Default)]
struct KeySlots {
    hash: Option<String>,
    range: Option<String>,
    pk: Option<String>,
    separator: Option<String>,
    hash_uuid: bool,
}

fn claim(
    model: &str,
    slot: &mut Option<String>,
    role: &'static str,
    property: &str,
) -> Result<(), DefinitionError> {
    if let Some(first) = slot {
        return Err(DefinitionError::DuplicateKey {
            model: model.to_owned(),
            role,
            first: first.clone(),
            second: property.to_owned(),
        });
    }
    *slot = Some(property.to_owned());
    Ok(())
}

fn resolve_keys(model: &str, properties: &[PropertySpec]) -> Result<KeySlots, DefinitionError> {
    let mut keys = KeySlots::default();

    for prop in properties {
        match prop.key_type {
            Some(KeyRole::Hash) => {
                if prop.uuid && prop.name != ID_ATTRIBUTE {
                    return Err(DefinitionError::InvalidUuidKey {
                        model: model.to_owned(),
                        property: prop.name.clone(),
                    });
                }
                claim(model, &mut keys.hash, "hash", &prop.name)?;
                keys.hash_uuid = prop.uuid;
                if prop.uuid {
                    debug!(model, "hash key uuid generation enabled");
                }
            }
            Some(KeyRole::Range) => claim(model, &mut keys.range, "range", &prop.name)?,
            Some(KeyRole::Pk) => {
                if prop.name != ID_ATTRIBUTE {
                    return Err(DefinitionError::InvalidPrimaryKeyName {
                        model: model.to_owned(),
                        property: prop.name.clone(),
                    });
                }
                claim(model, &mut keys.pk, "pk", &prop.name)?;
                keys.separator.clone_from(&prop.separator);
            }
            None => {}
        }
    }

    match (&keys.hash, &keys.range, &keys.pk) {
        (None, Some(range), _) => Err(DefinitionError::RangeWithoutHash {
            model: model.to_owned(),
            range: range.clone(),
        }),
        (_, Some(range), None) => Err(DefinitionError::MissingPrimaryKey {
            model: model.to_owned(),
            range: range.clone(),
        }),
        (_, None, Some(pk)) => Err(DefinitionError::CompositeWithoutRange {
            model: model.to_owned(),
            property: pk.clone(),
        }),
        _ => Ok(keys),
    }
}

fn resolve_schema(definition: ModelDefinition) -> Result<ModelSchema, DefinitionError> {
    let ModelDefinition {
        name: model,
        properties,
        settings,
    } = definition;

    let keys = resolve_keys(&model, &properties)?;

    let mut attribute_types: BTreeMap<String, PropertyType> = properties
        .iter()
        .map(|p| (p.name.clone(), p.kind))
        .collect();

    let (hash_key, hash_key_uuid) = match keys.hash {
        Some(hash) => (hash, keys.hash_uuid),
        None if attribute_types.contains_key(ID_ATTRIBUTE) => {
            warn!(model = %model, "no hash key declared, using `id` as hash key");
            let uuid = properties
                .iter()
                .any(|p| p.name == ID_ATTRIBUTE && p.uuid);
            (ID_ATTRIBUTE.to_owned(), uuid)
        }
        None => {
            debug!(model = %model, "no hash key declared, synthesizing uuid `id`");
            attribute_types.insert(ID_ATTRIBUTE.to_owned(), PropertyType::String);
            (ID_ATTRIBUTE.to_owned(), true)
        }
    };

    // Indexes need the final hash key, so they are resolved in a second pass.
    let mut local_indexes = BTreeMap::new();
    let mut global_indexes = BTreeMap::new();
    let mut index_names: Vec<String> = Vec::new();
    let mut register_name = |index_name: &str| -> Result<(), DefinitionError> {
        if index_names.iter().any(|n| n == index_name) {
            return Err(DefinitionError::DuplicateIndexName {
                model: model.clone(),
                index: index_name.to_owned(),
            });
        }
        index_names.push(index_name.to_owned());
        Ok(())
    };

    for prop in &properties {
        if let Some(local) = &prop.local_index {
            let index_name = local
                .name
                .clone()
                .unwrap_or_else(|| format!("{}LocalIndex", prop.name));
            register_name(&index_name)?;
            debug!(model = %model, index = %index_name, "local index");
            local_indexes.insert(
                prop.name.clone(),
                IndexDescriptor {
                    index_name,
                    kind: IndexKind::Local,
                    hash_attr: hash_key.clone(),
                    range_attr: Some(prop.name.clone()),
                    projection: local.project.clone(),
                    throughput: None,
                },
            );
        }
        if let Some(global) = &prop.global_index {
            if let Some(range) = &global.range_key {
                let known = attribute_types
                    .get(range)
                    .is_some_and(|t| t.scalar_type().is_some());
                if !known {
                    return Err(DefinitionError::InvalidProperty {
                        model: model.clone(),
                        property: prop.name.clone(),
                        reason: format!(
                            "global index range key `{range}` is not a declared scalar property"
                        ),
                    });
                }
            }
            let index_name = global
                .name
                .clone()
                .unwrap_or_else(|| format!("{}GlobalIndex", prop.name));
            register_name(&index_name)?;
            debug!(model = %model, index = %index_name, "global index");
            global_indexes.insert(
                prop.name.clone(),
                IndexDescriptor {
                    index_name,
                    kind: IndexKind::Global,
                    hash_attr: prop.name.clone(),
                    range_attr: global.range_key.clone(),
                    projection: global.project.clone(),
                    throughput: Some(global.throughput),
                },
            );
        }
    }

    Ok(ModelSchema {
        table_name: settings.table.clone().unwrap_or_else(|| model.clone()),
        name: model,
        hash_key,
        range_key: keys.range,
        composite_key: keys.pk,
        separator: keys
            .separator
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_owned()),
        hash_key_uuid,
        attribute_types,
        local_indexes,
        global_indexes,
        settings,
    })
}
