//! The connector: model definition and CRUD over a [`DataStore`].
//!
//! Every remote call goes through [`timed`] with the configured request
//! timeout. Store errors are returned unchanged; nothing here retries.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dynorm_model::input::{DeleteItemInput, GetItemInput, PutItemInput, UpdateItemInput};
use dynorm_model::types::ReturnValue;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConnectorConfig;
use crate::error::{OrmError, OrmResult};
use crate::expression::{self, Placeholders};
use crate::filter::Filter;
use crate::key::{KeyCodec, coerce_dates};
use crate::marshal::{from_item, to_attribute_value, to_item};
use crate::pager::{self, PageCollector};
use crate::registry::ModelRegistry;
use crate::schema::{ModelDefinition, ModelSchema};
use crate::store::{DataStore, timed};
use crate::table::{self, ProvisionOutcome};

/// A loosely typed record, as callers read and write it.
pub type Record = Map<String, Value>;

/// Loads related records named by a filter's `include`.
#[async_trait]
pub trait RelationLoader: Send + Sync {
    async fn include(
        &self,
        model: &ModelSchema,
        records: Vec<Record>,
        include: &Value,
    ) -> OrmResult<Vec<Record>>;
}

/// The ORM capability set.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Register a model and start provisioning its table.
    ///
    /// Returns as soon as the schema is registered; provisioning runs in the
    /// background.
    fn define(
        &self,
        registry: &mut ModelRegistry,
        definition: ModelDefinition,
    ) -> OrmResult<Arc<ModelSchema>>;

    /// Insert a record and return its identifier.
    async fn create(&self, model: &ModelSchema, data: Record) -> OrmResult<Value>;

    /// Fetch one record by identifier.
    async fn find(&self, model: &ModelSchema, id: &Value) -> OrmResult<Option<Record>>;

    /// Replace a whole record and return what was stored.
    async fn save(&self, model: &ModelSchema, data: Record) -> OrmResult<Record>;

    /// Set the given attributes and return the updated record.
    async fn update(&self, model: &ModelSchema, id: &Value, changes: Record)
    -> OrmResult<Record>;

    /// Remove a record and return it, if it existed.
    async fn destroy(&self, model: &ModelSchema, id: &Value) -> OrmResult<Option<Record>>;

    /// Remove every record matching `filter`'s conditions; returns how many.
    async fn destroy_all(&self, model: &ModelSchema, filter: &Filter) -> OrmResult<usize>;

    /// Records matching `filter`, windowed and ordered.
    async fn all(&self, model: &ModelSchema, filter: &Filter) -> OrmResult<Vec<Record>>;

    /// Number of records matching `filter`'s conditions.
    async fn count(&self, model: &ModelSchema, filter: &Filter) -> OrmResult<usize>;

    async fn exists(&self, model: &ModelSchema, id: &Value) -> OrmResult<bool>;
}

type ProvisionHandle = JoinHandle<OrmResult<ProvisionOutcome>>;

/// [`Connector`] over a hash/range keyed [`DataStore`].
pub struct DynamoConnector<S: ?Sized> {
    store: Arc<S>,
    config: ConnectorConfig,
    relation_loader: Option<Arc<dyn RelationLoader>>,
    provisions: Mutex<HashMap<String, ProvisionHandle>>,
}

impl<S: ?Sized> fmt::Debug for DynamoConnector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoConnector")
            .field("config", &self.config)
            .field("relation_loader", &self.relation_loader.is_some())
            .field("pending_provisions", &self.provisions.lock().len())
            .finish_non_exhaustive()
    }
}

impl<S: DataStore + ?Sized> DynamoConnector<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: ConnectorConfig) -> Self {
        Self {
            store,
            config,
            relation_loader: None,
            provisions: Mutex::new(HashMap::new()),
        }
    }

    /// Attach the collaborator that resolves `include`.
    #[must_use]
    pub fn with_relation_loader(mut self, loader: Arc<dyn RelationLoader>) -> Self {
        self.relation_loader = Some(loader);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Make sure `model`'s table exists (and is active, if configured).
    ///
    /// Awaits the background provisioning started by `define` when there is
    /// one, otherwise provisions now.
    pub async fn ensure_table(&self, model: &ModelSchema) -> OrmResult<ProvisionOutcome> {
        let pending = self.provisions.lock().remove(&model.name);
        match pending {
            Some(handle) => handle.await.map_err(|e| {
                OrmError::Internal(anyhow::anyhow!(
                    "provisioning task for {} failed: {e}",
                    model.name
                ))
            })?,
            None => table::provision(&*self.store, model, self.config.request_timeout).await,
        }
    }

    fn codec(model: &ModelSchema) -> KeyCodec<'_> {
        KeyCodec::new(model)
    }
}

impl<S: DataStore + ?Sized> DynamoConnector<S> {
    fn spawn_provision(&self, schema: &Arc<ModelSchema>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                model = %schema.name,
                "no async runtime, table provisioning deferred to ensure_table"
            );
            return;
        };
        let store = Arc::clone(&self.store);
        let schema_for_task = Arc::clone(schema);
        let timeout = self.config.request_timeout;
        let handle = runtime.spawn(async move {
            let result = table::provision(&*store, &schema_for_task, timeout).await;
            if let Err(e) = &result {
                warn!(model = %schema_for_task.name, error = %e, "table provisioning failed");
            }
            result
        });
        self.provisions.lock().insert(schema.name.clone(), handle);
    }
}

#[async_trait]
impl<S: DataStore + ?Sized> Connector for DynamoConnector<S> {
    fn define(
        &self,
        registry: &mut ModelRegistry,
        definition: ModelDefinition,
    ) -> OrmResult<Arc<ModelSchema>> {
        let schema = registry.define_model(definition)?;
        if self.config.auto_provision {
            self.spawn_provision(&schema);
        }
        Ok(schema)
    }

    async fn create(&self, model: &ModelSchema, data: Record) -> OrmResult<Value> {
        let mut record = data;
        let id = Self::codec(model).prepare_write(&mut record, true)?;
        timed(
            "PutItem",
            self.config.request_timeout,
            self.store.put_item(PutItemInput {
                table_name: model.table_name.clone(),
                item: to_item(&record),
                ..Default::default()
            }),
        )
        .await?;
        info!(model = %model.name, table = %model.table_name, id = %id, "item created");
        Ok(id)
    }

    async fn find(&self, model: &ModelSchema, id: &Value) -> OrmResult<Option<Record>> {
        let key = Self::codec(model).key_for_id(id)?;
        let output = timed(
            "GetItem",
            self.config.request_timeout,
            self.store.get_item(GetItemInput {
                table_name: model.table_name.clone(),
                key: to_item(&key),
                consistent_read: None,
            }),
        )
        .await?;
        debug!(model = %model.name, id = %id, found = output.item.is_some(), "find");
        Ok(output.item.as_ref().map(from_item))
    }

    async fn save(&self, model: &ModelSchema, data: Record) -> OrmResult<Record> {
        let mut record = data;
        Self::codec(model).prepare_write(&mut record, false)?;
        timed(
            "PutItem",
            self.config.request_timeout,
            self.store.put_item(PutItemInput {
                table_name: model.table_name.clone(),
                item: to_item(&record),
                ..Default::default()
            }),
        )
        .await?;
        info!(model = %model.name, table = %model.table_name, "item saved");
        Ok(record)
    }

    async fn update(
        &self,
        model: &ModelSchema,
        id: &Value,
        changes: Record,
    ) -> OrmResult<Record> {
        let codec = Self::codec(model);
        let key = codec.key_for_id(id)?;

        let mut changes = changes;
        coerce_dates(model, &mut changes);
        if let (Some(pk), Some(range_key)) = (&model.composite_key, &model.range_key) {
            let hash = key.get(&model.hash_key).cloned().unwrap_or(Value::Null);
            let range = key.get(range_key).cloned().unwrap_or(Value::Null);
            changes.insert(pk.clone(), Value::String(codec.encode(&hash, &range)));
        }

        let mut ph = Placeholders::new();
        let assignments: Vec<String> = changes
            .iter()
            .filter(|(attr, value)| !value.is_null() && !model.is_primary_key_attribute(attr))
            .map(|(attr, value)| {
                let name = ph.name(attr);
                let placeholder = ph.value(attr, "", value.clone());
                format!("{name} = {placeholder}")
            })
            .collect();

        if assignments.is_empty() {
            debug!(model = %model.name, id = %id, "nothing to update");
            return Ok(self.find(model, id).await?.unwrap_or(key));
        }

        let (names, values) = ph.into_maps();
        let output = timed(
            "UpdateItem",
            self.config.request_timeout,
            self.store.update_item(UpdateItemInput {
                table_name: model.table_name.clone(),
                key: to_item(&key),
                update_expression: Some(format!("SET {}", assignments.join(", "))),
                expression_attribute_names: names.into_iter().collect(),
                expression_attribute_values: values
                    .iter()
                    .map(|(k, v)| (k.clone(), to_attribute_value(v)))
                    .collect(),
                return_values: Some(ReturnValue::AllNew),
            }),
        )
        .await?;
        info!(
            model = %model.name,
            id = %id,
            attributes = assignments.len(),
            "item updated"
        );
        Ok(output.attributes.as_ref().map(from_item).unwrap_or(key))
    }

    async fn destroy(&self, model: &ModelSchema, id: &Value) -> OrmResult<Option<Record>> {
        let key = Self::codec(model).key_for_id(id)?;
        let output = timed(
            "DeleteItem",
            self.config.request_timeout,
            self.store.delete_item(DeleteItemInput {
                table_name: model.table_name.clone(),
                key: to_item(&key),
                return_values: Some(ReturnValue::AllOld),
            }),
        )
        .await?;
        info!(model = %model.name, table = %model.table_name, id = %id, "item deleted");
        Ok(output.attributes.as_ref().map(from_item))
    }

    async fn destroy_all(&self, model: &ModelSchema, filter: &Filter) -> OrmResult<usize> {
        let plan = expression::plan(model, &filter.where_only())?;
        let items = PageCollector::new(&*self.store, self.config.request_timeout)
            .fetch_all(&plan, &model.table_name, None)
            .await?;

        let codec = Self::codec(model);
        let mut deleted = 0;
        for item in &items {
            let key = codec.key_of_record(&from_item(item))?;
            timed(
                "DeleteItem",
                self.config.request_timeout,
                self.store.delete_item(DeleteItemInput {
                    table_name: model.table_name.clone(),
                    key: to_item(&key),
                    return_values: None,
                }),
            )
            .await?;
            deleted += 1;
        }
        info!(model = %model.name, table = %model.table_name, deleted, "items deleted");
        Ok(deleted)
    }

    async fn all(&self, model: &ModelSchema, filter: &Filter) -> OrmResult<Vec<Record>> {
        let plan = expression::plan(model, filter)?;
        let items = PageCollector::new(&*self.store, self.config.request_timeout)
            .fetch_all(&plan, &model.table_name, filter.min_results)
            .await?;
        let records: Vec<Record> = items.iter().map(from_item).collect();
        let records = pager::shape(records, filter, model);

        match (&filter.include, &self.relation_loader) {
            (Some(include), Some(loader)) => loader.include(model, records, include).await,
            (Some(_), None) => {
                warn!(model = %model.name, "include requested without a relation loader, ignored");
                Ok(records)
            }
            (None, _) => Ok(records),
        }
    }

    async fn count(&self, model: &ModelSchema, filter: &Filter) -> OrmResult<usize> {
        Ok(self.all(model, &filter.where_only()).await?.len())
    }

    async fn exists(&self, model: &ModelSchema, id: &Value) -> OrmResult<bool> {
        Ok(self.find(model, id).await?.is_some())
    }
}
