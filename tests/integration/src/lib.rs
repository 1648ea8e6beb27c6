//! End-to-end tests of the dynorm connector.
//!
//! Every test runs the real connector against [`MemoryStore`], so requests
//! go through expression compilation, paging and marshaling exactly as they
//! would against a remote store. Nothing here needs a running server.
//!
//! Run them with:
//! ```text
//! cargo test -p dynorm-integration
//! ```

use std::sync::{Arc, Once};
use std::time::Duration;

use dynorm_core::{
    Connector, ConnectorConfig, DynamoConnector, ModelDefinition, ModelRegistry, ModelSchema,
    Record,
};
use dynorm_memory::{MemoryConfig, MemoryStore};
use serde_json::{Value, json};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A connector over a fresh memory store, plus the registry models go into.
#[derive(Debug)]
pub struct Harness {
    /// The store behind the connector, for direct inspection.
    pub store: Arc<MemoryStore>,
    pub connector: DynamoConnector<MemoryStore>,
    pub registry: ModelRegistry,
}

impl Harness {
    /// Background provisioning on, tables active on their first poll.
    #[must_use]
    pub fn new(memory: MemoryConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new(memory)))
    }

    /// Same, over an existing store.
    #[must_use]
    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        init_tracing();
        let config = ConnectorConfig::default().with_request_timeout(Duration::from_secs(5));
        Self {
            connector: DynamoConnector::new(Arc::clone(&store), config),
            store,
            registry: ModelRegistry::new(),
        }
    }

    /// Define a model and wait for its table.
    pub async fn define(&mut self, definition: ModelDefinition) -> Arc<ModelSchema> {
        let schema = self
            .connector
            .define(&mut self.registry, definition)
            .unwrap_or_else(|e| panic!("failed to define model: {e}"));
        self.connector
            .ensure_table(&schema)
            .await
            .unwrap_or_else(|e| panic!("failed to provision {}: {e}", schema.table_name));
        schema
    }
}

/// `Order` keyed by customer and order number, with a global index on
/// `status` ranged by `total` and a local index on `placedAt`.
#[must_use]
pub fn order_definition() -> ModelDefinition {
    ModelDefinition::from_json(
        "Order",
        &json!({
            "customerId": { "type": "string", "keyType": "hash" },
            "orderId": { "type": "number", "keyType": "range" },
            "id": { "type": "string", "keyType": "pk" },
            "status": { "type": "string", "index": { "global": { "rangeKey": "total", "project": true } } },
            "placedAt": { "type": "date", "index": { "local": { "project": true } } },
            "total": "number"
        }),
        &json!({ "tableStatus": { "timeInterval": 50 } }),
    )
    .unwrap_or_else(|e| panic!("order definition is invalid: {e}"))
}

/// `Customer` with a generated identifier.
#[must_use]
pub fn customer_definition() -> ModelDefinition {
    ModelDefinition::from_json(
        "Customer",
        &json!({
            "id": { "type": "string", "keyType": "hash", "uuid": true },
            "name": "string"
        }),
        &json!({ "tableStatus": { "timeInterval": 50 } }),
    )
    .unwrap_or_else(|e| panic!("customer definition is invalid: {e}"))
}

/// JSON object literal as a record.
#[must_use]
pub fn record(value: Value) -> Record {
    value
        .as_object()
        .cloned()
        .unwrap_or_else(|| panic!("record must be an object, got {value}"))
}

/// Create `count` orders for `customer`: order `n` has total `1000 - n` and
/// is `open` when `n` is even, `shipped` otherwise.
pub async fn seed_orders(harness: &Harness, schema: &ModelSchema, customer: &str, count: i64) {
    for n in 0..count {
        let status = if n % 2 == 0 { "open" } else { "shipped" };
        harness
            .connector
            .create(
                schema,
                record(json!({
                    "customerId": customer,
                    "orderId": n,
                    "status": status,
                    "total": 1000 - n,
                    "placedAt": n * 1000
                })),
            )
            .await
            .unwrap_or_else(|e| panic!("failed to seed order {customer}/{n}: {e}"));
    }
}

mod test_crud;
mod test_provision;
mod test_query;
