//! Shared fixtures for unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use dynorm_model::input::{
    CreateTableInput, DeleteItemInput, DescribeTableInput, GetItemInput, ListTablesInput,
    PutItemInput, QueryInput, ScanInput, UpdateItemInput,
};
use dynorm_model::output::{
    CreateTableOutput, DeleteItemOutput, DescribeTableOutput, GetItemOutput, ListTablesOutput,
    PutItemOutput, QueryOutput, ScanOutput, UpdateItemOutput,
};
use dynorm_model::types::{TableDescription, TableStatus};
use dynorm_model::{AttributeValue, Item, StoreError};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::schema::ModelDefinition;
use crate::store::DataStore;

/// `Order`: `customerId` (string hash), `orderId` (number range), `id` pk.
pub(crate) fn order_definition() -> ModelDefinition {
    ModelDefinition::from_json(
        "Order",
        &json!({
            "customerId": { "type": "string", "keyType": "hash" },
            "orderId": { "type": "number", "keyType": "range" },
            "id": { "type": "string", "keyType": "pk" },
            "total": "number",
            "status": "string"
        }),
        &Value::Null,
    )
    .expect("order definition is valid")
}

/// An `Order` item as the store would return it.
pub(crate) fn order_item(customer: &str, order: i64) -> Item {
    Item::from([
        ("customerId".to_owned(), AttributeValue::string(customer)),
        ("orderId".to_owned(), AttributeValue::number(order)),
        (
            "id".to_owned(),
            AttributeValue::string(format!("{customer}--x--{order}")),
        ),
    ])
}

/// A query page of orders `range`, with a continuation token when `more`.
pub(crate) fn order_page(customer: &str, range: std::ops::Range<i64>, more: bool) -> QueryOutput {
    let items: Vec<Item> = range.clone().map(|n| order_item(customer, n)).collect();
    let count = i32::try_from(items.len()).unwrap_or(i32::MAX);
    QueryOutput {
        items,
        count,
        scanned_count: count,
        last_evaluated_key: more.then(|| order_item(customer, range.end - 1)),
    }
}

/// A store answering from scripted responses and recording every request.
#[derive(Debug, Default)]
pub(crate) struct ScriptedStore {
    pub calls: Mutex<Vec<&'static str>>,
    pub tables: Mutex<Vec<String>>,
    pub statuses: Mutex<VecDeque<TableStatus>>,
    pub created: Mutex<Vec<CreateTableInput>>,
    pub query_pages: Mutex<VecDeque<QueryOutput>>,
    pub scan_pages: Mutex<VecDeque<ScanOutput>>,
    pub queries: Mutex<Vec<QueryInput>>,
    pub scans: Mutex<Vec<ScanInput>>,
    pub gets: Mutex<Vec<GetItemInput>>,
    pub puts: Mutex<Vec<PutItemInput>>,
    pub updates: Mutex<Vec<UpdateItemInput>>,
    pub deletes: Mutex<Vec<DeleteItemInput>>,
    pub stored: Mutex<Option<Item>>,
}

impl ScriptedStore {
    pub(crate) fn with_query_pages(pages: impl IntoIterator<Item = QueryOutput>) -> Self {
        let store = Self::default();
        store.query_pages.lock().extend(pages);
        store
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn record(&self, op: &'static str) {
        self.calls.lock().push(op);
    }
}

#[async_trait]
impl DataStore for ScriptedStore {
    async fn list_tables(&self, _input: ListTablesInput) -> Result<ListTablesOutput, StoreError> {
        self.record("ListTables");
        Ok(ListTablesOutput {
            table_names: self.tables.lock().clone(),
            last_evaluated_table_name: None,
        })
    }

    async fn create_table(
        &self,
        input: CreateTableInput,
    ) -> Result<CreateTableOutput, StoreError> {
        self.record("CreateTable");
        let name = input.table_name.clone();
        if self.tables.lock().contains(&name) {
            return Err(StoreError::resource_in_use(format!("Table already exists: {name}")));
        }
        self.tables.lock().push(name.clone());
        self.created.lock().push(input);
        Ok(CreateTableOutput {
            table_description: Some(TableDescription {
                table_name: Some(name),
                table_status: Some(TableStatus::Creating),
                ..Default::default()
            }),
        })
    }

    async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> Result<DescribeTableOutput, StoreError> {
        self.record("DescribeTable");
        let status = self
            .statuses
            .lock()
            .pop_front()
            .unwrap_or(TableStatus::Active);
        Ok(DescribeTableOutput {
            table: Some(TableDescription {
                table_name: Some(input.table_name),
                table_status: Some(status),
                ..Default::default()
            }),
        })
    }

    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError> {
        self.record("GetItem");
        self.gets.lock().push(input);
        Ok(GetItemOutput {
            item: self.stored.lock().clone(),
        })
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
        self.record("PutItem");
        *self.stored.lock() = Some(input.item.clone());
        self.puts.lock().push(input);
        Ok(PutItemOutput::default())
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, StoreError> {
        self.record("UpdateItem");
        self.updates.lock().push(input);
        Ok(UpdateItemOutput {
            attributes: self.stored.lock().clone(),
        })
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError> {
        self.record("DeleteItem");
        self.deletes.lock().push(input);
        Ok(DeleteItemOutput {
            attributes: self.stored.lock().take(),
        })
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
        self.record("Query");
        self.queries.lock().push(input);
        Ok(self.query_pages.lock().pop_front().unwrap_or_default())
    }

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, StoreError> {
        self.record("Scan");
        self.scans.lock().push(input);
        Ok(self.scan_pages.lock().pop_front().unwrap_or_default())
    }
}
