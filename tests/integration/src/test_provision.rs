//! Table provisioning and call timeouts.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use dynorm_core::table::ProvisionOutcome;
    use dynorm_core::{Connector, ConnectorConfig, DataStore, DynamoConnector, ModelRegistry, OrmError};
    use dynorm_memory::{MemoryConfig, MemoryStore};
    use dynorm_model::StoreError;
    use dynorm_model::input::{
        CreateTableInput, DeleteItemInput, DescribeTableInput, GetItemInput, ListTablesInput,
        PutItemInput, QueryInput, ScanInput, UpdateItemInput,
    };
    use dynorm_model::output::{
        CreateTableOutput, DeleteItemOutput, DescribeTableOutput, GetItemOutput,
        ListTablesOutput, PutItemOutput, QueryOutput, ScanOutput, UpdateItemOutput,
    };
    use dynorm_model::types::TableStatus;
    use serde_json::json;

    use crate::{Harness, order_definition};

    /// Memory store whose `GetItem` answers only after `delay`.
    #[derive(Debug)]
    struct SlowReads {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl DataStore for SlowReads {
        async fn list_tables(&self, input: ListTablesInput) -> Result<ListTablesOutput, StoreError> {
            self.inner.list_tables(input).await
        }

        async fn create_table(
            &self,
            input: CreateTableInput,
        ) -> Result<CreateTableOutput, StoreError> {
            self.inner.create_table(input).await
        }

        async fn describe_table(
            &self,
            input: DescribeTableInput,
        ) -> Result<DescribeTableOutput, StoreError> {
            self.inner.describe_table(input).await
        }

        async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get_item(input).await
        }

        async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
            self.inner.put_item(input).await
        }

        async fn update_item(
            &self,
            input: UpdateItemInput,
        ) -> Result<UpdateItemOutput, StoreError> {
            self.inner.update_item(input).await
        }

        async fn delete_item(
            &self,
            input: DeleteItemInput,
        ) -> Result<DeleteItemOutput, StoreError> {
            self.inner.delete_item(input).await
        }

        async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
            self.inner.query(input).await
        }

        async fn scan(&self, input: ScanInput) -> Result<ScanOutput, StoreError> {
            self.inner.scan(input).await
        }
    }

    async fn status_of(store: &MemoryStore, table: &str) -> Option<TableStatus> {
        store
            .describe_table(DescribeTableInput {
                table_name: table.to_owned(),
            })
            .await
            .unwrap()
            .table
            .and_then(|t| t.table_status)
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_provision_table_and_wait_until_active() {
        let store = Arc::new(MemoryStore::new(
            MemoryConfig::default().with_activation_polls(3),
        ));
        let mut harness = Harness::with_store(Arc::clone(&store));
        let schema = harness
            .connector
            .define(&mut harness.registry, order_definition())
            .unwrap();
        let outcome = harness.connector.ensure_table(&schema).await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::Created);
        assert_eq!(status_of(&store, "Order").await, Some(TableStatus::Active));

        let table = store.state().require_table("Order").unwrap();
        assert_eq!(table.gsi_definitions[0].index_name, "statusGlobalIndex");
        assert_eq!(table.lsi_definitions[0].index_name, "placedAtLocalIndex");

        let mut again = Harness::with_store(Arc::clone(&store));
        let schema = again
            .connector
            .define(&mut again.registry, order_definition())
            .unwrap();
        assert_eq!(
            again.connector.ensure_table(&schema).await.unwrap(),
            ProvisionOutcome::Existing
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_create_table_once_when_defined_concurrently() {
        let store = Arc::new(MemoryStore::new(MemoryConfig::default()));
        let mut first = Harness::with_store(Arc::clone(&store));
        let mut second = Harness::with_store(Arc::clone(&store));
        let a = first
            .connector
            .define(&mut first.registry, order_definition())
            .unwrap();
        let b = second
            .connector
            .define(&mut second.registry, order_definition())
            .unwrap();

        let outcomes = [
            first.connector.ensure_table(&a).await.unwrap(),
            second.connector.ensure_table(&b).await.unwrap(),
        ];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == ProvisionOutcome::Created)
                .count(),
            1
        );
        assert_eq!(store.state().list_table_names(), ["Order"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_time_out_slow_store_call() {
        let store = Arc::new(SlowReads {
            inner: MemoryStore::new(MemoryConfig::default().with_activation_polls(0)),
            delay: Duration::from_secs(10),
        });
        let connector = DynamoConnector::new(
            store,
            ConnectorConfig::default()
                .with_auto_provision(false)
                .with_request_timeout(Duration::from_secs(1)),
        );
        let schema = connector
            .define(&mut ModelRegistry::new(), order_definition())
            .unwrap();
        connector.ensure_table(&schema).await.unwrap();

        let err = connector
            .find(&schema, &json!("c1--x--1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrmError::Timeout {
                operation: "GetItem",
                ..
            }
        ));
    }
}
