//! Filters compiled into queries and scans, paged and shaped.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dynorm_core::{Connector, Filter, ModelSchema, Record};
    use dynorm_memory::MemoryConfig;
    use serde_json::{Value, json};

    use crate::{Harness, order_definition, seed_orders};

    async fn seeded() -> (Harness, Arc<ModelSchema>) {
        let mut harness = Harness::new(MemoryConfig::default().with_page_size(100));
        let orders = harness.define(order_definition()).await;
        seed_orders(&harness, &orders, "c1", 250).await;
        seed_orders(&harness, &orders, "c2", 3).await;
        (harness, orders)
    }

    async fn all(harness: &Harness, orders: &ModelSchema, filter: Value) -> Vec<Record> {
        let filter = Filter::from_value(&filter).unwrap();
        harness.connector.all(orders, &filter).await.unwrap()
    }

    fn field(records: &[Record], name: &str) -> Vec<Value> {
        records.iter().map(|r| r[name].clone()).collect()
    }

    #[tokio::test]
    async fn test_should_window_results_across_store_pages() {
        let (harness, orders) = seeded().await;
        let records = all(
            &harness,
            &orders,
            json!({"where": {"customerId": "c1"}, "order": "orderId", "offset": 10, "limit": 15}),
        )
        .await;
        assert_eq!(
            field(&records, "orderId"),
            (10..25).map(Value::from).collect::<Vec<_>>()
        );

        let everything = all(&harness, &orders, json!({"where": {"customerId": "c1"}})).await;
        assert_eq!(everything.len(), 250);
    }

    #[tokio::test]
    async fn test_should_stop_paging_once_min_results_reached() {
        let (harness, orders) = seeded().await;
        let records = all(
            &harness,
            &orders,
            json!({"where": {"customerId": "c1"}, "minResults": 150}),
        )
        .await;
        assert_eq!(records.len(), 200);
    }

    #[tokio::test]
    async fn test_should_query_range_between_descending() {
        let (harness, orders) = seeded().await;
        let records = all(
            &harness,
            &orders,
            json!({"where": {"customerId": "c1", "orderId": {"between": [10, 19]}}, "order": "orderId DESC"}),
        )
        .await;
        assert_eq!(
            field(&records, "orderId"),
            (10..20).rev().map(Value::from).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_should_query_global_index() {
        let (harness, orders) = seeded().await;
        let records = all(
            &harness,
            &orders,
            json!({"where": {"status": "open", "total": {"gte": 995}}, "order": "total"}),
        )
        .await;
        // c1 orders 0, 2, 4 and c2 orders 0, 2.
        assert_eq!(
            field(&records, "total"),
            [996, 998, 998, 1000, 1000].map(Value::from).to_vec()
        );
    }

    #[tokio::test]
    async fn test_should_query_local_index() {
        let (harness, orders) = seeded().await;
        let records = all(
            &harness,
            &orders,
            json!({"where": {"customerId": "c1", "placedAt": {"lt": 3000}}, "order": "orderId"}),
        )
        .await;
        assert_eq!(field(&records, "orderId"), [0, 1, 2].map(Value::from).to_vec());
    }

    #[tokio::test]
    async fn test_should_fall_back_to_scan_without_hash_equality() {
        let (harness, orders) = seeded().await;
        let filter = Filter::from_value(&json!({"where": {"total": {"lt": 760}}})).unwrap();
        let n = harness.connector.count(&orders, &filter).await.unwrap();
        assert_eq!(n, 9);
    }

    #[tokio::test]
    async fn test_should_filter_non_key_conditions_within_query() {
        let (harness, orders) = seeded().await;
        let records = all(
            &harness,
            &orders,
            json!({"where": {"customerId": "c2", "status": {"inq": ["open", "pending"]}}}),
        )
        .await;
        assert_eq!(records.len(), 2);

        let records = all(
            &harness,
            &orders,
            json!({"where": {"customerId": "c2", "orderId": {"neq": 1}}, "order": "orderId"}),
        )
        .await;
        assert_eq!(field(&records, "orderId"), [0, 2].map(Value::from).to_vec());
    }

    #[tokio::test]
    async fn test_should_destroy_only_matching_orders() {
        let (harness, orders) = seeded().await;
        let deleted = harness
            .connector
            .destroy_all(&orders, &Filter::new().where_eq("customerId", "c2"))
            .await
            .unwrap();
        assert_eq!(deleted, 3);
        let remaining = harness.connector.count(&orders, &Filter::new()).await.unwrap();
        assert_eq!(remaining, 250);
    }
}
