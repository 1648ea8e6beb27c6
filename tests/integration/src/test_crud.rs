//! Create, read, update and delete through the connector.

#[cfg(test)]
mod tests {
    use dynorm_core::{Connector, DefinitionError, ModelDefinition, OrmError, ValidationError};
    use dynorm_memory::MemoryConfig;
    use serde_json::{Value, json};

    use crate::{Harness, customer_definition, order_definition, record};

    #[tokio::test]
    async fn test_should_create_and_find_order_by_composite_id() {
        let mut harness = Harness::new(MemoryConfig::default());
        let orders = harness.define(order_definition()).await;

        let id = harness
            .connector
            .create(
                &orders,
                record(json!({"customerId": "c1", "orderId": "5", "total": 9.99})),
            )
            .await
            .unwrap();
        assert_eq!(id, json!("c1--x--5"));

        let found = harness.connector.find(&orders, &id).await.unwrap().unwrap();
        assert_eq!(found["orderId"], json!(5));
        assert_eq!(found["total"], json!(9.99));
        assert_eq!(found["id"], json!("c1--x--5"));
        assert!(harness.connector.exists(&orders, &id).await.unwrap());
        assert!(
            !harness
                .connector
                .exists(&orders, &json!("c1--x--6"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_should_update_and_destroy_order() {
        let mut harness = Harness::new(MemoryConfig::default());
        let orders = harness.define(order_definition()).await;
        harness
            .connector
            .create(
                &orders,
                record(json!({"customerId": "c1", "orderId": 5, "status": "open", "total": 10})),
            )
            .await
            .unwrap();

        let updated = harness
            .connector
            .update(
                &orders,
                &json!("c1--x--5"),
                record(json!({"status": "shipped", "total": 12})),
            )
            .await
            .unwrap();
        assert_eq!(updated["status"], json!("shipped"));
        assert_eq!(updated["total"], json!(12));
        assert_eq!(updated["id"], json!("c1--x--5"));

        let removed = harness
            .connector
            .destroy(&orders, &json!("c1--x--5"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed["status"], json!("shipped"));
        assert!(
            harness
                .connector
                .find(&orders, &json!("c1--x--5"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_should_generate_uuid_on_create_but_not_on_save() {
        let mut harness = Harness::new(MemoryConfig::default());
        let customers = harness.define(customer_definition()).await;

        let id = harness
            .connector
            .create(&customers, record(json!({"name": "Ada"})))
            .await
            .unwrap();
        let Value::String(id) = id else {
            panic!("expected a string id, got {id}");
        };
        assert_eq!(id.len(), 36);

        let err = harness
            .connector
            .save(&customers, record(json!({"name": "Grace"})))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrmError::Validation(ValidationError::MissingHashValue { .. })
        ));

        let saved = harness
            .connector
            .save(&customers, record(json!({"id": "fixed", "name": "Grace"})))
            .await
            .unwrap();
        assert_eq!(saved["id"], json!("fixed"));
        let found = harness
            .connector
            .find(&customers, &json!("fixed"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["name"], json!("Grace"));
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_hash_key_before_any_table_operation() {
        let mut harness = Harness::new(MemoryConfig::default());
        let definition = ModelDefinition::from_json(
            "Broken",
            &json!({
                "a": { "type": "string", "keyType": "hash" },
                "b": { "type": "string", "keyType": "hash" }
            }),
            &Value::Null,
        )
        .unwrap();

        let err = harness
            .connector
            .define(&mut harness.registry, definition)
            .unwrap_err();
        assert!(matches!(
            err,
            OrmError::Definition(DefinitionError::DuplicateKey { .. })
        ));
        tokio::task::yield_now().await;
        assert!(harness.store.state().list_table_names().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_malformed_composite_id() {
        let mut harness = Harness::new(MemoryConfig::default());
        let orders = harness.define(order_definition()).await;
        let err = harness
            .connector
            .find(&orders, &json!("no-separator"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
    }
}
