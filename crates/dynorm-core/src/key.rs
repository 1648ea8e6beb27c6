//! Key codec: composite identifiers and per-attribute key coercion.
//!
//! Models with a range key expose a single string identifier
//! `hash<sep>range`. Separator occurrences inside the hash value are not
//! escaped; decoding splits on the first occurrence.

use chrono::DateTime;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ValidationError;
use crate::schema::{ModelSchema, PropertyType};

/// Converts between external identifiers and store keys of one model.
#[derive(Debug, Clone, Copy)]
pub struct KeyCodec<'a> {
    schema: &'a ModelSchema,
}

impl<'a> KeyCodec<'a> {
    #[must_use]
    pub fn new(schema: &'a ModelSchema) -> Self {
        Self { schema }
    }

    /// Join hash and range values into the composite identifier.
    #[must_use]
    pub fn encode(&self, hash: &Value, range: &Value) -> String {
        format!(
            "{}{}{}",
            stringify(hash),
            self.schema.separator,
            stringify(range)
        )
    }

    /// Split a composite identifier and coerce both halves.
    pub fn decode(&self, id: &str) -> Result<(Value, Value), ValidationError> {
        let id_attr = self.schema.id_attribute();
        let Some(range_key) = self.schema.range_key.as_deref() else {
            return Err(ValidationError::InvalidKeyValue {
                attribute: id_attr.to_owned(),
                reason: "model has no range key".to_owned(),
            });
        };
        let Some((hash, range)) = id.split_once(self.schema.separator.as_str()) else {
            return Err(ValidationError::InvalidKeyValue {
                attribute: id_attr.to_owned(),
                reason: format!("`{id}` does not contain `{}`", self.schema.separator),
            });
        };
        Ok((
            self.coerce(&self.schema.hash_key, &Value::String(hash.to_owned()))?,
            self.coerce(range_key, &Value::String(range.to_owned()))?,
        ))
    }

    /// Coerce a raw key value to the attribute's declared type.
    pub fn coerce(&self, attr: &str, raw: &Value) -> Result<Value, ValidationError> {
        match self.schema.attribute_type(attr) {
            Some(kind) => coerce_value(attr, kind, raw),
            None => Ok(raw.clone()),
        }
    }

    /// Store key (hash and optional range attributes) for an external id.
    pub fn key_for_id(&self, id: &Value) -> Result<Map<String, Value>, ValidationError> {
        if id.is_null() {
            return Err(ValidationError::NullHashValue {
                model: self.schema.name.clone(),
                attribute: self.schema.hash_key.clone(),
            });
        }
        let mut key = Map::new();
        if let (true, Some(range_key)) = (self.schema.is_composite(), &self.schema.range_key) {
            let (hash, range) = self.decode(&stringify(id))?;
            key.insert(self.schema.hash_key.clone(), hash);
            key.insert(range_key.clone(), range);
        } else {
            key.insert(
                self.schema.hash_key.clone(),
                self.coerce(&self.schema.hash_key, id)?,
            );
        }
        Ok(key)
    }

    /// Store key of an already stored record.
    pub fn key_of_record(
        &self,
        record: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ValidationError> {
        let mut key = Map::new();
        let hash = record
            .get(&self.schema.hash_key)
            .ok_or_else(|| ValidationError::MissingHashValue {
                model: self.schema.name.clone(),
                attribute: self.schema.hash_key.clone(),
            })?;
        key.insert(self.schema.hash_key.clone(), hash.clone());
        if let Some(range_key) = &self.schema.range_key {
            let range = record
                .get(range_key)
                .ok_or_else(|| ValidationError::MissingRangeValue {
                    model: self.schema.name.clone(),
                    attribute: range_key.clone(),
                })?;
            key.insert(range_key.clone(), range.clone());
        }
        Ok(key)
    }

    /// Validate and normalize the keys of a record about to be written.
    ///
    /// With `generate` set, a missing or null hash key is filled with a
    /// fresh UUID when the model asks for one. The composite identifier is
    /// recomputed and stored. Returns the record's external identifier.
    pub fn prepare_write(
        &self,
        record: &mut Map<String, Value>,
        generate: bool,
    ) -> Result<Value, ValidationError> {
        let schema = self.schema;
        let hash = match record.get(&schema.hash_key) {
            Some(v) if !v.is_null() => self.coerce(&schema.hash_key, v)?,
            absent if generate && schema.hash_key_uuid => {
                let id = Value::String(uuid::Uuid::new_v4().to_string());
                if absent.is_some() {
                    warn!(model = %schema.name, "replacing null hash key with generated uuid");
                }
                id
            }
            Some(_) => {
                return Err(ValidationError::NullHashValue {
                    model: schema.name.clone(),
                    attribute: schema.hash_key.clone(),
                });
            }
            None => {
                return Err(ValidationError::MissingHashValue {
                    model: schema.name.clone(),
                    attribute: schema.hash_key.clone(),
                });
            }
        };
        record.insert(schema.hash_key.clone(), hash.clone());

        coerce_dates(schema, record);

        let Some(range_key) = &schema.range_key else {
            return Ok(hash);
        };
        let range = match record.get(range_key) {
            Some(v) if !v.is_null() => self.coerce(range_key, v)?,
            _ => {
                return Err(ValidationError::MissingRangeValue {
                    model: schema.name.clone(),
                    attribute: range_key.clone(),
                });
            }
        };
        record.insert(range_key.clone(), range.clone());

        match &schema.composite_key {
            Some(pk) => {
                let id = Value::String(self.encode(&hash, &range));
                record.insert(pk.clone(), id.clone());
                Ok(id)
            }
            None => Ok(hash),
        }
    }
}

/// Coerce a raw value to a declared key type.
///
/// `number` parses integers, `date` accepts epoch milliseconds or RFC 3339
/// strings, `string` and `boolean` keys are stored as strings.
pub fn coerce_value(attr: &str, kind: PropertyType, raw: &Value) -> Result<Value, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidKeyValue {
        attribute: attr.to_owned(),
        reason,
    };
    match (kind, raw) {
        (_, Value::Null) | (PropertyType::Json, _) => Ok(raw.clone()),
        (PropertyType::Number | PropertyType::Date, Value::Number(_)) => Ok(raw.clone()),
        (PropertyType::Number, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid(format!("`{s}` is not an integer"))),
        (PropertyType::Date, Value::String(s)) => parse_date_millis(s)
            .map(Value::from)
            .ok_or_else(|| invalid(format!("`{s}` is not a date"))),
        (PropertyType::String | PropertyType::Boolean, Value::String(_)) => Ok(raw.clone()),
        (PropertyType::String | PropertyType::Boolean, Value::Number(_) | Value::Bool(_)) => {
            Ok(Value::String(stringify(raw)))
        }
        (_, other) => Err(invalid(format!("cannot use {other} as a {kind:?} key"))),
    }
}

/// Epoch milliseconds of an RFC 3339 timestamp or an integer string.
#[must_use]
pub fn parse_date_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .ok()
        .or_else(|| s.parse::<i64>().ok())
}

/// Convert `date` attributes given as strings into epoch milliseconds.
///
/// Values that do not parse are kept as they are.
pub fn coerce_dates(schema: &ModelSchema, record: &mut Map<String, Value>) {
    for (attr, value) in record.iter_mut() {
        if schema.attribute_type(attr) != Some(PropertyType::Date) {
            continue;
        }
        if let Value::String(s) = value {
            match parse_date_millis(s) {
                Some(ms) => *value = Value::from(ms),
                None => warn!(model = %schema.name, attribute = %attr, "unparseable date kept as string"),
            }
        }
    }
}

/// Text form of a key value as used inside composite identifiers.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::registry::ModelRegistry;
    use crate::schema::ModelDefinition;
    use crate::testing::order_definition;

    fn order_schema() -> std::sync::Arc<ModelSchema> {
        ModelRegistry::new().define_model(order_definition()).unwrap()
    }

    #[test]
    fn test_should_round_trip_composite_key() {
        let schema = order_schema();
        let codec = KeyCodec::new(&schema);
        let id = codec.encode(&json!("c1"), &json!(5));
        assert_eq!(id, "c1--x--5");
        assert_eq!(codec.decode(&id).unwrap(), (json!("c1"), json!(5)));
    }

    #[test]
    fn test_should_split_on_first_separator() {
        let schema = order_schema();
        let codec = KeyCodec::new(&schema);
        let err = codec.decode("a--x--b--x--1").unwrap_err();
        // the range half `b--x--1` is not an integer
        assert!(matches!(err, ValidationError::InvalidKeyValue { attribute, .. } if attribute == "orderId"));
    }

    #[test]
    fn test_should_reject_id_without_separator() {
        let schema = order_schema();
        let err = KeyCodec::new(&schema).decode("c1").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidKeyValue { .. }));
    }

    #[test]
    fn test_should_report_null_composite_id_as_null_hash() {
        let schema = order_schema();
        let err = KeyCodec::new(&schema).key_for_id(&Value::Null).unwrap_err();
        assert!(matches!(err, ValidationError::NullHashValue { attribute, .. } if attribute == "customerId"));
    }

    #[test]
    fn test_should_prepare_composite_write() {
        let schema = order_schema();
        let mut record = json!({"customerId": "c1", "orderId": "5", "total": 9.99})
            .as_object()
            .cloned()
            .unwrap();
        let id = KeyCodec::new(&schema)
            .prepare_write(&mut record, true)
            .unwrap();
        assert_eq!(id, json!("c1--x--5"));
        assert_eq!(record["orderId"], json!(5));
        assert_eq!(record["id"], json!("c1--x--5"));
    }

    #[test]
    fn test_should_require_range_value() {
        let schema = order_schema();
        let mut record = json!({"customerId": "c1", "orderId": null})
            .as_object()
            .cloned()
            .unwrap();
        let err = KeyCodec::new(&schema)
            .prepare_write(&mut record, true)
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingRangeValue { .. }));
    }

    #[test]
    fn test_should_distinguish_missing_and_null_hash() {
        let schema = order_schema();
        let codec = KeyCodec::new(&schema);
        let mut missing = json!({"orderId": 1}).as_object().cloned().unwrap();
        assert!(matches!(
            codec.prepare_write(&mut missing, true).unwrap_err(),
            ValidationError::MissingHashValue { .. }
        ));
        let mut null = json!({"customerId": null, "orderId": 1})
            .as_object()
            .cloned()
            .unwrap();
        assert!(matches!(
            codec.prepare_write(&mut null, true).unwrap_err(),
            ValidationError::NullHashValue { .. }
        ));
    }

    #[test]
    fn test_should_generate_uuid_hash_when_missing() {
        let definition = ModelDefinition::from_json(
            "Note",
            &json!({"id": {"type": "string", "keyType": "hash", "uuid": true}, "body": "string"}),
            &Value::Null,
        )
        .unwrap();
        let schema = ModelRegistry::new().define_model(definition).unwrap();
        let mut record = json!({"body": "hi"}).as_object().cloned().unwrap();
        let id = KeyCodec::new(&schema)
            .prepare_write(&mut record, true)
            .unwrap();
        let id = id.as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
        assert_eq!(record["id"], json!(id));
    }

    #[test]
    fn test_should_use_hash_value_directly_for_simple_models() {
        let definition = ModelDefinition::from_json(
            "Account",
            &json!({"email": {"type": "string", "keyType": "hash"}}),
            &Value::Null,
        )
        .unwrap();
        let schema = ModelRegistry::new().define_model(definition).unwrap();
        let key = KeyCodec::new(&schema)
            .key_for_id(&json!("a--x--b"))
            .unwrap();
        assert_eq!(Value::Object(key), json!({"email": "a--x--b"}));
    }

    #[test]
    fn test_should_coerce_dates_to_epoch_millis() {
        assert_eq!(
            coerce_value("at", PropertyType::Date, &json!("1970-01-01T00:00:01Z")).unwrap(),
            json!(1000)
        );
        assert_eq!(
            coerce_value("at", PropertyType::Date, &json!("1500")).unwrap(),
            json!(1500)
        );
        assert!(coerce_value("at", PropertyType::Date, &json!("soon")).is_err());
    }

    #[test]
    fn test_should_store_boolean_keys_as_strings() {
        assert_eq!(
            coerce_value("flag", PropertyType::Boolean, &json!(true)).unwrap(),
            json!("true")
        );
        assert_eq!(
            coerce_value("n", PropertyType::String, &json!(42)).unwrap(),
            json!("42")
        );
    }
}
