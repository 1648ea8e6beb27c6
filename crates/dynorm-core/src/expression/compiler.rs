//! Compiles a [`Filter`] against a [`ModelSchema`] into an
//! [`ExpressionDescriptor`].
//!
//! Role precedence for a `where` attribute: primary hash, primary range,
//! global index hash, then index range (a local index range, or a global
//! index range whose hash is also in `where`). Only a bare equality can be a
//! hash condition; anything else on a hash attribute is filtered after the
//! read.

use serde_json::Value;
use tracing::{debug, warn};

use super::placeholder::Placeholders;
use super::{ExpressionDescriptor, QueryPlan};
use crate::error::InputError;
use crate::filter::{Condition, Filter, Operator};
use crate::key::{coerce_value, parse_date_millis};
use crate::schema::{IndexDescriptor, IndexKind, ModelSchema, PropertyType};

/// Key role of a `where` attribute.
#[derive(Debug, Clone, Copy)]
enum Role<'s> {
    /// Partition key of the table (`None`) or of a global index.
    Hash(Option<&'s IndexDescriptor>),
    /// Sort key of the table (`None`) or of an index.
    Range(Option<&'s IndexDescriptor>),
    Plain,
}

fn classify<'s>(schema: &'s ModelSchema, attr: &str, filter: &Filter) -> Role<'s> {
    if attr == schema.hash_key {
        return Role::Hash(None);
    }
    if schema.range_key.as_deref() == Some(attr) {
        return Role::Range(None);
    }
    if let Some(global) = schema.global_indexes.get(attr) {
        return Role::Hash(Some(global));
    }
    if let Some(local) = schema.local_indexes.get(attr) {
        return Role::Range(Some(local));
    }
    schema
        .global_indexes
        .values()
        .rev()
        .find(|g| {
            g.range_attr.as_deref() == Some(attr) && filter.condition(&g.hash_attr).is_some()
        })
        .map_or(Role::Plain, |g| Role::Range(Some(g)))
}

/// What a rendered fragment may become.
#[derive(Debug)]
enum Slot<'s> {
    Filter,
    Hash(Option<&'s IndexDescriptor>),
    Range(Option<&'s IndexDescriptor>),
}

#[derive(Debug)]
struct Fragment<'s> {
    attr: String,
    text: String,
    slot: Slot<'s>,
}

/// Coerce a filter value towards the attribute's declared type.
///
/// Values that do not convert are sent as given.
fn bind_value(schema: &ModelSchema, attr: &str, value: &Value) -> Value {
    match schema.attribute_type(attr) {
        Some(PropertyType::Date) => match value {
            Value::String(s) => parse_date_millis(s).map_or_else(|| value.clone(), Value::from),
            _ => value.clone(),
        },
        Some(PropertyType::Boolean) if !is_key_attribute(schema, attr) => value.clone(),
        Some(kind) => coerce_value(attr, kind, value).unwrap_or_else(|_| value.clone()),
        None => value.clone(),
    }
}

fn is_key_attribute(schema: &ModelSchema, attr: &str) -> bool {
    schema.is_primary_key_attribute(attr)
        || schema.global_indexes.values().any(|g| {
            g.hash_attr == attr || g.range_attr.as_deref() == Some(attr)
        })
        || schema.local_indexes.contains_key(attr)
}

fn between(
    ph: &mut Placeholders,
    schema: &ModelSchema,
    name: &str,
    attr: &str,
    start: &Value,
    end: &Value,
) -> String {
    let start = ph.value(attr, "_start", bind_value(schema, attr, start));
    let end = ph.value(attr, "_end", bind_value(schema, attr, end));
    format!("{name} BETWEEN {start} AND {end}")
}

fn compare(
    ph: &mut Placeholders,
    schema: &ModelSchema,
    name: &str,
    attr: &str,
    op: Operator,
    value: &Value,
) -> String {
    let placeholder = ph.value(attr, "", bind_value(schema, attr, value));
    format!("{name} {} {placeholder}", op.symbol())
}

/// Render a condition as a post-read filter fragment.
fn render_filter(
    ph: &mut Placeholders,
    schema: &ModelSchema,
    attr: &str,
    condition: &Condition,
) -> Result<String, InputError> {
    let name = ph.name(attr);
    Ok(match condition {
        Condition::Equals(v) => compare(ph, schema, &name, attr, Operator::Eq, v),
        Condition::Operator(op, v) => compare(ph, schema, &name, attr, *op, v),
        Condition::Range { start, end } => between(ph, schema, &name, attr, start, end),
        Condition::InSet(values) | Condition::List(values) => {
            if values.is_empty() {
                return Err(InputError::EmptyInSet(attr.to_owned()));
            }
            let placeholders: Vec<String> = values
                .iter()
                .enumerate()
                .map(|(i, v)| ph.value(attr, &format!("_{i}"), bind_value(schema, attr, v)))
                .collect();
            format!("{name} IN ({})", placeholders.join(", "))
        }
    })
}

/// Render a condition on a sort key, if it can be a key condition.
fn render_range_key(
    ph: &mut Placeholders,
    schema: &ModelSchema,
    attr: &str,
    condition: &Condition,
) -> Option<String> {
    let name = ph.name(attr);
    match condition {
        Condition::Equals(v) => Some(compare(ph, schema, &name, attr, Operator::Eq, v)),
        Condition::Operator(Operator::Neq, _) => None,
        Condition::Operator(op, v) => Some(compare(ph, schema, &name, attr, *op, v)),
        Condition::Range { start, end } => Some(between(ph, schema, &name, attr, start, end)),
        Condition::List(values) => match values.as_slice() {
            [start, end] => Some(between(ph, schema, &name, attr, start, end)),
            _ => None,
        },
        Condition::InSet(_) => None,
    }
}

/// Whether a sort-key fragment can accompany the chosen partition fragment.
fn compatible(hash: Option<&IndexDescriptor>, range: Option<&IndexDescriptor>) -> bool {
    match (hash, range) {
        (None, None) => true,
        (None, Some(r)) => r.kind == IndexKind::Local,
        (Some(h), Some(r)) => h.index_name == r.index_name,
        (Some(_), None) => false,
    }
}

/// Compile `filter` for an indexed query.
///
/// The result may carry no hash condition, in which case it cannot be run
/// as a query; [`plan`] falls back to [`compile_scan`] then.
pub fn compile_query(
    schema: &ModelSchema,
    filter: &Filter,
) -> Result<ExpressionDescriptor, InputError> {
    let mut ph = Placeholders::new();
    let mut fragments: Vec<Fragment<'_>> = Vec::with_capacity(filter.conditions.len());

    for (attr, condition) in &filter.conditions {
        let fragment = match (classify(schema, attr, filter), condition) {
            (Role::Hash(index), Condition::Equals(v)) => {
                let name = ph.name(attr);
                Fragment {
                    attr: attr.clone(),
                    text: compare(&mut ph, schema, &name, attr, Operator::Eq, v),
                    slot: Slot::Hash(index),
                }
            }
            (Role::Hash(_), _) => {
                warn!(
                    model = %schema.name,
                    attribute = %attr,
                    "only bare equality can select a partition, filtering instead"
                );
                Fragment {
                    attr: attr.clone(),
                    text: render_filter(&mut ph, schema, attr, condition)?,
                    slot: Slot::Filter,
                }
            }
            (Role::Range(index), _) => match render_range_key(&mut ph, schema, attr, condition) {
                Some(text) => Fragment {
                    attr: attr.clone(),
                    text,
                    slot: Slot::Range(index),
                },
                None => Fragment {
                    attr: attr.clone(),
                    text: render_filter(&mut ph, schema, attr, condition)?,
                    slot: Slot::Filter,
                },
            },
            (Role::Plain, _) => Fragment {
                attr: attr.clone(),
                text: render_filter(&mut ph, schema, attr, condition)?,
                slot: Slot::Filter,
            },
        };
        fragments.push(fragment);
    }

    // Partition: the table's own hash key wins, otherwise the last index hash.
    let hash_candidates: Vec<usize> = fragments
        .iter()
        .enumerate()
        .filter(|(_, f)| matches!(f.slot, Slot::Hash(_)))
        .map(|(i, _)| i)
        .collect();
    let chosen_hash = hash_candidates
        .iter()
        .copied()
        .find(|&i| matches!(fragments[i].slot, Slot::Hash(None)))
        .or_else(|| hash_candidates.last().copied());
    if hash_candidates.len() > 1 {
        warn!(
            model = %schema.name,
            candidates = hash_candidates.len(),
            chosen = ?chosen_hash.map(|i| fragments[i].attr.as_str()),
            "several partition keys in where, keeping one"
        );
    }
    let hash_index = chosen_hash.and_then(|i| match fragments[i].slot {
        Slot::Hash(index) => index,
        _ => None,
    });

    // Sort key: must belong to the same table or index; the table's own range
    // key wins, otherwise the last compatible index range.
    let range_candidates: Vec<usize> = match chosen_hash {
        Some(_) => fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| matches!(f.slot, Slot::Range(r) if compatible(hash_index, r)))
            .map(|(i, _)| i)
            .collect(),
        None => Vec::new(),
    };
    let chosen_range = range_candidates
        .iter()
        .copied()
        .find(|&i| hash_index.is_none() && matches!(fragments[i].slot, Slot::Range(None)))
        .or_else(|| range_candidates.last().copied());
    if range_candidates.len() > 1 {
        warn!(
            model = %schema.name,
            candidates = range_candidates.len(),
            chosen = ?chosen_range.map(|i| fragments[i].attr.as_str()),
            "several sort keys in where, keeping one"
        );
    }
    let range_index = chosen_range.and_then(|i| match fragments[i].slot {
        Slot::Range(index) => index,
        _ => None,
    });

    let index_name = hash_index
        .or(range_index)
        .map(|idx| idx.index_name.clone());

    let mut descriptor = ExpressionDescriptor {
        index_name,
        ..Default::default()
    };
    for (i, fragment) in fragments.into_iter().enumerate() {
        if Some(i) == chosen_hash {
            descriptor.hash_condition = Some(fragment.text);
        } else if Some(i) == chosen_range {
            descriptor.range_condition = Some(fragment.text);
        } else {
            if !matches!(fragment.slot, Slot::Filter) && chosen_hash.is_some() {
                debug!(attribute = %fragment.attr, "key condition demoted to filter");
            }
            descriptor.filter_parts.push(fragment.text);
        }
    }
    let (names, values) = ph.into_maps();
    descriptor.names = names;
    descriptor.values = values;

    debug!(
        model = %schema.name,
        index = ?descriptor.index_name,
        key_condition = ?descriptor.key_condition_expression(),
        filter = ?descriptor.filter_expression(),
        "compiled query"
    );
    Ok(descriptor)
}

/// Compile `filter` for a full scan: every condition is a filter fragment.
pub fn compile_scan(
    schema: &ModelSchema,
    filter: &Filter,
) -> Result<ExpressionDescriptor, InputError> {
    let mut ph = Placeholders::new();
    let mut descriptor = ExpressionDescriptor::default();
    for (attr, condition) in &filter.conditions {
        descriptor
            .filter_parts
            .push(render_filter(&mut ph, schema, attr, condition)?);
    }
    let (names, values) = ph.into_maps();
    descriptor.names = names;
    descriptor.values = values;

    debug!(
        model = %schema.name,
        filter = ?descriptor.filter_expression(),
        "compiled scan"
    );
    Ok(descriptor)
}

/// Choose between an indexed query and a full scan.
///
/// A query is possible when the table's or a global index's hash key is in
/// `where` as a bare equality.
pub fn plan(schema: &ModelSchema, filter: &Filter) -> Result<QueryPlan, InputError> {
    let query = compile_query(schema, filter)?;
    if query.hash_condition.is_some() {
        return Ok(QueryPlan::Query(query));
    }
    Ok(QueryPlan::Scan(compile_scan(schema, filter)?))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::registry::ModelRegistry;
    use crate::schema::ModelDefinition;
    use crate::testing::order_definition;

    fn order_schema() -> Arc<ModelSchema> {
        ModelRegistry::new().define_model(order_definition()).unwrap()
    }

    fn indexed_schema() -> Arc<ModelSchema> {
        let definition = ModelDefinition::from_json(
            "Order",
            &json!({
                "customerId": { "type": "string", "keyType": "hash" },
                "orderId": { "type": "number", "keyType": "range" },
                "id": { "type": "string", "keyType": "pk" },
                "placedAt": { "type": "date", "index": { "local": { "project": true } } },
                "status": { "type": "string", "index": { "global": { "rangeKey": "total" } } },
                "total": "number"
            }),
            &Value::Null,
        )
        .unwrap();
        ModelRegistry::new().define_model(definition).unwrap()
    }

    fn filter(value: serde_json::Value) -> Filter {
        Filter::from_value(&value).unwrap()
    }

    #[test]
    fn test_should_compile_primary_hash_equality() {
        let schema = order_schema();
        let d = compile_query(&schema, &filter(json!({"where": {"customerId": "X"}}))).unwrap();
        assert!(!d.uses_index());
        assert_eq!(d.key_condition_parts(), ["#C = :customerId"]);
        assert_eq!(d.values[":customerId"], json!("X"));
        assert_eq!(d.names["#C"], "customerId");
        assert_eq!(d.filter_expression(), None);
    }

    #[test]
    fn test_should_translate_range_operator() {
        let schema = order_schema();
        let d = compile_query(
            &schema,
            &filter(json!({"where": {"customerId": "c1", "orderId": {"gt": 5}}})),
        )
        .unwrap();
        assert_eq!(d.range_condition.as_deref(), Some("#O > :orderId"));
        assert_eq!(d.values[":orderId"], json!(5));
        assert_eq!(
            d.key_condition_expression().as_deref(),
            Some("#C = :customerId AND #O > :orderId")
        );
    }

    #[test]
    fn test_should_treat_range_pair_as_between() {
        let schema = order_schema();
        let d = compile_query(
            &schema,
            &filter(json!({"where": {"customerId": "c1", "orderId": [1, 10]}})),
        )
        .unwrap();
        assert_eq!(
            d.range_condition.as_deref(),
            Some("#O BETWEEN :orderId_start AND :orderId_end")
        );
        assert_eq!(d.values[":orderId_start"], json!(1));
        assert_eq!(d.values[":orderId_end"], json!(10));
    }

    #[test]
    fn test_should_compile_inq_on_plain_attribute_as_filter() {
        let schema = order_schema();
        let d = compile_query(
            &schema,
            &filter(json!({"where": {"customerId": "X", "status": {"inq": ["a", "b"]}}})),
        )
        .unwrap();
        assert_eq!(d.key_condition_parts(), ["#C = :customerId"]);
        assert_eq!(d.filter_parts, ["#S IN (:status_0, :status_1)"]);
        assert_eq!(
            d.filter_expression().as_deref(),
            Some("#S IN (:status_0, :status_1)")
        );
        assert_eq!(d.values[":status_1"], json!("b"));
    }

    #[test]
    fn test_should_coerce_key_values_to_declared_type() {
        let schema = order_schema();
        let d = compile_query(
            &schema,
            &filter(json!({"where": {"customerId": "c1", "orderId": {"lte": "7"}}})),
        )
        .unwrap();
        assert_eq!(d.values[":orderId"], json!(7));
    }

    #[test]
    fn test_should_scan_when_hash_condition_is_an_operator() {
        let schema = order_schema();
        let f = filter(json!({"where": {"customerId": {"gt": "c"}}}));
        let d = compile_query(&schema, &f).unwrap();
        assert!(d.hash_condition.is_none());
        assert_eq!(d.filter_parts, ["#C > :customerId"]);

        let plan = plan(&schema, &f).unwrap();
        assert!(!plan.is_query());
    }

    #[test]
    fn test_should_scan_when_hash_value_is_a_list() {
        let schema = order_schema();
        let plan = plan(&schema, &filter(json!({"where": {"customerId": ["a", "b"]}}))).unwrap();
        let QueryPlan::Scan(d) = plan else {
            panic!("expected scan");
        };
        assert_eq!(
            d.filter_expression().as_deref(),
            Some("#C IN (:customerId_0, :customerId_1)")
        );
    }

    #[test]
    fn test_should_select_global_index_on_its_hash() {
        let schema = indexed_schema();
        let d = compile_query(
            &schema,
            &filter(json!({"where": {"status": "open", "total": {"gte": 10}}})),
        )
        .unwrap();
        assert_eq!(d.index_name.as_deref(), Some("statusGlobalIndex"));
        assert_eq!(d.hash_condition.as_deref(), Some("#S = :status"));
        assert_eq!(d.range_condition.as_deref(), Some("#T >= :total"));
        assert!(d.filter_expression().is_none());
    }

    #[test]
    fn test_should_select_local_index_on_its_range() {
        let schema = indexed_schema();
        let d = compile_query(
            &schema,
            &filter(json!({"where": {
                "customerId": "c1",
                "placedAt": {"gt": "1970-01-01T00:00:01Z"}
            }})),
        )
        .unwrap();
        assert_eq!(d.index_name.as_deref(), Some("placedAtLocalIndex"));
        assert_eq!(d.range_condition.as_deref(), Some("#P > :placedAt"));
        assert_eq!(d.values[":placedAt"], json!(1000));
    }

    #[test]
    fn test_should_prefer_primary_range_over_local_index() {
        let schema = indexed_schema();
        let d = compile_query(
            &schema,
            &filter(json!({"where": {
                "customerId": "c1",
                "placedAt": {"gt": 1},
                "orderId": 3
            }})),
        )
        .unwrap();
        assert!(!d.uses_index());
        assert_eq!(d.range_condition.as_deref(), Some("#O = :orderId"));
        assert_eq!(d.filter_parts, ["#P > :placedAt"]);
    }

    #[test]
    fn test_should_prefer_primary_hash_over_index_hash() {
        let schema = indexed_schema();
        let d = compile_query(
            &schema,
            &filter(json!({"where": {"status": "open", "customerId": "c1"}})),
        )
        .unwrap();
        assert!(!d.uses_index());
        assert_eq!(d.hash_condition.as_deref(), Some("#C = :customerId"));
        assert_eq!(d.filter_parts, ["#S = :status"]);
    }

    #[test]
    fn test_should_treat_index_range_as_plain_without_its_hash() {
        let schema = indexed_schema();
        let d = compile_query(
            &schema,
            &filter(json!({"where": {"customerId": "c1", "total": {"gt": 3}}})),
        )
        .unwrap();
        assert!(!d.uses_index());
        assert!(d.range_condition.is_none());
        assert_eq!(d.filter_parts, ["#T > :total"]);
    }

    #[test]
    fn test_should_keep_neq_on_range_key_as_filter() {
        let schema = order_schema();
        let d = compile_query(
            &schema,
            &filter(json!({"where": {"customerId": "c1", "orderId": {"neq": 2}}})),
        )
        .unwrap();
        assert!(d.range_condition.is_none());
        assert_eq!(d.filter_parts, ["#O <> :orderId"]);
    }

    #[test]
    fn test_should_compile_scan_conditions_as_filters() {
        let schema = order_schema();
        let d = compile_scan(
            &schema,
            &filter(json!({"where": {"total": {"between": [5, 10]}, "status": "open"}})),
        )
        .unwrap();
        assert!(d.key_condition_parts().is_empty());
        assert_eq!(
            d.filter_expression().as_deref(),
            Some("#T BETWEEN :total_start AND :total_end AND #S = :status")
        );
    }

    #[test]
    fn test_should_reject_empty_in_set() {
        let schema = order_schema();
        let err = compile_scan(&schema, &filter(json!({"where": {"status": {"inq": []}}})))
            .unwrap_err();
        assert!(matches!(err, InputError::EmptyInSet(attr) if attr == "status"));
    }

    #[test]
    fn test_should_build_query_input() {
        let schema = order_schema();
        let d = compile_query(&schema, &filter(json!({"where": {"customerId": "c1"}}))).unwrap();
        let input = d.to_query_input(&schema.table_name);
        assert_eq!(input.table_name, "Order");
        assert_eq!(
            input.key_condition_expression.as_deref(),
            Some("#C = :customerId")
        );
        assert_eq!(
            input.expression_attribute_values[":customerId"],
            dynorm_model::AttributeValue::string("c1")
        );
        assert!(input.filter_expression.is_none());
    }
}
