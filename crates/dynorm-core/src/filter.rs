//! Caller filters: `where`, `order`, `limit`, `offset`, `minResults`, `include`.
//!
//! Conditions are classified once, at parse time, into [`Condition`]
//! variants; the compiler never inspects raw JSON shapes.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::InputError;

/// Comparison operators of the filter vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    /// Expression symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "eq" | "=" => Some(Self::Eq),
            "neq" => Some(Self::Neq),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            _ => None,
        }
    }
}

/// One `where` condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Bare scalar: equality.
    Equals(Value),
    /// `{op: value}`.
    Operator(Operator, Value),
    /// `{between: [start, end]}`.
    Range { start: Value, end: Value },
    /// `{inq: [..]}`.
    InSet(Vec<Value>),
    /// Bare list: `BETWEEN` pair on a range key, `IN` anywhere else.
    List(Vec<Value>),
}

impl Condition {
    /// Classify a raw JSON condition.
    pub fn from_value(attr: &str, value: &Value) -> Result<Self, InputError> {
        match value {
            Value::Array(items) => Ok(Self::List(items.clone())),
            Value::Object(obj) => Self::from_object(attr, obj),
            scalar => Ok(Self::Equals(scalar.clone())),
        }
    }

    fn from_object(attr: &str, obj: &Map<String, Value>) -> Result<Self, InputError> {
        let mut entries = obj.iter();
        let Some((op, operand)) = entries.next() else {
            return Err(InputError::InvalidFilter(format!(
                "empty condition object for `{attr}`"
            )));
        };
        if entries.next().is_some() {
            warn!(attribute = %attr, operator = %op, "condition has several operators, only the first is used");
        }

        match op.as_str() {
            "between" => match operand.as_array().map(Vec::as_slice) {
                Some([start, end]) => Ok(Self::Range {
                    start: start.clone(),
                    end: end.clone(),
                }),
                _ => Err(InputError::InvalidFilter(format!(
                    "`between` on `{attr}` needs a two-element list"
                ))),
            },
            "inq" => match operand {
                Value::Array(items) => Ok(Self::InSet(items.clone())),
                _ => Err(InputError::InvalidFilter(format!(
                    "`inq` on `{attr}` needs a list"
                ))),
            },
            other => match Operator::from_key(other) {
                Some(operator) => Ok(Self::Operator(operator, operand.clone())),
                None => {
                    warn!(attribute = %attr, operator = %other, "unknown operator, treating as equality");
                    Ok(Self::Operator(Operator::Eq, operand.clone()))
                }
            },
        }
    }

    /// Whether this is a bare equality, the only form usable on a hash key.
    #[must_use]
    pub fn is_bare_equality(&self) -> bool {
        matches!(self, Self::Equals(_))
    }
}

/// A sort key with its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub field: String,
    pub descending: bool,
}

impl OrderSpec {
    /// Parse `"field"`, `"field ASC"` or `"field DESC"`.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split_whitespace();
        let field = parts.next()?.to_owned();
        let descending = parts
            .next()
            .is_some_and(|dir| dir.eq_ignore_ascii_case("desc"));
        Some(Self { field, descending })
    }
}

/// A parsed caller filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Conditions in caller order.
    pub conditions: Vec<(String, Condition)>,
    pub order: Vec<OrderSpec>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub min_results: Option<usize>,
    /// Relations to load, handed to the relation loader as is.
    pub include: Option<Value>,
}

impl Filter {
    /// An empty filter: every item, default order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON filter shape.
    ///
    /// `limit: 0` means no limit; `skip` is an alias of `offset`.
    pub fn from_value(value: &Value) -> Result<Self, InputError> {
        let obj = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(obj) => obj,
            other => {
                return Err(InputError::InvalidFilter(format!(
                    "filter must be an object, got {other}"
                )));
            }
        };

        let mut filter = Self::default();

        match obj.get("where") {
            None | Some(Value::Null) => {}
            Some(Value::Object(conditions)) => {
                for (attr, cond) in conditions {
                    filter
                        .conditions
                        .push((attr.clone(), Condition::from_value(attr, cond)?));
                }
            }
            Some(other) => {
                return Err(InputError::InvalidFilter(format!(
                    "`where` must be an object, got {other}"
                )));
            }
        }

        match obj.get("order") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => {
                filter.order = s.split(',').filter_map(OrderSpec::parse).collect();
            }
            Some(Value::Array(items)) => {
                for item in items {
                    let Some(s) = item.as_str() else {
                        return Err(InputError::InvalidFilter(format!(
                            "`order` entries must be strings, got {item}"
                        )));
                    };
                    filter.order.extend(OrderSpec::parse(s));
                }
            }
            Some(other) => {
                return Err(InputError::InvalidFilter(format!(
                    "`order` must be a string or a list, got {other}"
                )));
            }
        }

        if let Some(limit) = obj.get("limit") {
            filter.limit = parse_count(limit)
                .ok_or_else(|| InputError::InvalidLimit(limit.to_string()))?
                .filter(|n| *n > 0);
        }
        if let Some(offset) = obj.get("offset").or_else(|| obj.get("skip")) {
            filter.offset = parse_count(offset)
                .ok_or_else(|| InputError::InvalidOffset(offset.to_string()))?
                .unwrap_or(0);
        }
        if let Some(min) = obj.get("minResults") {
            filter.min_results = parse_count(min)
                .ok_or_else(|| InputError::InvalidMinResults(min.to_string()))?
                .filter(|n| *n > 0);
        }
        filter.include = obj.get("include").filter(|v| !v.is_null()).cloned();

        Ok(filter)
    }

    /// Add a bare equality condition.
    #[must_use]
    pub fn where_eq(self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_condition(attr, Condition::Equals(value.into()))
    }

    /// Add a condition.
    #[must_use]
    pub fn where_condition(mut self, attr: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((attr.into(), condition));
        self
    }

    /// Append sort keys (`"field DESC"`, comma-separated allowed).
    #[must_use]
    pub fn order_by(mut self, spec: &str) -> Self {
        self.order
            .extend(spec.split(',').filter_map(OrderSpec::parse));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn min_results(mut self, min: usize) -> Self {
        self.min_results = (min > 0).then_some(min);
        self
    }

    /// Only the conditions; no window, order or relations.
    #[must_use]
    pub fn where_only(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            ..Self::default()
        }
    }

    /// The condition on `attr`, if any.
    #[must_use]
    pub fn condition(&self, attr: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|(name, _)| name == attr)
            .map(|(_, cond)| cond)
    }
}

/// `Some(None)` for null, `Some(Some(n))` for a count, `None` when invalid.
fn parse_count(value: &Value) -> Option<Option<usize>> {
    match value {
        Value::Null => Some(None),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return usize::try_from(u).ok().map(Some);
            }
            let f = n.as_f64()?;
            if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX.into() {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                return Some(Some(f as usize));
            }
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_should_classify_condition_shapes() {
        assert_eq!(
            Condition::from_value("a", &json!("x")).unwrap(),
            Condition::Equals(json!("x"))
        );
        assert_eq!(
            Condition::from_value("a", &json!({"gt": 5})).unwrap(),
            Condition::Operator(Operator::Gt, json!(5))
        );
        assert_eq!(
            Condition::from_value("a", &json!({"between": [1, 10]})).unwrap(),
            Condition::Range {
                start: json!(1),
                end: json!(10)
            }
        );
        assert_eq!(
            Condition::from_value("a", &json!({"inq": ["a", "b"]})).unwrap(),
            Condition::InSet(vec![json!("a"), json!("b")])
        );
        assert_eq!(
            Condition::from_value("a", &json!([1, 2, 3])).unwrap(),
            Condition::List(vec![json!(1), json!(2), json!(3)])
        );
    }

    #[test]
    fn test_should_fall_back_to_equality_for_unknown_operator() {
        assert_eq!(
            Condition::from_value("a", &json!({"like": "x%"})).unwrap(),
            Condition::Operator(Operator::Eq, json!("x%"))
        );
    }

    #[test]
    fn test_should_reject_malformed_between_and_inq() {
        assert!(Condition::from_value("a", &json!({"between": [1]})).is_err());
        assert!(Condition::from_value("a", &json!({"inq": "a"})).is_err());
        assert!(Condition::from_value("a", &json!({})).is_err());
    }

    #[test]
    fn test_should_parse_full_filter_in_caller_order() {
        let filter = Filter::from_value(&json!({
            "where": {"status": "open", "customerId": "c1"},
            "order": "total DESC, orderId",
            "limit": 15,
            "skip": 10,
            "minResults": 50
        }))
        .unwrap();
        let attrs: Vec<_> = filter.conditions.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(attrs, ["status", "customerId"]);
        assert_eq!(
            filter.order,
            [
                OrderSpec {
                    field: "total".to_owned(),
                    descending: true
                },
                OrderSpec {
                    field: "orderId".to_owned(),
                    descending: false
                }
            ]
        );
        assert_eq!(filter.limit, Some(15));
        assert_eq!(filter.offset, 10);
        assert_eq!(filter.min_results, Some(50));
    }

    #[test]
    fn test_should_reject_non_numeric_window() {
        assert!(matches!(
            Filter::from_value(&json!({"limit": "ten"})),
            Err(InputError::InvalidLimit(_))
        ));
        assert!(matches!(
            Filter::from_value(&json!({"limit": "15"})),
            Err(InputError::InvalidLimit(_))
        ));
        assert!(matches!(
            Filter::from_value(&json!({"skip": "10"})),
            Err(InputError::InvalidOffset(_))
        ));
        assert!(matches!(
            Filter::from_value(&json!({"offset": -1})),
            Err(InputError::InvalidOffset(_))
        ));
        assert!(matches!(
            Filter::from_value(&json!({"minResults": true})),
            Err(InputError::InvalidMinResults(_))
        ));
    }

    #[test]
    fn test_should_treat_zero_limit_as_unbounded() {
        let filter = Filter::from_value(&json!({"limit": 0})).unwrap();
        assert_eq!(filter.limit, None);
    }

    #[test]
    fn test_should_accept_order_list() {
        let filter = Filter::from_value(&json!({"order": ["a ASC", "b desc"]})).unwrap();
        assert!(!filter.order[0].descending);
        assert!(filter.order[1].descending);
    }
}
