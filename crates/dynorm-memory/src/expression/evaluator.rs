//! Evaluation of parsed expressions against a stored item.

use std::cmp::Ordering;
use std::collections::HashMap;

use dynorm_model::{AttributeValue, Item};

use super::ast::{CompareOp, Expr, FunctionName, LogicalOp, Operand, UpdateExpr};
use super::parser::ExpressionError;

/// An item together with the placeholder maps of one request.
#[derive(Debug)]
pub struct EvalContext<'a> {
    pub item: &'a Item,
    pub names: &'a HashMap<String, String>,
    pub values: &'a HashMap<String, AttributeValue>,
}

impl EvalContext<'_> {
    /// Whether `expr` holds for the item.
    pub fn evaluate(&self, expr: &Expr) -> Result<bool, ExpressionError> {
        match expr {
            Expr::Compare { left, op, right } => {
                let (l, r) = (self.resolve_operand(left)?, self.resolve_operand(right)?);
                Ok(match (l, r) {
                    (Some(l), Some(r)) => compare_op(*op, &l, &r),
                    _ => *op == CompareOp::Ne,
                })
            }
            Expr::Between { value, low, high } => {
                let (Some(v), Some(lo), Some(hi)) = (
                    self.resolve_operand(value)?,
                    self.resolve_operand(low)?,
                    self.resolve_operand(high)?,
                ) else {
                    return Ok(false);
                };
                if compare_values(&lo, &hi) == Some(Ordering::Greater) {
                    return Err(ExpressionError::InvalidOperand {
                        operation: "BETWEEN".to_owned(),
                        message: format!("lower bound {lo} is greater than upper bound {hi}"),
                    });
                }
                Ok(compare_values(&v, &lo).is_some_and(Ordering::is_ge)
                    && compare_values(&v, &hi).is_some_and(Ordering::is_le))
            }
            Expr::In { value, list } => {
                let Some(v) = self.resolve_operand(value)? else {
                    return Ok(false);
                };
                for candidate in list {
                    if self
                        .resolve_operand(candidate)?
                        .is_some_and(|c| values_equal(&v, &c))
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::Logical { op, left, right } => match op {
                LogicalOp::And => Ok(self.evaluate(left)? && self.evaluate(right)?),
                LogicalOp::Or => Ok(self.evaluate(left)? || self.evaluate(right)?),
            },
            Expr::Not(inner) => Ok(!self.evaluate(inner)?),
            Expr::Function { name, args } => self.evaluate_function(*name, args),
        }
    }

    fn evaluate_function(
        &self,
        name: FunctionName,
        args: &[Operand],
    ) -> Result<bool, ExpressionError> {
        let arity = if name == FunctionName::BeginsWith { 2 } else { 1 };
        if args.len() != arity {
            return Err(ExpressionError::InvalidOperand {
                operation: name.to_string(),
                message: format!("expected {arity} operand(s), got {}", args.len()),
            });
        }
        let Operand::Path(path) = &args[0] else {
            return Err(ExpressionError::InvalidOperand {
                operation: name.to_string(),
                message: "first operand must be an attribute path".to_owned(),
            });
        };
        let present = self.item.contains_key(&self.resolve_path(path)?);
        match name {
            FunctionName::AttributeExists => Ok(present),
            FunctionName::AttributeNotExists => Ok(!present),
            FunctionName::BeginsWith => {
                let target = self.resolve_operand(&args[0])?;
                let prefix = self.resolve_operand(&args[1])?;
                match (target, prefix) {
                    (Some(AttributeValue::S(s)), Some(AttributeValue::S(p))) => {
                        Ok(s.starts_with(p.as_str()))
                    }
                    (Some(AttributeValue::B(b)), Some(AttributeValue::B(p))) => {
                        Ok(b.starts_with(p.as_ref()))
                    }
                    (_, Some(p)) if !matches!(p, AttributeValue::S(_) | AttributeValue::B(_)) => {
                        Err(ExpressionError::TypeMismatch {
                            message: format!(
                                "begins_with prefix must be S or B, got {}",
                                p.type_descriptor()
                            ),
                        })
                    }
                    _ => Ok(false),
                }
            }
        }
    }

    /// The value an operand stands for; `None` for a missing attribute.
    pub fn resolve_operand(
        &self,
        operand: &Operand,
    ) -> Result<Option<AttributeValue>, ExpressionError> {
        match operand {
            Operand::Path(path) => Ok(self.item.get(&self.resolve_path(path)?).cloned()),
            Operand::Value(name) => self
                .values
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| ExpressionError::UnresolvedValue { name: name.clone() }),
        }
    }

    /// Resolve a `#placeholder` to its attribute name; plain names pass through.
    pub fn resolve_path(&self, path: &str) -> Result<String, ExpressionError> {
        if path.starts_with('#') {
            self.names
                .get(path)
                .cloned()
                .ok_or_else(|| ExpressionError::UnresolvedName {
                    name: path.to_owned(),
                })
        } else {
            Ok(path.to_owned())
        }
    }

    /// Apply `update` to `target`, producing the item after the write.
    pub fn apply_update(
        &self,
        update: &UpdateExpr,
        target: &mut Item,
    ) -> Result<(), ExpressionError> {
        for action in &update.set_actions {
            let path = self.resolve_path(&action.path)?;
            match self.resolve_operand(&action.value)? {
                Some(value) => {
                    target.insert(path, value);
                }
                None => {
                    return Err(ExpressionError::InvalidOperand {
                        operation: "SET".to_owned(),
                        message: format!("attribute used in SET value does not exist: {path}"),
                    });
                }
            }
        }
        for path in &update.remove_paths {
            target.remove(&self.resolve_path(path)?);
        }
        Ok(())
    }
}

fn compare_op(op: CompareOp, left: &AttributeValue, right: &AttributeValue) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Lt => compare_values(left, right).is_some_and(Ordering::is_lt),
        CompareOp::Le => compare_values(left, right).is_some_and(Ordering::is_le),
        CompareOp::Gt => compare_values(left, right).is_some_and(Ordering::is_gt),
        CompareOp::Ge => compare_values(left, right).is_some_and(Ordering::is_ge),
    }
}

/// Equality with numbers compared by value, so `"5"` equals `"5.0"`.
pub fn values_equal(left: &AttributeValue, right: &AttributeValue) -> bool {
    match (left, right) {
        (AttributeValue::N(_), AttributeValue::N(_)) => {
            compare_values(left, right) == Some(Ordering::Equal)
        }
        _ => left == right,
    }
}

/// Ordering between two scalars of the same type; `None` across types.
pub fn compare_values(left: &AttributeValue, right: &AttributeValue) -> Option<Ordering> {
    match (left, right) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (AttributeValue::N(_), AttributeValue::N(_)) => {
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        }
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::{parse_condition, parse_update};

    fn item() -> Item {
        HashMap::from([
            ("customerId".to_owned(), AttributeValue::string("c1")),
            ("orderId".to_owned(), AttributeValue::number(7)),
            ("status".to_owned(), AttributeValue::string("shipped")),
        ])
    }

    fn eval(expr: &str, values: &[(&str, AttributeValue)]) -> Result<bool, ExpressionError> {
        let item = item();
        let names = HashMap::from([
            ("#C".to_owned(), "customerId".to_owned()),
            ("#O".to_owned(), "orderId".to_owned()),
            ("#S".to_owned(), "status".to_owned()),
        ]);
        let values: HashMap<_, _> = values
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        let ctx = EvalContext {
            item: &item,
            names: &names,
            values: &values,
        };
        ctx.evaluate(&parse_condition(expr)?)
    }

    #[test]
    fn test_should_compare_numbers_numerically() {
        assert!(eval("#O > :v", &[(":v", AttributeValue::number(10.5))]).is_ok_and(|b| !b));
        assert!(eval("#O = :v", &[(":v", AttributeValue::number("7.0"))]).unwrap());
        assert!(
            eval(
                "#O BETWEEN :lo AND :hi",
                &[(":lo", AttributeValue::number(7)), (":hi", AttributeValue::number(9))]
            )
            .unwrap()
        );
    }

    #[test]
    fn test_should_treat_missing_attribute_as_not_equal() {
        assert!(eval("total <> :v", &[(":v", AttributeValue::number(1))]).unwrap());
        assert!(!eval("total = :v", &[(":v", AttributeValue::number(1))]).unwrap());
        assert!(eval("attribute_not_exists(total) AND attribute_exists(#S)", &[]).unwrap());
    }

    #[test]
    fn test_should_match_in_list_and_prefix() {
        let values = [
            (":s0", AttributeValue::string("pending")),
            (":s1", AttributeValue::string("shipped")),
            (":p", AttributeValue::string("shi")),
        ];
        assert!(eval("#S IN (:s0, :s1) AND begins_with(#S, :p)", &values).unwrap());
        assert!(!eval("NOT #S IN (:s0, :s1)", &values).unwrap());
    }

    #[test]
    fn test_should_report_unresolved_placeholders() {
        assert!(matches!(
            eval("#X = :v", &[(":v", AttributeValue::number(1))]),
            Err(ExpressionError::UnresolvedName { .. })
        ));
        assert!(matches!(
            eval("#C = :missing", &[]),
            Err(ExpressionError::UnresolvedValue { .. })
        ));
    }

    #[test]
    fn test_should_apply_set_and_remove() {
        let original = item();
        let names = HashMap::from([("#T".to_owned(), "total".to_owned())]);
        let values = HashMap::from([(":total".to_owned(), AttributeValue::number(42))]);
        let ctx = EvalContext {
            item: &original,
            names: &names,
            values: &values,
        };
        let mut updated = original.clone();
        ctx.apply_update(&parse_update("SET #T = :total REMOVE status").unwrap(), &mut updated)
            .unwrap();
        assert_eq!(updated["total"], AttributeValue::number(42));
        assert!(!updated.contains_key("status"));
    }
}
