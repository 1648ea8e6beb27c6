//! Expression dialect understood by the memory store.

pub mod ast;
pub mod evaluator;
pub mod parser;

pub use ast::{CompareOp, Expr, FunctionName, LogicalOp, Operand, SetAction, UpdateExpr};
pub use evaluator::EvalContext;
pub use parser::{ExpressionError, parse_condition, parse_update};
