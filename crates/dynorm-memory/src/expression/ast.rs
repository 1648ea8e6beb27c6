//! AST for condition, key-condition and update expressions.
//!
//! Paths are top-level attribute names only; nested document paths are not
//! part of the dialect dynorm emits.

use std::fmt;

/// Condition, filter or key-condition expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `left op right`.
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// `value BETWEEN low AND high`, bounds inclusive.
    Between {
        value: Operand,
        low: Operand,
        high: Operand,
    },
    /// `value IN (list...)`.
    In { value: Operand, list: Vec<Operand> },
    /// `left AND right` / `left OR right`.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// `function_name(args...)`.
    Function {
        name: FunctionName,
        args: Vec<Operand>,
    },
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Ne => write!(f, "<>"),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Supported condition functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionName {
    AttributeExists,
    AttributeNotExists,
    BeginsWith,
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttributeExists => write!(f, "attribute_exists"),
            Self::AttributeNotExists => write!(f, "attribute_not_exists"),
            Self::BeginsWith => write!(f, "begins_with"),
        }
    }
}

/// A value producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// An attribute name, or a `#placeholder` to resolve.
    Path(String),
    /// A `:placeholder` value reference, stored with its colon.
    Value(String),
}

/// Parsed update expression.
#[derive(Debug, Clone, Default)]
pub struct UpdateExpr {
    pub set_actions: Vec<SetAction>,
    pub remove_paths: Vec<String>,
}

/// `path = value`.
#[derive(Debug, Clone)]
pub struct SetAction {
    pub path: String,
    pub value: Operand,
}

impl UpdateExpr {
    /// Every attribute path the update writes or removes, unresolved.
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        self.set_actions
            .iter()
            .map(|a| a.path.as_str())
            .chain(self.remove_paths.iter().map(String::as_str))
    }
}
