//! Lexer and recursive-descent parser for the expression dialect.
//!
//! Keywords and function names are matched case-insensitively.

use std::fmt;

use super::ast::{CompareOp, Expr, FunctionName, LogicalOp, Operand, SetAction, UpdateExpr};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced while parsing or evaluating an expression.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Unexpected end of expression")]
    UnexpectedEof,

    #[error("Unresolved expression attribute name: {name}")]
    UnresolvedName { name: String },

    #[error("Unresolved expression attribute value: {name}")]
    UnresolvedValue { name: String },

    #[error("Invalid operand for {operation}: {message}")]
    InvalidOperand { operation: String, message: String },

    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String },
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Bare attribute name.
    Word(String),
    /// `#name` placeholder, prefix included.
    Name(String),
    /// `:value` placeholder, prefix included.
    Value(String),
    Cmp(CompareOp),
    Func(FunctionName),
    Keyword(Keyword),
    Comma,
    Open,
    Close,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    And,
    Or,
    Not,
    Between,
    In,
    Set,
    Remove,
}

impl Keyword {
    fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Between => "BETWEEN",
            Self::In => "IN",
            Self::Set => "SET",
            Self::Remove => "REMOVE",
        }
    }
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("and", Keyword::And),
    ("or", Keyword::Or),
    ("not", Keyword::Not),
    ("between", Keyword::Between),
    ("in", Keyword::In),
    ("set", Keyword::Set),
    ("remove", Keyword::Remove),
];

const FUNCTIONS: &[(&str, FunctionName)] = &[
    ("attribute_exists", FunctionName::AttributeExists),
    ("attribute_not_exists", FunctionName::AttributeNotExists),
    ("begins_with", FunctionName::BeginsWith),
];

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "identifier '{w}'"),
            Self::Name(p) | Self::Value(p) => f.write_str(p),
            Self::Cmp(op) => write!(f, "'{op}'"),
            Self::Func(name) => write!(f, "{name}"),
            Self::Keyword(kw) => f.write_str(kw.as_str()),
            Self::Comma => f.write_str("','"),
            Self::Open => f.write_str("'('"),
            Self::Close => f.write_str("')'"),
            Self::End => f.write_str("end of expression"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split `input` into tokens, always terminated by [`Token::End`].
fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((at, ch)) = chars.next() {
        let token = match ch {
            c if c.is_ascii_whitespace() => continue,
            ',' => Token::Comma,
            '(' => Token::Open,
            ')' => Token::Close,
            '=' => Token::Cmp(CompareOp::Eq),
            '<' | '>' => {
                let next = chars.peek().map(|&(_, c)| c);
                let (op, wide) = match (ch, next) {
                    ('<', Some('=')) => (CompareOp::Le, true),
                    ('<', Some('>')) => (CompareOp::Ne, true),
                    ('<', _) => (CompareOp::Lt, false),
                    (_, Some('=')) => (CompareOp::Ge, true),
                    _ => (CompareOp::Gt, false),
                };
                if wide {
                    chars.next();
                }
                Token::Cmp(op)
            }
            '#' | ':' | '_' | 'a'..='z' | 'A'..='Z' => {
                let mut end = at + ch.len_utf8();
                while let Some(&(i, c)) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                let text = &input[at..end];
                match ch {
                    '#' | ':' if text.len() == 1 => {
                        return Err(ExpressionError::UnexpectedToken {
                            expected: format!("name after '{ch}'"),
                            found: "empty".to_owned(),
                        });
                    }
                    '#' => Token::Name(text.to_owned()),
                    ':' => Token::Value(text.to_owned()),
                    _ => classify_word(text),
                }
            }
            other => {
                return Err(ExpressionError::UnexpectedToken {
                    expected: "valid token".to_owned(),
                    found: format!("'{other}'"),
                });
            }
        };
        tokens.push(token);
    }
    tokens.push(Token::End);
    Ok(tokens)
}

fn classify_word(word: &str) -> Token {
    let lower = word.to_ascii_lowercase();
    if let Some((_, kw)) = KEYWORDS.iter().find(|(k, _)| *k == lower) {
        return Token::Keyword(*kw);
    }
    if let Some((_, func)) = FUNCTIONS.iter().find(|(k, _)| *k == lower) {
        return Token::Func(*func);
    }
    Token::Word(word.to_owned())
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::End)
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::End);
        self.pos += 1;
        tok
    }

    /// Consume the next token if it equals `tok`.
    fn eat(&mut self, tok: &Token) -> bool {
        let hit = self.peek() == tok;
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn unexpected(found: Token, expected: &str) -> ExpressionError {
        if found == Token::End {
            ExpressionError::UnexpectedEof
        } else {
            ExpressionError::UnexpectedToken {
                expected: expected.to_owned(),
                found: found.to_string(),
            }
        }
    }

    fn require(&mut self, tok: &Token) -> Result<(), ExpressionError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(Self::unexpected(self.bump(), &tok.to_string()))
        }
    }

    fn finish(&mut self) -> Result<(), ExpressionError> {
        match self.bump() {
            Token::End => Ok(()),
            other => Err(Self::unexpected(other, "end of expression")),
        }
    }

    /// Left-associative chain of `next` separated by `kw`.
    fn chain(
        &mut self,
        kw: Keyword,
        op: LogicalOp,
        next: fn(&mut Self) -> Result<Expr, ExpressionError>,
    ) -> Result<Expr, ExpressionError> {
        let mut left = next(self)?;
        while self.eat(&Token::Keyword(kw)) {
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(next(self)?),
            };
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        self.chain(Keyword::Or, LogicalOp::Or, Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        self.chain(Keyword::And, LogicalOp::And, Self::parse_not)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Keyword(Keyword::Not)) {
            Ok(Expr::Not(Box::new(self.parse_not()?)))
        } else {
            self.parse_predicate()
        }
    }

    fn parse_predicate(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Open) {
            let expr = self.parse_or()?;
            self.require(&Token::Close)?;
            return Ok(expr);
        }
        if let Token::Func(name) = *self.peek() {
            self.pos += 1;
            let args = self.parse_arguments()?;
            return Ok(Expr::Function { name, args });
        }

        let left = self.parse_operand()?;
        match self.bump() {
            Token::Cmp(op) => self.finish_compare(left, op),
            Token::Keyword(Keyword::Between) => {
                let low = self.parse_operand()?;
                self.require(&Token::Keyword(Keyword::And))?;
                let high = self.parse_operand()?;
                Ok(Expr::Between {
                    value: left,
                    low,
                    high,
                })
            }
            Token::Keyword(Keyword::In) => Ok(Expr::In {
                value: left,
                list: self.parse_arguments()?,
            }),
            other => Err(Self::unexpected(other, "comparison operator, BETWEEN, or IN")),
        }
    }

    fn finish_compare(&mut self, left: Operand, op: CompareOp) -> Result<Expr, ExpressionError> {
        let right = self.parse_operand()?;
        Ok(Expr::Compare { left, op, right })
    }

    /// `( operand [, operand]* )`
    fn parse_arguments(&mut self) -> Result<Vec<Operand>, ExpressionError> {
        self.require(&Token::Open)?;
        let mut list = vec![self.parse_operand()?];
        while self.eat(&Token::Comma) {
            list.push(self.parse_operand()?);
        }
        self.require(&Token::Close)?;
        Ok(list)
    }

    fn parse_operand(&mut self) -> Result<Operand, ExpressionError> {
        match self.bump() {
            Token::Value(name) => Ok(Operand::Value(name)),
            Token::Name(name) | Token::Word(name) => Ok(Operand::Path(name)),
            other => Err(Self::unexpected(other, "attribute name, #name or :value")),
        }
    }

    fn parse_path(&mut self) -> Result<String, ExpressionError> {
        match self.parse_operand()? {
            Operand::Path(path) => Ok(path),
            Operand::Value(value) => Err(ExpressionError::InvalidOperand {
                operation: "update".to_owned(),
                message: format!("{value} is not an attribute path"),
            }),
        }
    }

    fn parse_update_expr(&mut self) -> Result<UpdateExpr, ExpressionError> {
        let mut update = UpdateExpr::default();
        loop {
            match self.bump() {
                Token::End => return Ok(update),
                Token::Keyword(Keyword::Set) => loop {
                    let path = self.parse_path()?;
                    self.require(&Token::Cmp(CompareOp::Eq))?;
                    let value = self.parse_operand()?;
                    update.set_actions.push(SetAction { path, value });
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                },
                Token::Keyword(Keyword::Remove) => loop {
                    update.remove_paths.push(self.parse_path()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                },
                other => return Err(Self::unexpected(other, "SET or REMOVE")),
            }
        }
    }
}

/// Parse a condition, filter or key-condition expression.
pub fn parse_condition(input: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(tokenize(input)?);
    let expr = parser.parse_or()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse an update expression (`SET` and `REMOVE` clauses).
pub fn parse_update(input: &str) -> Result<UpdateExpr, ExpressionError> {
    let update = Parser::new(tokenize(input)?).parse_update_expr()?;
    if update.set_actions.is_empty() && update.remove_paths.is_empty() {
        return Err(ExpressionError::UnexpectedEof);
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_key_condition() {
        let expr = parse_condition("#C = :customerId AND #O BETWEEN :o_start AND :o_end").unwrap();
        let Expr::Logical {
            op: LogicalOp::And,
            left,
            right,
        } = expr
        else {
            panic!("expected AND");
        };
        assert!(matches!(
            *left,
            Expr::Compare { op: CompareOp::Eq, ref left, .. } if *left == Operand::Path("#C".to_owned())
        ));
        assert!(matches!(*right, Expr::Between { .. }));
    }

    #[test]
    fn test_should_parse_in_list_and_precedence() {
        let expr = parse_condition("NOT #S IN (:s_0, :s_1) OR #T <> :t").unwrap();
        let Expr::Logical { op, left, .. } = expr else {
            panic!("expected OR");
        };
        assert_eq!(op, LogicalOp::Or);
        let Expr::Not(inner) = *left else {
            panic!("expected NOT");
        };
        assert!(matches!(*inner, Expr::In { ref list, .. } if list.len() == 2));
    }

    #[test]
    fn test_should_parse_set_and_remove() {
        let update = parse_update("SET #T = :total, #I = :id REMOVE notes").unwrap();
        assert_eq!(update.set_actions.len(), 2);
        assert_eq!(update.set_actions[1].value, Operand::Value(":id".to_owned()));
        assert_eq!(update.remove_paths, ["notes"]);
    }

    #[test]
    fn test_should_reject_trailing_tokens() {
        assert!(parse_condition("#A = :a :b").is_err());
        assert!(matches!(parse_condition("#A ="), Err(ExpressionError::UnexpectedEof)));
        assert!(parse_update("").is_err());
    }
}
