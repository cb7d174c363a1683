//! Compiled parameter expressions.
//!
//! An expression string is tokenized and parsed exactly once, when the
//! declaration or pending edit is made, so syntax errors surface at edit time
//! rather than mid-trial. Constant values are wrapped in the same type for
//! uniformity.

use core::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::{Expr, Literal};
use crate::eval::expression::Value;
use crate::parser::{parse_expression, ParseError};
use crate::tokenizer::{Tokenizer, TokenizerError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Tokenize error: {0}")]
    Tokenize(#[from] TokenizerError),
    #[error("{0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone)]
pub struct ParameterExpression {
    source: String,
    expr: Arc<Expr>,
}

impl ParameterExpression {
    /// Compiles an expression string.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = Tokenizer::new().tokenize(source)?;
        let expr = parse_expression(&tokens)?;
        Ok(Self {
            source: source.to_string(),
            expr: Arc::new(expr),
        })
    }

    /// Wraps a raw value; resolves trivially and is cached like any other
    /// expression.
    pub fn constant(value: Value) -> Self {
        Self {
            source: render_value(&value),
            expr: Arc::new(value_to_expr(value)),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> Arc<Expr> {
        self.expr.clone()
    }
}

// 等価性は式テキストで判定する（編集面での同一性）。
impl PartialEq for ParameterExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for ParameterExpression {}

impl fmt::Display for ParameterExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl FromStr for ParameterExpression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Value> for ParameterExpression {
    fn from(value: Value) -> Self {
        Self::constant(value)
    }
}

impl From<i64> for ParameterExpression {
    fn from(value: i64) -> Self {
        Self::constant(Value::Integer(value))
    }
}

impl From<f64> for ParameterExpression {
    fn from(value: f64) -> Self {
        Self::constant(Value::Float(value))
    }
}

impl From<bool> for ParameterExpression {
    fn from(value: bool) -> Self {
        Self::constant(Value::Boolean(value))
    }
}

fn value_to_expr(value: Value) -> Expr {
    match value {
        Value::Integer(i) => Expr::Literal(Literal::Integer(i)),
        Value::Float(f) => Expr::Literal(Literal::Float(f)),
        Value::String(s) => Expr::Literal(Literal::String(s)),
        Value::Boolean(b) => Expr::Literal(Literal::Boolean(b)),
        Value::Null => Expr::Literal(Literal::Null),
        Value::List(items) => Expr::List(items.into_iter().map(value_to_expr).collect()),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        Value::List(items) => {
            let rendered = items.iter().map(render_value).collect::<Vec<_>>();
            format!("[{}]", rendered.join(", "))
        }
        other => format!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;

    #[test]
    fn test_parse_compiles_once() {
        let expression = ParameterExpression::parse("cue_side == 'left' ? 0.2 : 0.8").unwrap();
        assert_eq!(expression.source(), "cue_side == 'left' ? 0.2 : 0.8");
        assert!(matches!(*expression.expr(), Expr::Conditional { .. }));
    }

    #[test]
    fn test_parse_rejects_invalid_syntax() {
        assert!(ParameterExpression::parse("1 +").is_err());
        assert!(ParameterExpression::parse("toss(0.5").is_err());
        assert!(ParameterExpression::parse("").is_err());
    }

    #[test]
    fn test_equality_is_by_source() {
        let a = ParameterExpression::parse("x + 1").unwrap();
        let b = ParameterExpression::parse("x + 1").unwrap();
        let c = ParameterExpression::parse("x + 2").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        // 意味が同じでもテキストが違えば別物
        let spaced = ParameterExpression::parse("x+1").unwrap();
        assert_ne!(a, spaced);
    }

    #[test]
    fn test_constant_roundtrip() {
        let expression = ParameterExpression::constant(Value::Float(0.5));
        assert_eq!(expression.source(), "0.5");
        assert!(matches!(
            *expression.expr(),
            Expr::Literal(Literal::Float(f)) if (f - 0.5).abs() < f64::EPSILON
        ));

        let expression = ParameterExpression::constant(Value::String("left".into()));
        assert_eq!(expression.source(), "'left'");

        let expression = ParameterExpression::constant(Value::List(vec![
            Value::Integer(1),
            Value::String("a".into()),
        ]));
        assert_eq!(expression.source(), "[1, 'a']");
    }

    #[test]
    fn test_from_str() {
        let expression: ParameterExpression = "x * 2".parse().unwrap();
        assert!(matches!(
            *expression.expr(),
            Expr::BinaryOp {
                op: BinaryOperator::Multiply,
                ..
            }
        ));
    }
}
