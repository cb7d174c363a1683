use core::fmt;

use serde::{Deserialize, Serialize};

use super::{EvalError, EvalResult};
use crate::ast::{BinaryOperator, Expr, Literal, UnaryOperator};

// 値の型システム
#[derive(Clone, Debug, PartialEq, Default, Deserialize, Serialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<Value>),
    #[default]
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                let rendered = items
                    .iter()
                    .map(|v| format!("{}", v))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{}]", rendered)
            }
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<Literal> for Value {
    fn from(lit: Literal) -> Self {
        match lit {
            Literal::Integer(i) => Value::Integer(i),
            Literal::Float(f) => Value::Float(f),
            Literal::String(s) => Value::String(s),
            Literal::Boolean(b) => Value::Boolean(b),
            Literal::Null => Value::Null,
        }
    }
}

/// The namespace an expression is evaluated against.
///
/// Parameter references recurse back into the engine through [`resolve`],
/// which inherits memoization and cycle protection from the caller's
/// resolution stack; built-in calls go through [`call`] so the engine can
/// route them to the injected function registry (and reject selector
/// constructors outside the outermost position).
///
/// [`resolve`]: Namespace::resolve
/// [`call`]: Namespace::call
pub trait Namespace {
    fn resolve(&mut self, name: &str) -> EvalResult<Value>;
    fn prior(&self, name: &str) -> Option<Value>;
    fn call(&mut self, function: &str, args: Vec<Value>) -> EvalResult<Value>;
}

pub struct ExpressionEvaluator;

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn eval_expression(
        &self,
        expr: &Expr,
        namespace: &mut dyn Namespace,
    ) -> EvalResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(Value::from(lit.clone())),
            Expr::Variable(name) => namespace.resolve(name),
            // 前試行の値が無い場合は null（初回試行でも式が評価できるように）
            Expr::Prior(name) => Ok(namespace.prior(name).unwrap_or(Value::Null)),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expression(item, namespace)?);
                }
                Ok(Value::List(values))
            }
            Expr::FunctionCall {
                function,
                arguments,
            } => self.eval_function_call(function, arguments, namespace),
            Expr::UnaryOp { op, expr } => {
                let value = self.eval_expression(expr, namespace)?;
                self.eval_unary_op(op, &value)
            }
            Expr::BinaryOp { op, left, right } => self.eval_binary_op(op, left, right, namespace),
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.eval_expression(condition, namespace)?;
                match condition {
                    Value::Boolean(true) => self.eval_expression(then_branch, namespace),
                    Value::Boolean(false) => self.eval_expression(else_branch, namespace),
                    other => Err(EvalError::Eval(format!(
                        "conditional requires a boolean condition, but got {:?}",
                        other
                    ))),
                }
            }
        }
    }

    fn eval_function_call(
        &self,
        function: &str,
        arguments: &[Expr],
        namespace: &mut dyn Namespace,
    ) -> EvalResult<Value> {
        // 引数を評価
        let mut evaluated_args = Vec::with_capacity(arguments.len());
        for arg in arguments {
            let value = self.eval_expression(arg, namespace)?;
            evaluated_args.push(value);
        }
        namespace.call(function, evaluated_args)
    }

    fn eval_unary_op(&self, op: &UnaryOperator, value: &Value) -> EvalResult<Value> {
        match (op, value) {
            (UnaryOperator::Negate, Value::Integer(i)) => Ok(Value::Integer(-i)),
            (UnaryOperator::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOperator::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
            _ => Err(EvalError::Eval(format!("{} {:?}", op, value))),
        }
    }

    // 二項演算の評価
    fn eval_binary_op(
        &self,
        op: &BinaryOperator,
        left: &Expr,
        right: &Expr,
        namespace: &mut dyn Namespace,
    ) -> EvalResult<Value> {
        let left_val = self.eval_expression(left, namespace)?;
        let right_val = self.eval_expression(right, namespace)?;

        match op {
            BinaryOperator::Add => self.eval_add(&left_val, &right_val),
            BinaryOperator::Subtract => self.eval_subtract(&left_val, &right_val),
            BinaryOperator::Multiply => self.eval_multiply(&left_val, &right_val),
            BinaryOperator::Divide => self.eval_divide(&left_val, &right_val),
            BinaryOperator::Modulo => self.eval_modulo(&left_val, &right_val),
            BinaryOperator::Equal => Ok(Value::Boolean(left_val == right_val)),
            BinaryOperator::NotEqual => Ok(Value::Boolean(left_val != right_val)),
            BinaryOperator::LessThan => {
                self.compare_values(&left_val, &right_val, |ordering| ordering.is_lt())
            }
            BinaryOperator::GreaterThan => {
                self.compare_values(&left_val, &right_val, |ordering| ordering.is_gt())
            }
            BinaryOperator::LessThanEqual => {
                self.compare_values(&left_val, &right_val, |ordering| ordering.is_le())
            }
            BinaryOperator::GreaterThanEqual => {
                self.compare_values(&left_val, &right_val, |ordering| ordering.is_ge())
            }
            BinaryOperator::And => self.eval_and(&left_val, &right_val),
            BinaryOperator::Or => self.eval_or(&left_val, &right_val),
        }
    }

    fn eval_add(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l + r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l + r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 + r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l + *r as f64)),
            (Value::String(l), Value::String(r)) => Ok(Value::String(l.clone() + r)),
            _ => Err(EvalError::Eval(format!("{:?} + {:?}", left, right))),
        }
    }

    fn eval_subtract(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l - r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l - r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 - r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l - *r as f64)),
            _ => Err(EvalError::Eval(format!("{:?} - {:?}", left, right))),
        }
    }

    fn eval_multiply(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l * r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l * r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 * r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l * *r as f64)),
            _ => Err(EvalError::Eval(format!("{:?} * {:?}", left, right))),
        }
    }

    fn eval_divide(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => {
                if *r == 0 {
                    return Err(EvalError::Eval("division by zero".to_string()));
                }
                Ok(Value::Float(*l as f64 / *r as f64))
            }
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l / r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 / r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l / *r as f64)),
            _ => Err(EvalError::Eval(format!("{:?} / {:?}", left, right))),
        }
    }

    fn eval_modulo(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => {
                if *r == 0 {
                    return Err(EvalError::Eval("modulo by zero".to_string()));
                }
                Ok(Value::Integer(l % r))
            }
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l % r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 % r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l % *r as f64)),
            _ => Err(EvalError::Eval(format!("{:?} % {:?}", left, right))),
        }
    }

    fn eval_and(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(*l && *r)),
            _ => Err(EvalError::Eval(format!("{:?} && {:?}", left, right))),
        }
    }

    fn eval_or(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(*l || *r)),
            _ => Err(EvalError::Eval(format!("{:?} || {:?}", left, right))),
        }
    }

    // ヘルパーメソッド

    fn compare_values<F>(&self, left: &Value, right: &Value, compare: F) -> EvalResult<Value>
    where
        F: Fn(std::cmp::Ordering) -> bool,
    {
        let incomparable = || EvalError::Eval(format!("{:?} <=> {:?}", left, right));
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Boolean(compare(l.cmp(r)))),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Boolean(compare(
                l.partial_cmp(r).ok_or_else(incomparable)?,
            ))),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Boolean(compare(
                (*l as f64).partial_cmp(r).ok_or_else(incomparable)?,
            ))),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Boolean(compare(
                l.partial_cmp(&(*r as f64)).ok_or_else(incomparable)?,
            ))),
            (Value::String(l), Value::String(r)) => Ok(Value::Boolean(compare(l.cmp(r)))),
            _ => Err(incomparable()),
        }
    }
}
