//! Sequence selectors: stateful generators behind parameter expressions.
//!
//! Each selector returns a single element per advance; the engine advances a
//! selector at most once per trial, however many times the parameter is read
//! (that is the memoization contract). All standard selectors are infinite:
//! they never exhaust, looping or regenerating when the underlying sequence
//! runs out. Selectors do not modify the sequence they were built from.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use super::expression::Value;
use super::{EvalError, EvalResult};

pub trait Selector: Send {
    fn advance(&mut self, rng: &mut StdRng) -> EvalResult<Value>;
}

pub trait SelectorBuilder: Send + Sync {
    fn build(&self, args: &[Value]) -> EvalResult<Box<dyn Selector>>;
}

impl<F> SelectorBuilder for F
where
    F: Fn(&[Value]) -> EvalResult<Box<dyn Selector>> + Send + Sync,
{
    fn build(&self, args: &[Value]) -> EvalResult<Box<dyn Selector>> {
        self(args)
    }
}

#[derive(Clone, Default)]
pub struct SelectorRegistry {
    builders: HashMap<String, Arc<dyn SelectorBuilder>>,
}

impl SelectorRegistry {
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registry with the standard selector set.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("ascending", Arc::new(build_ascending));
        registry.register("descending", Arc::new(build_descending));
        registry.register("exact_order", Arc::new(build_exact_order));
        registry.register("shuffled_set", Arc::new(build_shuffled_set));
        registry.register("pseudorandom", Arc::new(build_pseudorandom));
        registry.register("counterbalanced", Arc::new(build_counterbalanced));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, builder: Arc<dyn SelectorBuilder>) {
        self.builders.insert(name.into(), builder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn build(&self, name: &str, args: &[Value]) -> EvalResult<Box<dyn Selector>> {
        match self.builders.get(name) {
            Some(builder) => builder.build(args),
            None => Err(EvalError::UnknownFunction(name.to_string())),
        }
    }
}

// 元シーケンスの検証と浅いコピー
fn check_sequence(name: &str, args: &[Value]) -> EvalResult<Vec<Value>> {
    let sequence = match args {
        [Value::List(items)] => items.clone(),
        _ => {
            return Err(EvalError::Eval(format!(
                "{} selector requires a single list argument",
                name
            )))
        }
    };
    if sequence.is_empty() {
        return Err(EvalError::Eval("Cannot use an empty sequence".to_string()));
    }
    Ok(sequence)
}

/// Sorts a sequence of all-numeric or all-string values.
fn sort_sequence(name: &str, mut sequence: Vec<Value>, descending: bool) -> EvalResult<Vec<Value>> {
    let all_numeric = sequence
        .iter()
        .all(|v| matches!(v, Value::Integer(_) | Value::Float(_)));
    let all_strings = sequence.iter().all(|v| matches!(v, Value::String(_)));
    if !all_numeric && !all_strings {
        return Err(EvalError::Eval(format!(
            "{} selector requires a uniformly ordered sequence of numbers or strings",
            name
        )));
    }

    if all_numeric {
        let key = |v: &Value| match v {
            Value::Integer(i) => *i as f64,
            Value::Float(f) => *f,
            _ => unreachable!(),
        };
        sequence.sort_by(|a, b| key(a).total_cmp(&key(b)));
    } else {
        sequence.sort_by(|a, b| match (a, b) {
            (Value::String(l), Value::String(r)) => l.cmp(r),
            _ => unreachable!(),
        });
    }
    if descending {
        sequence.reverse();
    }
    Ok(sequence)
}

/// Loops over a fixed sequence forever.
struct CyclingSelector {
    sequence: Vec<Value>,
    index: usize,
}

impl Selector for CyclingSelector {
    fn advance(&mut self, _rng: &mut StdRng) -> EvalResult<Value> {
        let value = self.sequence[self.index].clone();
        self.index = (self.index + 1) % self.sequence.len();
        Ok(value)
    }
}

/// Draws without replacement, reshuffling once the set is exhausted.
struct ShuffledSetSelector {
    sequence: Vec<Value>,
    remaining: Vec<Value>,
}

impl Selector for ShuffledSetSelector {
    fn advance(&mut self, rng: &mut StdRng) -> EvalResult<Value> {
        if self.remaining.is_empty() {
            self.remaining = self.sequence.clone();
            self.remaining.shuffle(rng);
        }
        // 補充直後なので must be non-empty
        Ok(self.remaining.pop().unwrap_or(Value::Null))
    }
}

/// Uniform pick with replacement on every draw.
struct PseudorandomSelector {
    sequence: Vec<Value>,
}

impl Selector for PseudorandomSelector {
    fn advance(&mut self, rng: &mut StdRng) -> EvalResult<Value> {
        let i = rng.gen_range(0..self.sequence.len());
        Ok(self.sequence[i].clone())
    }
}

/// Presents each element an equal number of times per n-draw block.
struct CounterbalancedSelector {
    sequence: Vec<Value>,
    n: usize,
    block: Vec<Value>,
}

impl Selector for CounterbalancedSelector {
    fn advance(&mut self, rng: &mut StdRng) -> EvalResult<Value> {
        if self.block.is_empty() {
            // n 要素のブロックを均等割で構築（端数は先頭側に寄せる）
            let len = self.sequence.len();
            for (i, value) in self.sequence.iter().enumerate() {
                let share = self.n / len + usize::from(i < self.n % len);
                self.block
                    .extend(std::iter::repeat(value.clone()).take(share));
            }
            self.block.shuffle(rng);
        }
        Ok(self.block.pop().unwrap_or(Value::Null))
    }
}

fn build_ascending(args: &[Value]) -> EvalResult<Box<dyn Selector>> {
    let sequence = check_sequence("ascending", args)?;
    let sequence = sort_sequence("ascending", sequence, false)?;
    Ok(Box::new(CyclingSelector { sequence, index: 0 }))
}

fn build_descending(args: &[Value]) -> EvalResult<Box<dyn Selector>> {
    let sequence = check_sequence("descending", args)?;
    let sequence = sort_sequence("descending", sequence, true)?;
    Ok(Box::new(CyclingSelector { sequence, index: 0 }))
}

fn build_exact_order(args: &[Value]) -> EvalResult<Box<dyn Selector>> {
    let sequence = check_sequence("exact_order", args)?;
    Ok(Box::new(CyclingSelector { sequence, index: 0 }))
}

fn build_shuffled_set(args: &[Value]) -> EvalResult<Box<dyn Selector>> {
    let sequence = check_sequence("shuffled_set", args)?;
    Ok(Box::new(ShuffledSetSelector {
        sequence,
        remaining: Vec::new(),
    }))
}

fn build_pseudorandom(args: &[Value]) -> EvalResult<Box<dyn Selector>> {
    let sequence = check_sequence("pseudorandom", args)?;
    Ok(Box::new(PseudorandomSelector { sequence }))
}

fn build_counterbalanced(args: &[Value]) -> EvalResult<Box<dyn Selector>> {
    let (sequence, n) = match args {
        [Value::List(items), Value::Integer(n)] if *n > 0 => (items.clone(), *n as usize),
        _ => {
            return Err(EvalError::Eval(
                "counterbalanced selector requires a list and a positive block size".to_string(),
            ))
        }
    };
    if sequence.is_empty() {
        return Err(EvalError::Eval("Cannot use an empty sequence".to_string()));
    }
    Ok(Box::new(CounterbalancedSelector {
        sequence,
        n,
        block: Vec::new(),
    }))
}
