//! Built-in functions available inside parameter expressions.
//!
//! The registry is an explicit name-to-callable table injected into the
//! engine at construction. Random draws go through the engine-owned RNG so a
//! seeded run replays the same trial sequence.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use super::expression::Value;
use super::{EvalError, EvalResult};

pub trait BuiltinFunction: Send + Sync {
    fn call(&self, args: &[Value], rng: &mut StdRng) -> EvalResult<Value>;
}

impl<F> BuiltinFunction for F
where
    F: Fn(&[Value], &mut StdRng) -> EvalResult<Value> + Send + Sync,
{
    fn call(&self, args: &[Value], rng: &mut StdRng) -> EvalResult<Value> {
        self(args, rng)
    }
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn BuiltinFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Registry with the standard built-in set.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("toss", Arc::new(toss));
        registry.register("uniform", Arc::new(uniform));
        registry.register("choice", Arc::new(choice));
        registry.register("h_uniform", Arc::new(h_uniform));
        registry.register("imul", Arc::new(imul));
        registry.register("octave_space", Arc::new(octave_space));
        registry.register("len", Arc::new(len));
        registry.register("sum", Arc::new(sum));
        registry.register("avg", Arc::new(avg));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn BuiltinFunction>) {
        self.functions.insert(name.into(), function);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn call(&self, name: &str, args: &[Value], rng: &mut StdRng) -> EvalResult<Value> {
        match self.functions.get(name) {
            Some(function) => function.call(args, rng),
            None => Err(EvalError::UnknownFunction(name.to_string())),
        }
    }
}

fn expect_arity(function: &str, args: &[Value], expected: usize) -> EvalResult<()> {
    if args.len() != expected {
        return Err(EvalError::Eval(format!(
            "{} function requires exactly {} argument(s), but got {}",
            function,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn expect_number(function: &str, value: &Value) -> EvalResult<f64> {
    match value {
        Value::Integer(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        _ => Err(EvalError::Eval(format!(
            "{} function requires a number, but got {:?}",
            function, value
        ))),
    }
}

fn expect_list<'a>(function: &str, value: &'a Value) -> EvalResult<&'a [Value]> {
    match value {
        Value::List(items) => Ok(items.as_slice()),
        _ => Err(EvalError::Eval(format!(
            "{} function requires a list, but got {:?}",
            function, value
        ))),
    }
}

/// Coin flip weighted by the argument.
fn toss(args: &[Value], rng: &mut StdRng) -> EvalResult<Value> {
    expect_arity("toss", args, 1)?;
    let p = expect_number("toss", &args[0])?;
    if !(0.0..=1.0).contains(&p) {
        return Err(EvalError::Eval(format!(
            "toss function requires a probability in [0, 1], but got {}",
            p
        )));
    }
    Ok(Value::Boolean(rng.gen::<f64>() <= p))
}

/// Uniform draw from [lb, ub).
fn uniform(args: &[Value], rng: &mut StdRng) -> EvalResult<Value> {
    expect_arity("uniform", args, 2)?;
    let lb = expect_number("uniform", &args[0])?;
    let ub = expect_number("uniform", &args[1])?;
    if ub < lb {
        return Err(EvalError::Eval(format!(
            "uniform function requires lb <= ub, but got {} > {}",
            lb, ub
        )));
    }
    Ok(Value::Float(lb + (ub - lb) * rng.gen::<f64>()))
}

/// Single draw, with replacement, from the sequence.
fn choice(args: &[Value], rng: &mut StdRng) -> EvalResult<Value> {
    expect_arity("choice", args, 1)?;
    let items = expect_list("choice", &args[0])?;
    if items.is_empty() {
        return Err(EvalError::Eval(
            "choice function requires a non-empty list".to_string(),
        ));
    }
    let i = rng.gen_range(0..items.len());
    Ok(items[i].clone())
}

/// Hazard probability of an event at sample `x`, assuming a uniform
/// distribution over [lb, ub).
fn h_uniform(args: &[Value], _rng: &mut StdRng) -> EvalResult<Value> {
    expect_arity("h_uniform", args, 3)?;
    let x = expect_number("h_uniform", &args[0])?;
    let lb = expect_number("h_uniform", &args[1])?;
    let ub = expect_number("h_uniform", &args[2])?;
    let p = if x < lb {
        0.0
    } else if x >= ub {
        1.0
    } else {
        1.0 / (ub - x)
    };
    Ok(Value::Float(p))
}

/// Coerce x to the nearest integer multiple of y.
fn imul(args: &[Value], _rng: &mut StdRng) -> EvalResult<Value> {
    expect_arity("imul", args, 2)?;
    let x = expect_number("imul", &args[0])?;
    let y = expect_number("imul", &args[1])?;
    if y == 0.0 {
        return Err(EvalError::Eval(
            "imul function requires a non-zero multiple".to_string(),
        ));
    }
    let coerced = (x / y).round() * y;
    match (&args[0], &args[1]) {
        (Value::Integer(_), Value::Integer(_)) => Ok(Value::Integer(coerced as i64)),
        _ => Ok(Value::Float(coerced)),
    }
}

/// Octave-spaced frequencies from start to end (Hz), snapped to the closest
/// requested octave relative to 1 kHz.
fn octave_space(args: &[Value], _rng: &mut StdRng) -> EvalResult<Value> {
    expect_arity("octave_space", args, 3)?;
    let start = expect_number("octave_space", &args[0])?;
    let end = expect_number("octave_space", &args[1])?;
    let spacing = expect_number("octave_space", &args[2])?;
    if spacing <= 0.0 || start <= 0.0 || end < start {
        return Err(EvalError::Eval(format!(
            "octave_space function requires 0 < start <= end and spacing > 0, \
             but got start={}, end={}, spacing={}",
            start, end, spacing
        )));
    }

    let start_octave = ((start / 1e3).log2() / spacing).round() * spacing;
    let end_octave = ((end / 1e3).log2() / spacing).round() * spacing;

    let mut frequencies = Vec::new();
    let mut octave = start_octave;
    while octave <= end_octave + spacing / 2.0 {
        frequencies.push(Value::Float(octave.exp2() * 1e3));
        octave += spacing;
    }
    Ok(Value::List(frequencies))
}

fn len(args: &[Value], _rng: &mut StdRng) -> EvalResult<Value> {
    expect_arity("len", args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(Value::Integer(s.len() as i64)),
        Value::List(l) => Ok(Value::Integer(l.len() as i64)),
        _ => Err(EvalError::Eval(format!(
            "len function requires string or list, but got {:?}",
            args[0]
        ))),
    }
}

fn sum(args: &[Value], _rng: &mut StdRng) -> EvalResult<Value> {
    expect_arity("sum", args, 1)?;
    let items = expect_list("sum", &args[0])?;

    let mut sum_int = 0i64;
    let mut sum_float = 0.0;
    let mut using_float = false;

    for value in items {
        match value {
            Value::Integer(i) => {
                if using_float {
                    sum_float += *i as f64;
                } else {
                    sum_int += i;
                }
            }
            Value::Float(f) => {
                if !using_float {
                    sum_float = sum_int as f64;
                    using_float = true;
                }
                sum_float += f;
            }
            _ => {
                return Err(EvalError::Eval(format!(
                    "sum function requires list of numbers, but got {:?}",
                    value
                )));
            }
        }
    }

    if using_float {
        Ok(Value::Float(sum_float))
    } else {
        Ok(Value::Integer(sum_int))
    }
}

fn avg(args: &[Value], rng: &mut StdRng) -> EvalResult<Value> {
    expect_arity("avg", args, 1)?;
    let items = expect_list("avg", &args[0])?;
    if items.is_empty() {
        return Err(EvalError::Eval(
            "cannot calculate average of empty list".to_string(),
        ));
    }

    match sum(args, rng)? {
        Value::Integer(i) => Ok(Value::Float(i as f64 / items.len() as f64)),
        Value::Float(f) => Ok(Value::Float(f / items.len() as f64)),
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_toss_bounds() {
        let registry = FunctionRegistry::standard();
        let mut rng = rng();

        // p=0 と p=1 は決定的
        assert_eq!(
            registry
                .call("toss", &[Value::Float(0.0)], &mut rng)
                .unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            registry
                .call("toss", &[Value::Float(1.0)], &mut rng)
                .unwrap(),
            Value::Boolean(true)
        );
        assert!(registry
            .call("toss", &[Value::Float(1.5)], &mut rng)
            .is_err());
    }

    #[test]
    fn test_uniform_range() {
        let registry = FunctionRegistry::standard();
        let mut rng = rng();

        for _ in 0..100 {
            let value = registry
                .call(
                    "uniform",
                    &[Value::Float(0.2), Value::Float(0.8)],
                    &mut rng,
                )
                .unwrap();
            match value {
                Value::Float(f) => assert!((0.2..0.8).contains(&f)),
                other => panic!("expected float, got {:?}", other),
            }
        }

        assert!(registry
            .call(
                "uniform",
                &[Value::Float(0.8), Value::Float(0.2)],
                &mut rng
            )
            .is_err());
    }

    #[test]
    fn test_choice() {
        let registry = FunctionRegistry::standard();
        let mut rng = rng();
        let seq = Value::List(vec![
            Value::String("left".into()),
            Value::String("right".into()),
        ]);

        for _ in 0..20 {
            let value = registry.call("choice", &[seq.clone()], &mut rng).unwrap();
            assert!(matches!(
                value,
                Value::String(ref s) if s == "left" || s == "right"
            ));
        }

        assert!(registry
            .call("choice", &[Value::List(vec![])], &mut rng)
            .is_err());
    }

    #[test]
    fn test_h_uniform() {
        let registry = FunctionRegistry::standard();
        let mut rng = rng();

        let call = |x: f64, rng: &mut StdRng| {
            registry
                .call(
                    "h_uniform",
                    &[Value::Float(x), Value::Float(3.0), Value::Float(7.0)],
                    rng,
                )
                .unwrap()
        };

        assert_eq!(call(0.0, &mut rng), Value::Float(0.0));
        assert_eq!(call(3.0, &mut rng), Value::Float(0.25));
        assert_eq!(call(7.0, &mut rng), Value::Float(1.0));
        assert!(matches!(
            call(4.0, &mut rng),
            Value::Float(f) if (f - 1.0 / 3.0).abs() < 1e-12
        ));
    }

    #[test]
    fn test_imul() {
        let registry = FunctionRegistry::standard();
        let mut rng = rng();

        assert_eq!(
            registry
                .call("imul", &[Value::Integer(7), Value::Integer(3)], &mut rng)
                .unwrap(),
            Value::Integer(6)
        );
        assert!(matches!(
            registry
                .call("imul", &[Value::Float(0.7), Value::Float(0.25)], &mut rng)
                .unwrap(),
            Value::Float(f) if (f - 0.75).abs() < 1e-12
        ));
    }

    #[test]
    fn test_octave_space() {
        let registry = FunctionRegistry::standard();
        let mut rng = rng();

        let value = registry
            .call(
                "octave_space",
                &[
                    Value::Float(2e3),
                    Value::Float(16e3),
                    Value::Float(1.0),
                ],
                &mut rng,
            )
            .unwrap();

        match value {
            Value::List(items) => {
                let frequencies = items
                    .iter()
                    .map(|v| match v {
                        Value::Float(f) => *f,
                        other => panic!("expected float, got {:?}", other),
                    })
                    .collect::<Vec<_>>();
                assert_eq!(frequencies.len(), 4);
                for (actual, expected) in frequencies.iter().zip([2e3, 4e3, 8e3, 16e3]) {
                    assert!((actual - expected).abs() < 1e-6);
                }
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_len_sum_avg() {
        let registry = FunctionRegistry::standard();
        let mut rng = rng();
        let numbers = Value::List(vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
        ]);

        assert_eq!(
            registry.call("len", &[numbers.clone()], &mut rng).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            registry.call("sum", &[numbers.clone()], &mut rng).unwrap(),
            Value::Integer(6)
        );
        assert_eq!(
            registry.call("avg", &[numbers], &mut rng).unwrap(),
            Value::Float(2.0)
        );

        // float が混ざると float に昇格する
        let mixed = Value::List(vec![Value::Integer(1), Value::Float(0.5)]);
        assert_eq!(
            registry.call("sum", &[mixed], &mut rng).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::standard();
        let mut rng = rng();
        assert!(matches!(
            registry.call("nonexistent", &[], &mut rng),
            Err(EvalError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = FunctionRegistry::new();
        registry.register(
            "double",
            Arc::new(|args: &[Value], _rng: &mut StdRng| -> EvalResult<Value> {
                expect_arity("double", args, 1)?;
                let x = expect_number("double", &args[0])?;
                Ok(Value::Float(x * 2.0))
            }),
        );

        let mut rng = rng();
        assert_eq!(
            registry
                .call("double", &[Value::Float(2.5)], &mut rng)
                .unwrap(),
            Value::Float(5.0)
        );
    }
}
