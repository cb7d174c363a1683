use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use super::expression::{ExpressionEvaluator, Namespace, Value};
use super::functions::FunctionRegistry;
use super::selector::SelectorRegistry;
use super::{EvalError, EvalResult};
use crate::config::EngineConfig;
use crate::dispatcher::ChangeDispatcher;
use crate::expression::ParameterExpression;
use crate::parameter_registry::{ParameterRegistry, RegistryError};
use crate::timestamp::Timestamp;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Circular dependency: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
    #[error("Failed to evaluate {parameter}: {source}")]
    Evaluation {
        parameter: String,
        source: EvalError,
    },
}

pub type ContextResult<T> = Result<T, ContextError>;

/// Per-trial lifecycle of the working cache.
///
/// The only way back to `Fresh` is an explicit
/// [`ContextCache::invalidate_current_context`] (or an [`ContextCache::apply`]
/// that changed expressions); reads never invalidate implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Fresh,
    Resolving,
    Settled,
}

/// One loggable parameter of a settled trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    pub name: String,
    pub label: String,
    pub value: Value,
    pub expression: String,
}

/// The loggable set of a settled trial, handed to the persistence sink.
#[derive(Debug, Clone, Serialize)]
pub struct TrialSnapshot {
    pub trial: u64,
    pub completed_at: Timestamp,
    pub records: Vec<TrialRecord>,
}

/// The context evaluation engine.
///
/// Owns the parameter registry, the per-trial working cache, the prior-trial
/// baseline and the change dispatcher. All evaluation is synchronous on the
/// caller's thread; `&mut self` receivers serialize access.
pub struct ContextCache {
    registry: ParameterRegistry,
    functions: FunctionRegistry,
    selectors: SelectorRegistry,
    dispatcher: ChangeDispatcher,
    rng: StdRng,
    // 前試行の確定値（差分検出のベースライン）
    current_context: HashMap<String, Value>,
    // 今試行の作業キャッシュ
    working: HashMap<String, Value>,
    state: TrialState,
    trial: u64,
    completed_at: Option<Timestamp>,
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::standard(&EngineConfig::default())
    }
}

impl ContextCache {
    pub fn new(
        functions: FunctionRegistry,
        selectors: SelectorRegistry,
        config: &EngineConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            registry: ParameterRegistry::new(),
            functions,
            selectors,
            dispatcher: ChangeDispatcher::new(),
            rng,
            current_context: HashMap::new(),
            working: HashMap::new(),
            state: TrialState::Fresh,
            trial: 0,
            completed_at: None,
        }
    }

    /// Engine with the standard built-in function and selector libraries.
    pub fn standard(config: &EngineConfig) -> Self {
        Self::new(
            FunctionRegistry::standard(),
            SelectorRegistry::standard(),
            config,
        )
    }

    // --- declaration & staging -------------------------------------------

    pub fn declare(
        &mut self,
        name: &str,
        expression: ParameterExpression,
        label: &str,
        loggable: bool,
    ) -> ContextResult<()> {
        self.registry
            .declare(name, expression, label, loggable)
            .map_err(ContextError::from)
    }

    pub fn set_pending(
        &mut self,
        name: &str,
        expression: ParameterExpression,
    ) -> ContextResult<()> {
        self.registry
            .set_pending(name, expression)
            .map_err(ContextError::from)
    }

    /// Promotes all pending expressions atomically. The working cache is
    /// cleared when anything actually changed, so subsequent reads evaluate
    /// the new expressions; the prior-trial baseline is retained for the next
    /// diff. Returns the names whose active expression changed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn apply(&mut self) -> Vec<String> {
        let changed = self.registry.apply();
        if !changed.is_empty() {
            debug!("Applied changes to {:?}", changed);
            self.invalidate_current_context();
        }
        changed
    }

    pub fn revert(&mut self) {
        self.registry.revert();
    }

    pub fn has_pending(&self) -> bool {
        self.registry.has_pending()
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        handler: impl FnMut(&Value) + 'static,
    ) {
        self.dispatcher.register(name, handler);
    }

    pub fn unregister_handler(&mut self, name: &str) -> bool {
        self.dispatcher.unregister(name)
    }

    // --- resolution -------------------------------------------------------

    /// Current value of a parameter, resolving it (and transitively its
    /// dependencies) on demand. Memoized: repeated reads within one trial
    /// return the cached value without re-evaluating the expression.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get_current_value(&mut self, name: &str) -> ContextResult<Value> {
        let mut stack = Vec::new();
        self.resolve(name, &mut stack)
    }

    /// Injects a value directly into the working cache (e.g. a measurement
    /// only known at runtime). Expressions may reference it by name; the
    /// name does not have to be declared.
    #[tracing::instrument(level = "debug", skip(self, value))]
    pub fn set_current_value(&mut self, name: &str, value: Value) {
        debug!("Setting {} to {:?}", name, value);
        if self.state == TrialState::Fresh {
            self.state = TrialState::Resolving;
        }
        self.working.insert(name.to_string(), value.clone());
        let prior = self.current_context.get(name);
        self.dispatcher.on_resolved(name, &value, prior);
    }

    /// Force-resolves every declared parameter not yet in the working cache,
    /// in declaration order. Fail-fast: the first failure aborts the pass,
    /// leaving previously resolved entries cached so the pass can be retried
    /// after correction. On success the trial is settled and the baseline
    /// rolls forward.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn evaluate_pending_expressions(&mut self) -> ContextResult<()> {
        let names = self
            .registry
            .names()
            .map(String::from)
            .collect::<Vec<String>>();
        for name in names {
            if self.working.contains_key(&name) {
                continue;
            }
            let mut stack = Vec::new();
            self.resolve(&name, &mut stack)?;
        }

        self.state = TrialState::Settled;
        self.trial += 1;
        self.completed_at = Some(Timestamp::now());
        // ベースラインは settle の時にのみ前進する
        self.current_context = self.working.clone();
        debug!("Trial {} settled", self.trial);
        Ok(())
    }

    /// Clears the working cache (state back to `Fresh`). The prior-trial
    /// baseline is untouched: it only rolls forward as part of settling, so
    /// invalidation is idempotent.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn invalidate_current_context(&mut self) {
        debug!("Invalidating working cache");
        self.working.clear();
        self.state = TrialState::Fresh;
    }

    // --- read-only views --------------------------------------------------

    pub fn state(&self) -> TrialState {
        self.state
    }

    /// Number of settled trials.
    pub fn trial(&self) -> u64 {
        self.trial
    }

    /// Prior-trial baseline value, if the parameter has settled before.
    pub fn prior_value(&self, name: &str) -> Option<&Value> {
        self.current_context.get(name)
    }

    /// Loggable records of the settled trial, in declaration order. `None`
    /// until the trial settles.
    pub fn trial_records(&self) -> Option<Vec<TrialRecord>> {
        if self.state != TrialState::Settled {
            return None;
        }
        let mut records = Vec::new();
        for def in self.registry.iter() {
            if !def.is_loggable() {
                continue;
            }
            let value = self.working.get(def.name()).cloned()?;
            records.push(TrialRecord {
                name: def.name().to_string(),
                label: def.label().to_string(),
                value,
                expression: def.active().source().to_string(),
            });
        }
        Some(records)
    }

    pub fn trial_snapshot(&self) -> Option<TrialSnapshot> {
        Some(TrialSnapshot {
            trial: self.trial,
            completed_at: self.completed_at.clone()?,
            records: self.trial_records()?,
        })
    }

    // --- internals --------------------------------------------------------

    fn resolve(&mut self, name: &str, stack: &mut Vec<String>) -> ContextResult<Value> {
        // メモ化: 解決済みならそのまま返す
        if let Some(value) = self.working.get(name) {
            debug!("{} found in working cache", name);
            return Ok(value.clone());
        }

        // 評価より先にサイクルを検出する
        if let Some(position) = stack.iter().position(|entry| entry == name) {
            let mut cycle = stack[position..].to_vec();
            cycle.push(name.to_string());
            return Err(ContextError::CircularDependency { cycle });
        }

        if !self.registry.contains(name) {
            return Err(RegistryError::UnknownParameter(name.to_string()).into());
        }

        if self.state == TrialState::Fresh {
            self.state = TrialState::Resolving;
        }

        debug!("Resolving {}", name);
        stack.push(name.to_string());
        let result = self.evaluate_active(name, stack);
        stack.pop();

        match result {
            Ok(value) => {
                self.working.insert(name.to_string(), value.clone());
                let prior = self.current_context.get(name);
                self.dispatcher.on_resolved(name, &value, prior);
                Ok(value)
            }
            // 依存パラメータの失敗は自分の失敗として包み直さない
            Err(EvalError::Context(inner)) => match *inner {
                error @ ContextError::CircularDependency { .. } => Err(error),
                error @ ContextError::Evaluation { .. } => Err(error),
                error @ ContextError::Registry(_) => Err(ContextError::Evaluation {
                    parameter: name.to_string(),
                    source: EvalError::Context(Box::new(error)),
                }),
            },
            Err(source) => Err(ContextError::Evaluation {
                parameter: name.to_string(),
                source,
            }),
        }
    }

    fn evaluate_active(&mut self, name: &str, stack: &mut Vec<String>) -> EvalResult<Value> {
        let expr = self
            .registry
            .active_expression(name)
            .map_err(ContextError::from)?
            .expr();

        // セレクタ式は生成器を介して解決する（最外の呼び出しのみ）
        if let Some((function, arguments)) = expr.outer_call() {
            if self.selectors.contains(function) {
                return self.advance_selector(name, function, arguments, stack);
            }
        }

        let mut scope = ResolutionScope { cache: self, stack };
        ExpressionEvaluator::new().eval_expression(&expr, &mut scope)
    }

    /// Advances the generator backing a selector expression, creating it on
    /// first use. The generator lives in the registry slot so it survives
    /// across trials until `apply` replaces the expression.
    fn advance_selector(
        &mut self,
        name: &str,
        function: &str,
        arguments: &[crate::ast::Expr],
        stack: &mut Vec<String>,
    ) -> EvalResult<Value> {
        let mut generator = match self
            .registry
            .take_generator(name)
            .map_err(ContextError::from)?
        {
            Some(generator) => generator,
            None => {
                // 構築引数は初回のみ評価される
                let mut arg_values = Vec::with_capacity(arguments.len());
                {
                    let mut scope = ResolutionScope { cache: self, stack };
                    let evaluator = ExpressionEvaluator::new();
                    for argument in arguments {
                        arg_values.push(evaluator.eval_expression(argument, &mut scope)?);
                    }
                }
                debug!("Building {} generator for {}", function, name);
                self.selectors.build(function, &arg_values)?
            }
        };

        let result = generator.advance(&mut self.rng);
        self.registry
            .store_generator(name, generator)
            .map_err(ContextError::from)?;
        result
    }
}

// 解決中の式に公開されるネームスペース
struct ResolutionScope<'a> {
    cache: &'a mut ContextCache,
    stack: &'a mut Vec<String>,
}

impl Namespace for ResolutionScope<'_> {
    fn resolve(&mut self, name: &str) -> EvalResult<Value> {
        self.cache.resolve(name, self.stack).map_err(EvalError::from)
    }

    fn prior(&self, name: &str) -> Option<Value> {
        self.cache.current_context.get(name).cloned()
    }

    fn call(&mut self, function: &str, args: Vec<Value>) -> EvalResult<Value> {
        if self.cache.selectors.contains(function) {
            return Err(EvalError::SelectorPosition(function.to_string()));
        }
        self.cache.functions.call(function, &args, &mut self.cache.rng)
    }
}
