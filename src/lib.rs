//! # paradigm: Trial Parameter Context Engine
//!
//! paradigm resolves the per-trial values of named experimental parameters
//! whose definitions are constants or expressions over other parameters,
//! random draws and stateful sequence generators.
//!
//! ## Processing Pipeline
//!
//! Expression strings go through a small fixed pipeline when a parameter is
//! declared or edited:
//!
//! ```text
//! Source → Tokenizer → Parser → compiled expression
//! ```
//!
//! - Lexing ([`tokenizer`]) splits a source snippet into spanned tokens.
//! - Parsing ([`parser`]) builds the expression AST ([`ast`]).
//! - [`expression::ParameterExpression`] keeps source and AST together, so
//!   each string is compiled exactly once.
//!
//! ## Evaluation Engine
//!
//! The [`eval`] module executes compiled expressions at trial time:
//!
//! - [`eval::context::ContextCache`] owns the per-trial working cache,
//!   resolves parameters on demand with memoization and cycle detection,
//!   and stages pending edits behind an apply/revert protocol
//!   ([`parameter_registry`]).
//! - [`eval::functions`] and [`eval::selector`] supply the built-in
//!   function/distribution library and the stateful sequence generators
//!   advanced once per trial.
//! - [`dispatcher`] notifies external handlers only for parameters whose
//!   resolved value actually changed since the previous trial.
//!
//! The engine is synchronous and single-threaded: expression evaluation,
//! dependency recursion and change dispatch all run on the caller's thread,
//! serialized by `&mut` access.

pub mod ast;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod eval;
pub mod expression;
pub mod parameter_registry;
pub mod parser;
pub mod timestamp;
pub mod tokenizer;

// Re-exports
pub use ast::*;
pub use dispatcher::ChangeDispatcher;
pub use error::*;
pub use eval::context::{ContextCache, ContextError, TrialRecord, TrialSnapshot, TrialState};
pub use eval::expression::Value;
pub use eval::EvalError;
pub use expression::ParameterExpression;
pub use parameter_registry::{ParameterRegistry, RegistryError};
