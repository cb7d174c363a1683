//! Expression evaluation and the per-trial context engine.
//!
//! [`expression`] evaluates compiled ASTs against a [`expression::Namespace`],
//! [`functions`] and [`selector`] provide the injected built-in library, and
//! [`context`] owns the per-trial cache, cycle detection and change dispatch.

pub mod context;
pub mod expression;
pub mod functions;
pub mod selector;

use thiserror::Error;

use crate::eval::context::ContextError;

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Eval error: {0}")]
    Eval(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Selector '{0}' may only be used as the outermost expression")]
    SelectorPosition(String),
    /// Failure raised while resolving a dependency parameter; carries the
    /// dependency's own context error so cycles keep their identity.
    #[error("{0}")]
    Context(Box<ContextError>),
}

impl From<ContextError> for EvalError {
    fn from(error: ContextError) -> Self {
        EvalError::Context(Box::new(error))
    }
}
