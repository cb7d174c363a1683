use thiserror::Error;

use crate::eval::context::ContextError;
use crate::eval::EvalError;
use crate::expression::ExpressionError;
use crate::parameter_registry::RegistryError;
use crate::parser::ParseError;
use crate::tokenizer::TokenizerError;

#[derive(Error, Debug)]
pub enum Error {
    // context
    #[error("Context error: {0}")]
    Context(#[from] ContextError),
    // eval error
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),
    #[error("Tokenize error: {0}")]
    Tokenize(#[from] TokenizerError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

// エラー作成用のヘルパー関数
impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
