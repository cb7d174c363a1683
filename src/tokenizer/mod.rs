//! Lexer for parameter expression source.
//!
//! Expressions are short single-line snippets, so the tokenizer keeps the
//! whole pipeline simple: nom sub-parsers per token family, with byte/line
//! positions tracked for error reporting.

pub mod literal;
pub mod symbol;
pub mod token;

pub use token::{Span, Token, TokenSpan, Tokenizer, TokenizerError};
