use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::space1,
    combinator::{map, recognize},
    error::{context, VerboseError},
    sequence::pair,
    IResult,
};
use thiserror::Error;

use super::{
    literal::parse_literal,
    symbol::{parse_delimiter, parse_operator, Delimiter, Operator},
};
use crate::ast::Literal;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Identifiers
    Identifier(String),
    // Symbols
    Operator(Operator),
    Delimiter(Delimiter),
    // Literals
    Literal(Literal),
    // Formatting
    Whitespace(String),
    Newline,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    current_position: usize,
    current_line: usize,
    current_column: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            current_position: 0,
            current_line: 1,   // 1-based
            current_column: 1, // 1-based
        }
    }

    #[tracing::instrument(level = "debug", skip(self, input))]
    pub fn tokenize(&mut self, input: &str) -> TokenizerResult<Vec<TokenSpan>> {
        let mut tokens = Vec::new();
        let mut remaining = input;

        while !remaining.is_empty() {
            let start_position = self.current_position;
            let start_line = self.current_line;
            let start_column = self.current_column;

            let result = alt((
                // Formatting
                parse_whitespace,
                parse_newline,
                // Literals
                parse_literal,
                // Code elements
                parse_operator,
                parse_delimiter,
                parse_identifier,
            ))(remaining);

            match result {
                Ok((new_remaining, token)) => {
                    let consumed = &remaining[..(remaining.len() - new_remaining.len())];
                    self.update_position(consumed);

                    tokens.push(TokenSpan {
                        token,
                        start: start_position,
                        end: self.current_position,
                        line: start_line,
                        column: start_column,
                    });

                    remaining = new_remaining;
                }
                Err(e) => {
                    let found = remaining.chars().take(20).collect::<String>();
                    let span = Span {
                        start: self.current_position,
                        end: self.current_position + 1,
                        line: self.current_line,
                        column: self.current_column,
                    };
                    let error = match e {
                        nom::Err::Incomplete(e) => TokenizerError::ParseError {
                            message: format!("Incomplete input, {:?}", e),
                            found,
                            span,
                        },
                        nom::Err::Error(e) | nom::Err::Failure(e) => TokenizerError::ParseError {
                            message: nom::error::convert_error(remaining, e).to_string(),
                            found,
                            span,
                        },
                    };
                    tracing::debug!("{}", error);
                    return Err(error);
                }
            }
        }

        Ok(tokens)
    }

    fn update_position(&mut self, text: &str) {
        for c in text.chars() {
            self.current_position += c.len_utf8();
            if c == '\n' {
                self.current_line += 1;
                self.current_column = 1;
            } else {
                self.current_column += 1;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenSpan {
    pub token: Token,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line: {}, column: {}, start: {}, end: {}",
            self.line, self.column, self.start, self.end
        )
    }
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_whitespace(input: &str) -> ParserResult<Token> {
    let (input, ws) = context("whitespace", space1)(input)?;
    Ok((input, Token::Whitespace(ws.to_string())))
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_newline(input: &str) -> ParserResult<Token> {
    map(alt((tag("\r\n"), tag("\n"))), |_| Token::Newline)(input)
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_identifier(input: &str) -> ParserResult<Token> {
    let (input, id) = context(
        "identifier",
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
    )(input)?;

    // Word-form literals claim the whole identifier, so `trueish` stays an
    // identifier while `true` becomes a literal.
    let token = match id {
        "true" => Token::Literal(Literal::Boolean(true)),
        "false" => Token::Literal(Literal::Boolean(false)),
        "null" => Token::Literal(Literal::Null),
        _ => Token::Identifier(id.to_string()),
    };
    Ok((input, token))
}

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

pub type TokenizerResult<T> = Result<T, TokenizerError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenizerError {
    #[error("Parse error: {message} at position {span}")]
    ParseError {
        message: String,
        found: String,
        span: Span,
    },
}

#[cfg(test)]
mod tests {
    use super::super::symbol::{Delimiter, Operator};
    use super::*;

    #[test]
    fn test_identifier() {
        let input = "my_var123 other";
        let (rest, token) = parse_identifier(input).unwrap();
        assert_eq!(token, Token::Identifier("my_var123".to_string()));
        assert_eq!(rest, " other");
    }

    #[test]
    fn test_word_literals() {
        let (_, token) = parse_identifier("true").unwrap();
        assert_eq!(token, Token::Literal(Literal::Boolean(true)));

        let (_, token) = parse_identifier("null").unwrap();
        assert_eq!(token, Token::Literal(Literal::Null));

        // 単語境界の確認
        let (_, token) = parse_identifier("trueish").unwrap();
        assert_eq!(token, Token::Identifier("trueish".to_string()));
    }

    #[test]
    fn test_tokenizer_with_position() {
        let mut tokenizer = Tokenizer::new();
        let input = "x + 1";
        let tokens = tokenizer.tokenize(input).unwrap();

        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].column, 1);
        assert_eq!(tokens[0].token, Token::Identifier("x".to_string()));

        let plus = &tokens[2];
        assert_eq!(plus.column, 3);
        assert_eq!(plus.token, Token::Operator(Operator::Plus));
    }

    #[test]
    fn test_expression_tokens() {
        let mut tokenizer = Tokenizer::new();
        let input = "toss(0.5) ? 'left' : 'right'";

        let tokens = tokenizer.tokenize(input).unwrap();
        let important_tokens: Vec<_> = tokens
            .iter()
            .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::Newline))
            .collect();

        assert!(
            matches!(important_tokens[0].token, Token::Identifier(ref s) if s == "toss")
        );
        assert!(matches!(
            important_tokens[1].token,
            Token::Delimiter(Delimiter::OpenParen)
        ));
        assert!(matches!(
            important_tokens[2].token,
            Token::Literal(Literal::Float(f)) if (f - 0.5).abs() < f64::EPSILON
        ));
        assert!(matches!(
            important_tokens[4].token,
            Token::Operator(Operator::Question)
        ));
        assert!(matches!(
            important_tokens[5].token,
            Token::Literal(Literal::String(ref s)) if s == "left"
        ));
    }

    #[test]
    fn test_prior_access_tokens() {
        let mut tokenizer = Tokenizer::new();
        let tokens = tokenizer.tokenize("prior.cue_side").unwrap();

        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].token, Token::Identifier("prior".to_string()));
        assert_eq!(tokens[1].token, Token::Operator(Operator::Dot));
        assert_eq!(tokens[2].token, Token::Identifier("cue_side".to_string()));
    }

    #[test]
    fn test_minus_is_operator() {
        // "a -1" と "a - 1" が同じトークン列になること
        let mut tokenizer = Tokenizer::new();
        let compact = tokenizer
            .tokenize("a -1")
            .unwrap()
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Whitespace(_)))
            .map(|t| t.token)
            .collect::<Vec<_>>();

        let mut tokenizer = Tokenizer::new();
        let spaced = tokenizer
            .tokenize("a - 1")
            .unwrap()
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Whitespace(_)))
            .map(|t| t.token)
            .collect::<Vec<_>>();

        assert_eq!(compact, spaced);
    }
}
