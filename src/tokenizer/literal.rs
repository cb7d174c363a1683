use nom::{
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char, digit1},
    combinator::{map, map_res, recognize},
    error::context,
    sequence::{delimited, tuple},
};

use super::token::{ParserResult, Token};
use crate::ast::Literal;

// 文字列は ' と " の両方を受け付ける。エスケープと補間は無し。
#[tracing::instrument(level = "debug", skip(input))]
fn parse_string_literal(input: &str) -> ParserResult<Literal> {
    context(
        "string literal",
        map(
            alt((
                delimited(char('\''), take_while(|c| c != '\''), char('\'')),
                delimited(char('"'), take_while(|c| c != '"'), char('"')),
            )),
            |content: &str| Literal::String(content.to_string()),
        ),
    )(input)
}

// Signs are not part of number literals; unary minus is handled by the
// parser so that `a - 1` and `a -1` tokenize the same way.
#[tracing::instrument(level = "debug", skip(input))]
fn parse_float_literal(input: &str) -> ParserResult<Literal> {
    context(
        "float literal",
        map_res(recognize(tuple((digit1, char('.'), digit1))), |s: &str| {
            s.parse::<f64>().map(Literal::Float)
        }),
    )(input)
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_integer_literal(input: &str) -> ParserResult<Literal> {
    context(
        "integer literal",
        map_res(digit1, |s: &str| s.parse::<i64>().map(Literal::Integer)),
    )(input)
}

#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_literal(input: &str) -> ParserResult<Token> {
    context(
        "literal",
        map(
            alt((
                parse_string_literal,
                parse_float_literal,
                parse_integer_literal,
            )),
            Token::Literal,
        ),
    )(input)
}
