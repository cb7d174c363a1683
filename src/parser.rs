//! Parser from token stream to expression AST.
//!
//! The grammar is intentionally narrow (arithmetic, comparisons,
//! conditionals, function calls, parameter references), so a single
//! precedence-climbing pass over the token slice is enough; there is no
//! statement grammar.

use thiserror::Error;

use crate::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::tokenizer::symbol::{Delimiter, Operator};
use crate::tokenizer::{Token, TokenSpan};

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error: expected {expected}, found {found} at line {line}, column {column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("Parse error: unexpected end of expression, expected {expected}")]
    UnexpectedEof { expected: String },
    #[error("Parse error: trailing input {found} at line {line}, column {column}")]
    TrailingInput {
        found: String,
        line: usize,
        column: usize,
    },
}

/// Parses a full expression; the whole token stream must be consumed.
#[tracing::instrument(level = "debug", skip(tokens))]
pub fn parse_expression(tokens: &[TokenSpan]) -> ParseResult<Expr> {
    let mut parser = ExpressionParser::new(tokens);
    let expr = parser.expression()?;
    if let Some(span) = parser.peek_span() {
        return Err(ParseError::TrailingInput {
            found: format!("{:?}", span.token),
            line: span.line,
            column: span.column,
        });
    }
    Ok(expr)
}

struct ExpressionParser<'a> {
    tokens: Vec<&'a TokenSpan>,
    pos: usize,
}

impl<'a> ExpressionParser<'a> {
    fn new(tokens: &'a [TokenSpan]) -> Self {
        // 空白と改行は構文に関与しない
        let tokens = tokens
            .iter()
            .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::Newline))
            .collect();
        Self { tokens, pos: 0 }
    }

    fn peek_span(&self) -> Option<&'a TokenSpan> {
        self.tokens.get(self.pos).copied()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.peek_span().map(|span| &span.token)
    }

    fn advance(&mut self) -> Option<&'a TokenSpan> {
        let span = self.tokens.get(self.pos).copied();
        if span.is_some() {
            self.pos += 1;
        }
        span
    }

    fn error_here(&self, expected: &str) -> ParseError {
        match self.peek_span() {
            Some(span) => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: format!("{:?}", span.token),
                line: span.line,
                column: span.column,
            },
            None => ParseError::UnexpectedEof {
                expected: expected.to_string(),
            },
        }
    }

    fn consume_delimiter(&mut self, delimiter: &Delimiter) -> ParseResult<()> {
        match self.peek() {
            Some(Token::Delimiter(found)) if found == delimiter => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error_here(delimiter.as_ref())),
        }
    }

    // expression := or_expr ('?' expression ':' expression)?
    //
    // The conditional is right-associative because both branches recurse
    // into `expression`.
    fn expression(&mut self) -> ParseResult<Expr> {
        let condition = self.or_expr()?;
        if matches!(self.peek(), Some(Token::Operator(Operator::Question))) {
            self.advance();
            let then_branch = self.expression()?;
            self.consume_delimiter(&Delimiter::Colon)?;
            let else_branch = self.expression()?;
            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });
        }
        Ok(condition)
    }

    fn or_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Token::Operator(Operator::Or))) {
            self.advance();
            let right = self.and_expr()?;
            left = binary(BinaryOperator::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.equality()?;
        while matches!(self.peek(), Some(Token::Operator(Operator::And))) {
            self.advance();
            let right = self.equality()?;
            left = binary(BinaryOperator::And, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(Operator::EqualEqual)) => BinaryOperator::Equal,
                Some(Token::Operator(Operator::NotEqual)) => BinaryOperator::NotEqual,
                _ => break,
            };
            self.advance();
            let right = self.comparison()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(Operator::Less)) => BinaryOperator::LessThan,
                Some(Token::Operator(Operator::LessEqual)) => BinaryOperator::LessThanEqual,
                Some(Token::Operator(Operator::Greater)) => BinaryOperator::GreaterThan,
                Some(Token::Operator(Operator::GreaterEqual)) => BinaryOperator::GreaterThanEqual,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(Operator::Plus)) => BinaryOperator::Add,
                Some(Token::Operator(Operator::Minus)) => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(Operator::Multiply)) => BinaryOperator::Multiply,
                Some(Token::Operator(Operator::Divide)) => BinaryOperator::Divide,
                Some(Token::Operator(Operator::Percent)) => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek() {
            Some(Token::Operator(Operator::Minus)) => Some(UnaryOperator::Negate),
            Some(Token::Operator(Operator::Not)) => Some(UnaryOperator::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.unary()?;
            return Ok(Expr::UnaryOp {
                op,
                expr: Box::new(expr),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Some(Token::Literal(lit)) => {
                self.advance();
                Ok(Expr::Literal(lit.clone()))
            }
            Some(Token::Delimiter(Delimiter::OpenParen)) => {
                self.advance();
                let expr = self.expression()?;
                self.consume_delimiter(&Delimiter::CloseParen)?;
                Ok(expr)
            }
            Some(Token::Delimiter(Delimiter::OpenBracket)) => self.list(),
            Some(Token::Identifier(_)) => self.identifier_expr(),
            _ => Err(self.error_here("literal, list, '(' or identifier")),
        }
    }

    fn list(&mut self) -> ParseResult<Expr> {
        self.consume_delimiter(&Delimiter::OpenBracket)?;
        let mut items = Vec::new();
        if matches!(self.peek(), Some(Token::Delimiter(Delimiter::CloseBracket))) {
            self.advance();
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.expression()?);
            match self.peek() {
                Some(Token::Delimiter(Delimiter::Comma)) => {
                    self.advance();
                }
                Some(Token::Delimiter(Delimiter::CloseBracket)) => {
                    self.advance();
                    break;
                }
                _ => return Err(self.error_here("',' or ']'")),
            }
        }
        Ok(Expr::List(items))
    }

    // identifier := function call, prior access or parameter reference
    fn identifier_expr(&mut self) -> ParseResult<Expr> {
        let name = match self.advance().map(|span| &span.token) {
            Some(Token::Identifier(name)) => name.clone(),
            _ => return Err(self.error_here("identifier")),
        };

        match self.peek() {
            Some(Token::Delimiter(Delimiter::OpenParen)) => {
                self.advance();
                let arguments = self.arguments()?;
                Ok(Expr::FunctionCall {
                    function: name,
                    arguments,
                })
            }
            Some(Token::Operator(Operator::Dot)) => {
                // `prior` だけがドットアクセスを持つ
                if name != "prior" {
                    return Err(self.error_here("'(' or operator"));
                }
                self.advance();
                match self.advance().map(|span| &span.token) {
                    Some(Token::Identifier(field)) => Ok(Expr::Prior(field.clone())),
                    _ => Err(self.error_here("parameter name after 'prior.'")),
                }
            }
            _ => Ok(Expr::Variable(name)),
        }
    }

    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut arguments = Vec::new();
        if matches!(self.peek(), Some(Token::Delimiter(Delimiter::CloseParen))) {
            self.advance();
            return Ok(arguments);
        }
        loop {
            arguments.push(self.expression()?);
            match self.peek() {
                Some(Token::Delimiter(Delimiter::Comma)) => {
                    self.advance();
                }
                Some(Token::Delimiter(Delimiter::CloseParen)) => {
                    self.advance();
                    break;
                }
                _ => return Err(self.error_here("',' or ')'")),
            }
        }
        Ok(arguments)
    }
}

fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
