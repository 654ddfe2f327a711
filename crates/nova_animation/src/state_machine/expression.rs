//! Transition condition expressions
//!
//! A small recursive-descent evaluator over the state machine parameters:
//!
//! ```text
//! or      := and ("||" and)*
//! and     := compare ("&&" compare)*
//! compare := sum (("==" | "!=" | "<" | "<=" | ">" | ">=") sum)*
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/") unary)*
//! unary   := ("!" | "-") unary | primary
//! primary := number | "true" | "false" | identifier | "(" or ")"
//! ```
//!
//! Every value is an `f32`; comparisons and logic yield 0 or 1 and a value
//! is true when it is non-zero. Identifiers that name no parameter read as 0.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::condition::{EQUALITY_EPSILON, TransitionCondition};
use super::parameters::ParameterSet;
use crate::errors::{AnimationError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f32),
    Identifier(String),
    Op(Op),
    LeftParen,
    RightParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Not,
}

impl Op {
    fn apply(self, a: f32, b: f32) -> f32 {
        let truth = |v: bool| if v { 1.0 } else { 0.0 };
        match self {
            Op::Or => truth(a != 0.0 || b != 0.0),
            Op::And => truth(a != 0.0 && b != 0.0),
            Op::Eq => truth((a - b).abs() < EQUALITY_EPSILON),
            Op::Ne => truth((a - b).abs() >= EQUALITY_EPSILON),
            Op::Lt => truth(a < b),
            Op::Le => truth(a <= b),
            Op::Gt => truth(a > b),
            Op::Ge => truth(a >= b),
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            // Division by zero reads as 0 so conditions stay finite
            Op::Div => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
            Op::Not => truth(a == 0.0),
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f32),
    Parameter(String),
    Negate(Box<Expr>),
    Not(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

impl Expr {
    #[must_use]
    pub fn evaluate(&self, parameters: &ParameterSet) -> f32 {
        match self {
            Expr::Number(v) => *v,
            Expr::Parameter(name) => parameters.numeric(name).unwrap_or(0.0),
            Expr::Negate(inner) => -inner.evaluate(parameters),
            Expr::Not(inner) => Op::Not.apply(inner.evaluate(parameters), 0.0),
            Expr::Binary(op, a, b) => op.apply(a.evaluate(parameters), b.evaluate(parameters)),
        }
    }

    #[must_use]
    pub fn is_true(&self, parameters: &ParameterSet) -> bool {
        self.evaluate(parameters) != 0.0
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

fn error(expression: &str, message: impl Into<String>) -> AnimationError {
    AnimationError::Expression {
        expression: expression.to_string(),
        message: message.into(),
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<Chars<'_>> = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut number = String::new();
                while let Some(&d) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    number.push(d);
                    chars.next();
                }
                let value = number
                    .parse::<f32>()
                    .map_err(|_| error(expression, format!("invalid number '{number}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if !(d.is_alphanumeric() || d == '_') {
                        break;
                    }
                    ident.push(d);
                    chars.next();
                }
                tokens.push(match ident.as_str() {
                    "true" => Token::Number(1.0),
                    "false" => Token::Number(0.0),
                    _ => Token::Identifier(ident),
                });
            }
            '(' => {
                chars.next();
                tokens.push(Token::LeftParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RightParen);
            }
            _ => {
                chars.next();
                let next = chars.peek().copied();
                let (op, pair) = match (c, next) {
                    ('|', Some('|')) => (Op::Or, true),
                    ('&', Some('&')) => (Op::And, true),
                    ('=', Some('=')) => (Op::Eq, true),
                    ('!', Some('=')) => (Op::Ne, true),
                    ('<', Some('=')) => (Op::Le, true),
                    ('>', Some('=')) => (Op::Ge, true),
                    ('<', _) => (Op::Lt, false),
                    ('>', _) => (Op::Gt, false),
                    ('+', _) => (Op::Add, false),
                    ('-', _) => (Op::Sub, false),
                    ('*', _) => (Op::Mul, false),
                    ('/', _) => (Op::Div, false),
                    ('!', _) => (Op::Not, false),
                    _ => return Err(error(expression, format!("unexpected character '{c}'"))),
                };
                if pair {
                    chars.next();
                }
                tokens.push(Token::Op(op));
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek_op(&self, accepted: &[Op]) -> Option<Op> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) if accepted.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn binary_level(&mut self, accepted: &[Op], next: fn(&mut Self) -> Result<Expr>) -> Result<Expr> {
        let mut left = next(self)?;
        while let Some(op) = self.peek_op(accepted) {
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr> {
        self.binary_level(&[Op::Or], Self::and)
    }

    fn and(&mut self) -> Result<Expr> {
        self.binary_level(&[Op::And], Self::compare)
    }

    fn compare(&mut self) -> Result<Expr> {
        self.binary_level(&[Op::Eq, Op::Ne, Op::Lt, Op::Le, Op::Gt, Op::Ge], Self::sum)
    }

    fn sum(&mut self) -> Result<Expr> {
        self.binary_level(&[Op::Add, Op::Sub], Self::product)
    }

    fn product(&mut self) -> Result<Expr> {
        self.binary_level(&[Op::Mul, Op::Div], Self::unary)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek_op(&[Op::Not, Op::Sub]) {
            Some(Op::Not) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.unary()?)))
            }
            Some(_) => {
                self.pos += 1;
                Ok(Expr::Negate(Box::new(self.unary()?)))
            }
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| error(self.expression, "unexpected end of expression"))?;
        self.pos += 1;

        match token {
            Token::Number(v) => Ok(Expr::Number(v)),
            Token::Identifier(name) => Ok(Expr::Parameter(name)),
            Token::LeftParen => {
                let inner = self.or()?;
                if self.tokens.get(self.pos) != Some(&Token::RightParen) {
                    return Err(error(self.expression, "missing ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            other => Err(error(self.expression, format!("unexpected token {other:?}"))),
        }
    }
}

/// Evaluates condition strings, caching parsed trees per expression.
#[derive(Debug, Clone, Default)]
pub struct ConditionExpressionParser {
    cache: FxHashMap<String, Option<Arc<Expr>>>,
}

impl ConditionExpressionParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(expression: &str) -> Result<Expr> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            expression,
            tokens,
            pos: 0,
        };
        let expr = parser.or()?;
        if parser.pos < parser.tokens.len() {
            return Err(error(expression, "unexpected trailing input"));
        }
        Ok(expr)
    }

    /// Empty expressions are true; expressions that fail to parse are
    /// false (logged once).
    pub fn evaluate(&mut self, expression: &str, parameters: &ParameterSet) -> bool {
        if expression.trim().is_empty() {
            return true;
        }
        let compiled = self
            .cache
            .entry(expression.to_string())
            .or_insert_with(|| match Self::parse(expression) {
                Ok(expr) => Some(Arc::new(expr)),
                Err(e) => {
                    log::warn!("{e}");
                    None
                }
            });
        compiled.as_ref().is_some_and(|expr| expr.is_true(parameters))
    }

    #[must_use]
    pub fn evaluate_condition(&self, condition: &TransitionCondition, parameters: &ParameterSet) -> bool {
        condition.evaluate(parameters)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}
