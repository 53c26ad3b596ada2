//! Sandboxed arithmetic formula evaluation
//!
//! Derived PEGs are defined by user-supplied expressions, so the evaluator
//! accepts exactly one language: numeric literals, identifiers that resolve
//! against the aggregated PEG averages, `+ - * /` and parentheses. The
//! expression is lexed and parsed into an explicit AST; any other construct
//! (calls, attribute access, comparisons, strings) is rejected at parse
//! time with its position. Evaluation is a pure function of the expression
//! and its bindings.

use peg_analyzer_types::{AnalyzerError, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ref(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Every identifier the expression resolves at evaluation time.
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Self::Number(_) => {}
            Self::Ref(name) => refs.push(name),
            Self::Neg(inner) => inner.collect_references(refs),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_references(refs);
                rhs.collect_references(refs);
            }
        }
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub value: f64,
    /// A division by zero occurred somewhere; the quotient was taken as 0
    pub divided_by_zero: bool,
}

fn syntax_error(expression: &str, position: usize, reason: impl Into<String>) -> AnalyzerError {
    AnalyzerError::FormulaSyntax {
        expression: expression.to_string(),
        position,
        reason: reason.into(),
    }
}

fn lex(expression: &str) -> Result<Vec<(Token, usize)>> {
    let bytes = expression.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'+' => {
                tokens.push((Token::Plus, i));
                i += 1;
            }
            b'-' => {
                tokens.push((Token::Minus, i));
                i += 1;
            }
            b'*' => {
                tokens.push((Token::Star, i));
                i += 1;
            }
            b'/' => {
                tokens.push((Token::Slash, i));
                i += 1;
            }
            b'(' => {
                tokens.push((Token::LParen, i));
                i += 1;
            }
            b')' => {
                tokens.push((Token::RParen, i));
                i += 1;
            }
            b'0'..=b'9' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == b'.' {
                    i += 1;
                    if i >= bytes.len() || !bytes[i].is_ascii_digit() {
                        return Err(syntax_error(expression, start, "malformed number"));
                    }
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let literal = &expression[start..i];
                let value: f64 = literal
                    .parse()
                    .map_err(|_| syntax_error(expression, start, "malformed number"))?;
                tokens.push((Token::Number(value), start));
            }
            b'a'..=b'z' | b'A'..=b'Z' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push((Token::Ident(expression[start..i].to_string()), start));
            }
            b'_' => {
                return Err(syntax_error(
                    expression,
                    i,
                    "identifiers must start with a letter",
                ));
            }
            other => {
                return Err(syntax_error(
                    expression,
                    i,
                    format!("unexpected character '{}'", other as char),
                ));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&(Token, usize)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn end_position(&self) -> usize {
        self.expression.len()
    }

    /// Pratt loop: unary minus binds tightest, then `* /`, then `+ -`,
    /// all left-associative.
    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let (op, lbp, rbp) = match self.peek() {
                Some((Token::Plus, _)) => (BinOp::Add, 1, 2),
                Some((Token::Minus, _)) => (BinOp::Sub, 1, 2),
                Some((Token::Star, _)) => (BinOp::Mul, 3, 4),
                Some((Token::Slash, _)) => (BinOp::Div, 3, 4),
                Some((Token::RParen, _)) | None => break,
                Some((token, position)) => {
                    return Err(syntax_error(
                        self.expression,
                        *position,
                        format!("expected an operator, found {token:?}"),
                    ));
                }
            };
            if lbp < min_bp {
                break;
            }
            self.next();
            let rhs = self.parse_expr(rbp)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        match self.next() {
            Some((Token::Number(value), _)) => Ok(Expr::Number(value)),
            Some((Token::Ident(name), position)) => {
                // an identifier followed by '(' would be a function call
                if let Some((Token::LParen, _)) = self.peek() {
                    return Err(syntax_error(
                        self.expression,
                        position,
                        format!("function calls are not allowed ('{name}')"),
                    ));
                }
                Ok(Expr::Ref(name))
            }
            Some((Token::Minus, _)) => {
                let inner = self.parse_prefix()?;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some((Token::LParen, position)) => {
                let inner = self.parse_expr(0)?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(inner),
                    _ => Err(syntax_error(self.expression, position, "unclosed parenthesis")),
                }
            }
            Some((token, position)) => Err(syntax_error(
                self.expression,
                position,
                format!("expected a value, found {token:?}"),
            )),
            None => Err(syntax_error(
                self.expression,
                self.end_position(),
                "unexpected end of expression",
            )),
        }
    }
}

/// Parse an expression into its AST.
pub fn parse(expression: &str) -> Result<Expr> {
    let tokens = lex(expression)?;
    if tokens.is_empty() {
        return Err(syntax_error(expression, 0, "empty expression"));
    }
    let mut parser = Parser {
        expression,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_expr(0)?;
    if let Some((token, position)) = parser.peek() {
        return Err(syntax_error(
            expression,
            *position,
            format!("unexpected trailing {token:?}"),
        ));
    }
    Ok(expr)
}

fn eval_node(expr: &Expr, bindings: &BTreeMap<String, f64>, flag: &mut bool) -> Result<f64> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Ref(name) => bindings
            .get(name)
            .copied()
            .ok_or_else(|| AnalyzerError::FormulaUnknownRef { name: name.clone() }),
        Expr::Neg(inner) => Ok(-eval_node(inner, bindings, flag)?),
        Expr::Binary { op, lhs, rhs } => {
            let left = eval_node(lhs, bindings, flag)?;
            let right = eval_node(rhs, bindings, flag)?;
            Ok(match op {
                BinOp::Add => left + right,
                BinOp::Sub => left - right,
                BinOp::Mul => left * right,
                BinOp::Div => {
                    if right == 0.0 {
                        *flag = true;
                        0.0
                    } else {
                        left / right
                    }
                }
            })
        }
    }
}

/// Evaluate `expression` against `bindings`.
pub fn evaluate(expression: &str, bindings: &BTreeMap<String, f64>) -> Result<Evaluation> {
    let expr = parse(expression)?;
    let mut divided_by_zero = false;
    let value = eval_node(&expr, bindings, &mut divided_by_zero)?;
    Ok(Evaluation {
        value,
        divided_by_zero,
    })
}
