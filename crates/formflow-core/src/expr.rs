//! Closed conditional-expression grammar
//!
//! Parses and evaluates the `showIf` / `disableWhen` expressions carried by
//! schema content. The grammar is intentionally closed — identifiers,
//! literals, equality, logical and/or/not, parentheses — so untrusted schema
//! text can never reach a general-purpose evaluator.
//!
//! Precedence, tightest first: `!`, equality, `&&`, `||`.
//!
//! `===`/`!==` compare strictly (same type and value). `==`/`!=` additionally
//! allow numeric comparison when exactly one side is a number and the other
//! is a string that parses as one. No other coercions.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, not, opt, recognize, value},
    error::{convert_error, VerboseError},
    multi::many0,
    number::complete::double,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use std::collections::HashMap;

use crate::error::ExpressionError;

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

// ============================================================================
// AST
// ============================================================================

/// A parsed conditional expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Lit(ExprValue),
    Ident(String),
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    And,
    Or,
}

/// Values an expression can produce or read from its environment.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl ExprValue {
    /// Map a control value into the expression domain. Containers have no
    /// expression representation and read as null.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ExprValue::Null,
            serde_json::Value::Bool(b) => ExprValue::Bool(*b),
            serde_json::Value::Number(n) => {
                n.as_f64().map(ExprValue::Num).unwrap_or(ExprValue::Null)
            }
            serde_json::Value::String(s) => ExprValue::Str(s.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => ExprValue::Null,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            ExprValue::Bool(b) => *b,
            ExprValue::Num(n) => *n != 0.0 && !n.is_nan(),
            ExprValue::Str(s) => !s.is_empty(),
            ExprValue::Null => false,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Scoped variable environment for evaluation, including the
/// `formIsInvalid` / `formIsPristine` pseudo-identifiers.
#[derive(Clone, Debug, Default)]
pub struct Env {
    vars: HashMap<String, ExprValue>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ExprValue) {
        self.vars.insert(name.into(), value);
    }

    pub fn insert_json(&mut self, name: impl Into<String>, value: &serde_json::Value) {
        self.vars.insert(name.into(), ExprValue::from_json(value));
    }

    pub fn get(&self, name: &str) -> Option<&ExprValue> {
        self.vars.get(name)
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse an expression string into its AST.
pub fn parse_expression(input: &str) -> Result<Expr, ExpressionError> {
    match all_consuming(terminated(or_expr, multispace0))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(ExpressionError::Syntax(convert_error(input, e)))
        }
        Err(nom::Err::Incomplete(_)) => {
            Err(ExpressionError::Syntax("incomplete input".to_string()))
        }
    }
}

/// Evaluate a parsed expression to a boolean.
pub fn evaluate(expr: &Expr, env: &Env) -> Result<bool, ExpressionError> {
    Ok(eval_value(expr, env)?.truthy())
}

/// Parse and evaluate in one step.
pub fn evaluate_str(input: &str, env: &Env) -> Result<bool, ExpressionError> {
    evaluate(&parse_expression(input)?, env)
}

// ============================================================================
// Evaluation
// ============================================================================

fn eval_value(expr: &Expr, env: &Env) -> Result<ExprValue, ExpressionError> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Ident(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| ExpressionError::UnknownIdentifier(name.clone())),
        Expr::Not(inner) => Ok(ExprValue::Bool(!eval_value(inner, env)?.truthy())),
        Expr::Binary { op, lhs, rhs } => match op {
            BinOp::And => {
                let l = eval_value(lhs, env)?;
                if !l.truthy() {
                    return Ok(ExprValue::Bool(false));
                }
                Ok(ExprValue::Bool(eval_value(rhs, env)?.truthy()))
            }
            BinOp::Or => {
                let l = eval_value(lhs, env)?;
                if l.truthy() {
                    return Ok(ExprValue::Bool(true));
                }
                Ok(ExprValue::Bool(eval_value(rhs, env)?.truthy()))
            }
            BinOp::StrictEq => Ok(ExprValue::Bool(strict_eq(
                &eval_value(lhs, env)?,
                &eval_value(rhs, env)?,
            ))),
            BinOp::StrictNe => Ok(ExprValue::Bool(!strict_eq(
                &eval_value(lhs, env)?,
                &eval_value(rhs, env)?,
            ))),
            BinOp::Eq => Ok(ExprValue::Bool(loose_eq(
                &eval_value(lhs, env)?,
                &eval_value(rhs, env)?,
            ))),
            BinOp::Ne => Ok(ExprValue::Bool(!loose_eq(
                &eval_value(lhs, env)?,
                &eval_value(rhs, env)?,
            ))),
        },
    }
}

fn strict_eq(a: &ExprValue, b: &ExprValue) -> bool {
    a == b
}

fn loose_eq(a: &ExprValue, b: &ExprValue) -> bool {
    if strict_eq(a, b) {
        return true;
    }
    match (a, b) {
        (ExprValue::Num(n), ExprValue::Str(s)) | (ExprValue::Str(s), ExprValue::Num(n)) => {
            s.trim().parse::<f64>().map(|p| p == *n).unwrap_or(false)
        }
        _ => false,
    }
}

// ============================================================================
// Parser
// ============================================================================

fn ws<'a, O>(
    mut inner: impl FnMut(&'a str) -> PResult<'a, O>,
) -> impl FnMut(&'a str) -> PResult<'a, O> {
    move |input| {
        let (input, _) = multispace0(input)?;
        inner(input)
    }
}

fn or_expr(input: &str) -> PResult<'_, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(tag("||")), and_expr))(input)?;
    Ok((input, fold_binary(first, BinOp::Or, rest)))
}

fn and_expr(input: &str) -> PResult<'_, Expr> {
    let (input, first) = eq_expr(input)?;
    let (input, rest) = many0(preceded(ws(tag("&&")), eq_expr))(input)?;
    Ok((input, fold_binary(first, BinOp::And, rest)))
}

fn eq_expr(input: &str) -> PResult<'_, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(ws(eq_op), unary))(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |lhs, (op, rhs)| Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }),
    ))
}

fn fold_binary(first: Expr, op: BinOp, rest: Vec<Expr>) -> Expr {
    rest.into_iter().fold(first, |lhs, rhs| Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn eq_op(input: &str) -> PResult<'_, BinOp> {
    alt((
        value(BinOp::StrictEq, tag("===")),
        value(BinOp::StrictNe, tag("!==")),
        value(BinOp::Eq, tag("==")),
        value(BinOp::Ne, tag("!=")),
    ))(input)
}

fn unary(input: &str) -> PResult<'_, Expr> {
    let (input, _) = multispace0(input)?;
    alt((
        // `!` negation, but never the head of `!=` / `!==`
        map(
            preceded(terminated(char('!'), not(char('='))), unary),
            |inner| Expr::Not(Box::new(inner)),
        ),
        primary,
    ))(input)
}

fn primary(input: &str) -> PResult<'_, Expr> {
    let (input, _) = multispace0(input)?;
    alt((
        delimited(char('('), or_expr, ws(char(')'))),
        string_literal,
        ident_or_keyword,
        map(double, |n| Expr::Lit(ExprValue::Num(n))),
    ))(input)
}

fn string_literal(input: &str) -> PResult<'_, Expr> {
    let (input, quoted) = alt((
        delimited(char('\''), opt(is_not("'")), char('\'')),
        delimited(char('"'), opt(is_not("\"")), char('"')),
    ))(input)?;
    Ok((
        input,
        Expr::Lit(ExprValue::Str(quoted.unwrap_or("").to_string())),
    ))
}

fn ident_or_keyword(input: &str) -> PResult<'_, Expr> {
    let (input, word) = recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)?;
    let expr = match word {
        "true" => Expr::Lit(ExprValue::Bool(true)),
        "false" => Expr::Lit(ExprValue::Bool(false)),
        "null" => Expr::Lit(ExprValue::Null),
        _ => Expr::Ident(word.to_string()),
    };
    Ok((input, expr))
}

// ============================================================================
// Tests
// ============================================================================
