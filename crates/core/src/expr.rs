//! Operator-precedence evaluation of parsed expressions.

use thiserror::Error;

use crate::ast::{BinaryOp, Expr, ExprItem, Term, UNARY_PRECEDENCE, UnaryOp};
use crate::lexer::parse_number;
use crate::scope::SymbolValue;
use crate::span::{Span, Spanned};

/// Source of symbol values for evaluation.
pub trait SymbolLookup {
    fn symbol_value(&self, name: &str) -> Option<SymbolValue>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Expected while code is generated and during the first pass; fatal
    /// once every label is known.
    #[error("symbol '{name}' is not defined")]
    Undefined { name: String, span: Span },
    #[error("{message}")]
    Invalid { message: String, span: Span },
}

impl EvalError {
    pub fn span(&self) -> Span {
        match self {
            Self::Undefined { span, .. } | Self::Invalid { span, .. } => *span,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined { .. })
    }

    fn invalid(message: impl Into<String>, span: Span) -> Self {
        Self::Invalid {
            message: message.into(),
            span,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operator {
    Unary(UnaryOp),
    Binary(BinaryOp),
}

impl Operator {
    fn precedence(self) -> u8 {
        match self {
            Self::Unary(_) => UNARY_PRECEDENCE,
            Self::Binary(op) => op.precedence(),
        }
    }
}

#[derive(Debug)]
enum Postfix<'a> {
    Term(&'a Term, Span),
    Op(Operator, Span),
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Op(Operator, Span),
    LParen(Span),
}

// Shunting-yard reordering; parentheses never reach the output.
fn to_postfix(expr: &Expr) -> Result<Vec<Postfix<'_>>, EvalError> {
    let mut output = Vec::with_capacity(expr.items.len());
    let mut stack: Vec<Pending> = Vec::new();

    for Spanned { node, span } in &expr.items {
        match node {
            ExprItem::Term(term) => output.push(Postfix::Term(term, *span)),
            ExprItem::Unary(op) => stack.push(Pending::Op(Operator::Unary(*op), *span)),
            ExprItem::Binary(op) => {
                let precedence = op.precedence();
                while let Some(Pending::Op(top, top_span)) = stack.last().copied() {
                    if top.precedence() > precedence {
                        break;
                    }
                    stack.pop();
                    output.push(Postfix::Op(top, top_span));
                }
                stack.push(Pending::Op(Operator::Binary(*op), *span));
            }
            ExprItem::LParen => stack.push(Pending::LParen(*span)),
            ExprItem::RParen => loop {
                match stack.pop() {
                    Some(Pending::Op(op, op_span)) => output.push(Postfix::Op(op, op_span)),
                    Some(Pending::LParen(_)) => break,
                    None => return Err(EvalError::invalid("mismatched parenthesis", *span)),
                }
            },
        }
    }

    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Op(op, span) => output.push(Postfix::Op(op, span)),
            Pending::LParen(span) => {
                return Err(EvalError::invalid("mismatched parenthesis", span));
            }
        }
    }
    Ok(output)
}

pub fn evaluate(expr: &Expr, symbols: &dyn SymbolLookup) -> Result<i64, EvalError> {
    let mut stack: Vec<i64> = Vec::new();
    for item in to_postfix(expr)? {
        match item {
            Postfix::Term(term, span) => stack.push(term_value(term, span, symbols)?),
            Postfix::Op(Operator::Unary(op), span) => {
                let value = stack
                    .pop()
                    .ok_or_else(|| EvalError::invalid("missing operand", span))?;
                stack.push(match op {
                    UnaryOp::Neg => value
                        .checked_neg()
                        .ok_or_else(|| EvalError::invalid("arithmetic overflow", span))?,
                    UnaryOp::Not => !value,
                });
            }
            Postfix::Op(Operator::Binary(op), span) => {
                let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) else {
                    return Err(EvalError::invalid("missing operand", span));
                };
                stack.push(apply(op, lhs, rhs, span)?);
            }
        }
    }

    match stack.as_slice() {
        [value] => Ok(*value),
        [] => Err(EvalError::invalid("empty expression", expr.span)),
        _ => Err(EvalError::invalid("missing operator", expr.span)),
    }
}

fn term_value(term: &Term, span: Span, symbols: &dyn SymbolLookup) -> Result<i64, EvalError> {
    match term {
        Term::Number { value, .. } => Ok(*value),
        Term::Symbol(name) => match symbols.symbol_value(name) {
            Some(SymbolValue::Int(value)) => Ok(value),
            Some(SymbolValue::Str(text)) => parse_number(text.trim()).ok_or_else(|| {
                EvalError::invalid(format!("symbol '{name}' is not numeric ('{text}')"), span)
            }),
            None => Err(EvalError::Undefined {
                name: name.clone(),
                span,
            }),
        },
    }
}

fn apply(op: BinaryOp, lhs: i64, rhs: i64, span: Span) -> Result<i64, EvalError> {
    let overflow = || EvalError::invalid("arithmetic overflow", span);
    Ok(match op {
        BinaryOp::Add => lhs.checked_add(rhs).ok_or_else(overflow)?,
        BinaryOp::Sub => lhs.checked_sub(rhs).ok_or_else(overflow)?,
        BinaryOp::Mul => lhs.checked_mul(rhs).ok_or_else(overflow)?,
        BinaryOp::Div | BinaryOp::Rem if rhs == 0 => {
            return Err(EvalError::invalid("division by zero", span));
        }
        BinaryOp::Div => lhs.checked_div(rhs).ok_or_else(overflow)?,
        BinaryOp::Rem => lhs.checked_rem(rhs).ok_or_else(overflow)?,
        BinaryOp::Shl | BinaryOp::Shr => {
            let amount = u32::try_from(rhs)
                .ok()
                .filter(|amount| *amount < 64)
                .ok_or_else(|| EvalError::invalid(format!("shift by {rhs} is out of range"), span))?;
            if op == BinaryOp::Shl {
                lhs << amount
            } else {
                lhs >> amount
            }
        }
        BinaryOp::Lt => i64::from(lhs < rhs),
        BinaryOp::Le => i64::from(lhs <= rhs),
        BinaryOp::Gt => i64::from(lhs > rhs),
        BinaryOp::Ge => i64::from(lhs >= rhs),
        BinaryOp::Eq => i64::from(lhs == rhs),
        BinaryOp::Ne => i64::from(lhs != rhs),
        BinaryOp::And => lhs & rhs,
        BinaryOp::Xor => lhs ^ rhs,
        BinaryOp::Or => lhs | rhs,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::parser::parse_expression;
    use crate::span::SourceId;

    impl SymbolLookup for HashMap<&str, SymbolValue> {
        fn symbol_value(&self, name: &str) -> Option<SymbolValue> {
            self.get(name).cloned()
        }
    }

    fn eval(source: &str) -> Result<i64, EvalError> {
        let symbols = HashMap::from([
            ("label", SymbolValue::Int(0x8000)),
            ("five", SymbolValue::Str("5".into())),
            ("name", SymbolValue::Str("hello".into())),
        ]);
        let expr = parse_expression(SourceId(0), source).expect("parse");
        evaluate(&expr, &symbols)
    }

    #[test]
    fn respects_precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3").expect("eval"), 7);
        assert_eq!(eval("(1 + 2) * 3").expect("eval"), 9);
        assert_eq!(eval("10 - 4 - 3").expect("eval"), 3);
        assert_eq!(eval("1 << 2 + 1").expect("eval"), 8);
        assert_eq!(eval("0xF0 | 0x0F & 0x3C").expect("eval"), 0xFC);
        assert_eq!(eval("6 ^ 3 | 8").expect("eval"), 13);
    }

    #[test]
    fn unary_operators_bind_tightest() {
        assert_eq!(eval("-2 * 3").expect("eval"), -6);
        assert_eq!(eval("~0 & 0xFF").expect("eval"), 0xFF);
        assert_eq!(eval("- -4").expect("eval"), 4);
    }

    #[test]
    fn resolves_symbols_and_numeric_strings() {
        assert_eq!(eval("label + 2").expect("eval"), 0x8002);
        assert_eq!(eval("label >> 8 & 0xFF").expect("eval"), 0x80);
        assert_eq!(eval("five * 2").expect("eval"), 10);
        assert!(matches!(eval("name + 1"), Err(EvalError::Invalid { .. })));
    }

    #[test]
    fn comparisons_yield_flags() {
        assert_eq!(eval("label == 0x8000").expect("eval"), 1);
        assert_eq!(eval("3 < 2").expect("eval"), 0);
    }

    #[test]
    fn reports_undefined_symbols() {
        let err = eval("missing + 1").expect_err("undefined");
        assert!(err.is_undefined());
        assert_eq!(err.to_string(), "symbol 'missing' is not defined");
    }

    #[test]
    fn reports_arithmetic_errors() {
        assert_eq!(eval("1 / 0").expect_err("div").to_string(), "division by zero");
        assert_eq!(
            eval("1 << 64").expect_err("shift").to_string(),
            "shift by 64 is out of range"
        );
    }
}
