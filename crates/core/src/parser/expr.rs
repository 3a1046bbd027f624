use crate::ast::{BinaryOp, Expr, ExprItem, Term, UnaryOp};
use crate::lexer::TokenKind;
use crate::span::Spanned;

use super::{Parser, SyntaxError};

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Shl => BinaryOp::Shl,
        TokenKind::Shr => BinaryOp::Shr,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::LtEq => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::GtEq => BinaryOp::Ge,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::BangEq => BinaryOp::Ne,
        TokenKind::Amp => BinaryOp::And,
        TokenKind::Caret => BinaryOp::Xor,
        TokenKind::Pipe => BinaryOp::Or,
        _ => return None,
    })
}

pub(super) fn is_binary_operator(kind: &TokenKind) -> bool {
    binary_op(kind).is_some()
}

impl Parser<'_> {
    /// Collects an infix expression, checking its shape but keeping the
    /// tokens in source order for later evaluation.
    pub(crate) fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.peek().span;
        let mut items = Vec::new();
        self.parse_expr_into(&mut items)?;
        let end = items.last().map_or(start, |item: &Spanned<ExprItem>| item.span);
        Ok(Expr {
            items,
            span: start.to(end),
        })
    }

    fn parse_expr_into(&mut self, items: &mut Vec<Spanned<ExprItem>>) -> Result<(), SyntaxError> {
        self.parse_operand_into(items)?;
        while let Some(op) = binary_op(self.peek_kind()) {
            let token = self.advance();
            items.push(Spanned::new(ExprItem::Binary(op), token.span));
            self.parse_operand_into(items)?;
        }
        Ok(())
    }

    fn parse_operand_into(&mut self, items: &mut Vec<Spanned<ExprItem>>) -> Result<(), SyntaxError> {
        loop {
            let op = match self.peek_kind() {
                TokenKind::Minus => UnaryOp::Neg,
                TokenKind::Tilde => UnaryOp::Not,
                _ => break,
            };
            let token = self.advance();
            items.push(Spanned::new(ExprItem::Unary(op), token.span));
        }

        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                items.push(Spanned::new(
                    ExprItem::Term(Term::Number {
                        value,
                        text: token.text,
                    }),
                    token.span,
                ));
            }
            TokenKind::Ident(name) => {
                self.advance();
                items.push(Spanned::new(ExprItem::Term(Term::Symbol(name)), token.span));
            }
            TokenKind::LParen => {
                self.advance();
                items.push(Spanned::new(ExprItem::LParen, token.span));
                self.parse_expr_into(items)?;
                let Some(close) = self.eat(&TokenKind::RParen) else {
                    let found = self.peek();
                    return Err(SyntaxError::new(
                        format!("mismatched parenthesis: unexpected {}", found.kind),
                        found.span,
                    )
                    .with_help("close the '(' opened earlier in this expression"));
                };
                items.push(Spanned::new(ExprItem::RParen, close.span));
            }
            _ => return Err(self.unexpected("an expression")),
        }
        Ok(())
    }
}
