use a816_isa65816::{AddressingMode, IndexRegister, is_block_move};

use crate::ast::{Expr, OpcodeStmt, Stmt};
use crate::lexer::TokenKind;

use super::expr::is_binary_operator;
use super::{Parser, SyntaxError};

struct Operand {
    mode: AddressingMode,
    expr: Expr,
    index: Option<IndexRegister>,
    inner_index: Option<IndexRegister>,
}

impl Parser<'_> {
    /// Parses an instruction; the addressing mode follows from the operand's
    /// punctuation.
    pub(super) fn parse_opcode(&mut self) -> Result<Stmt, SyntaxError> {
        let token = self.advance();
        let (mnemonic, size) = match token.kind {
            TokenKind::NakedOpcode(mnemonic) => {
                return Ok(Stmt::Opcode(OpcodeStmt {
                    mnemonic,
                    size: None,
                    mode: AddressingMode::None,
                    operand: None,
                    index: None,
                    inner_index: None,
                    destination: None,
                }));
            }
            TokenKind::Opcode { mnemonic, size } => (mnemonic, size),
            _ => return Err(SyntaxError::new("expected an instruction", token.span)),
        };

        if is_block_move(&mnemonic) {
            let source = self.parse_expr()?;
            self.expect(&TokenKind::Comma, "',' between the source and destination banks")?;
            let destination = self.parse_expr()?;
            return Ok(Stmt::Opcode(OpcodeStmt {
                mnemonic,
                size,
                mode: AddressingMode::BlockMove,
                operand: Some(source),
                index: None,
                inner_index: None,
                destination: Some(destination),
            }));
        }

        let mut operand = self.parse_operand()?;
        if let TokenKind::Index(outer) = *self.peek_kind() {
            let index_token = self.advance();
            let Some(indexed) = operand.mode.indexed() else {
                return Err(SyntaxError::new(
                    format!("{} operands cannot be indexed", operand.mode),
                    index_token.span,
                )
                .with_help("remove the index register"));
            };
            if operand.mode == AddressingMode::DpOrSrIndirectIndexed {
                operand.inner_index = operand.index;
            }
            operand.mode = indexed;
            operand.index = Some(outer);
        }

        Ok(Stmt::Opcode(OpcodeStmt {
            mnemonic,
            size,
            mode: operand.mode,
            operand: Some(operand.expr),
            index: operand.index,
            inner_index: operand.inner_index,
            destination: None,
        }))
    }

    fn parse_operand(&mut self) -> Result<Operand, SyntaxError> {
        match self.peek_kind() {
            TokenKind::Hash => {
                self.advance();
                Ok(plain(AddressingMode::Immediate, self.parse_expr()?))
            }
            TokenKind::LBracket => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(plain(AddressingMode::IndirectLong, expr))
            }
            TokenKind::LParen => {
                let saved = self.save();
                match self.parse_indirect()? {
                    Some(operand) => Ok(operand),
                    None => {
                        // The parentheses only grouped part of an expression.
                        self.restore(saved);
                        Ok(plain(AddressingMode::Direct, self.parse_expr()?))
                    }
                }
            }
            _ => Ok(plain(AddressingMode::Direct, self.parse_expr()?)),
        }
    }

    // `(expr)` or `(expr, x|s)`; `None` when an operator follows the `)`.
    fn parse_indirect(&mut self) -> Result<Option<Operand>, SyntaxError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let expr = self.parse_expr()?;
        let index = match *self.peek_kind() {
            TokenKind::Index(index) => {
                self.advance();
                Some(index)
            }
            _ => None,
        };
        if self.eat(&TokenKind::RParen).is_none() {
            let found = self.peek();
            return Err(SyntaxError::new(
                format!("mismatched parenthesis: unexpected {}", found.kind),
                found.span,
            ));
        }
        if index.is_none() && is_binary_operator(self.peek_kind()) {
            return Ok(None);
        }
        Ok(Some(match index {
            Some(index) => Operand {
                mode: AddressingMode::DpOrSrIndirectIndexed,
                expr,
                index: Some(index),
                inner_index: None,
            },
            None => plain(AddressingMode::Indirect, expr),
        }))
    }
}

fn plain(mode: AddressingMode, expr: Expr) -> Operand {
    Operand {
        mode,
        expr,
        index: None,
        inner_index: None,
    }
}
