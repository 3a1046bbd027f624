use crate::ast::{Block, DataWidth, MapArgs, Stmt, StructField};
use crate::expr::{SymbolLookup, evaluate};
use crate::lexer::{Directive, TokenKind};
use crate::scope::SymbolValue;
use crate::span::Span;

use super::{ParseResult, Parser, SyntaxError};

// `.map` values are evaluated while parsing and may not use symbols.
struct Constants;

impl SymbolLookup for Constants {
    fn symbol_value(&self, _name: &str) -> Option<SymbolValue> {
        None
    }
}

impl Parser<'_> {
    /// Parses the directive whose keyword was just consumed. `.include`
    /// splices into `out` and yields no statement of its own.
    pub(super) fn parse_directive(
        &mut self,
        directive: Directive,
        start: Span,
        out: &mut Block,
    ) -> ParseResult<Option<Stmt>> {
        let stmt = match directive {
            Directive::Db => self.parse_data(DataWidth::Byte)?,
            Directive::Dw => self.parse_data(DataWidth::Word)?,
            Directive::Dl => self.parse_data(DataWidth::Long)?,
            Directive::Pointer => self.parse_data(DataWidth::Pointer)?,
            Directive::Text => Stmt::Text(self.expect_string("a string")?.node),
            Directive::Ascii => Stmt::Ascii(self.expect_string("a string")?.node),
            Directive::Table => Stmt::Table(self.expect_string("a table file path")?.node),
            Directive::Incbin => Stmt::IncludeBinary(self.expect_string("a file path")?.node),
            Directive::Include => {
                let path = self.expect_string("a file path")?;
                self.parse_include(path, out)?;
                return Ok(None);
            }
            Directive::IncludeIps => {
                let path = self.expect_string("a patch file path")?.node;
                let delta = match self.eat(&TokenKind::Comma) {
                    Some(_) => Some(self.parse_expr()?),
                    None => None,
                };
                Stmt::IncludeIps { path, delta }
            }
            Directive::Macro => self.parse_macro_definition()?,
            Directive::Map => Stmt::Map(self.parse_map_args(start)?),
            Directive::If => self.parse_if()?,
            Directive::Else => {
                return Err(SyntaxError::new(".else without a matching .if", start).into());
            }
            Directive::For => self.parse_for()?,
            Directive::Struct => self.parse_struct()?,
            Directive::Scope => {
                let name = self.expect_ident("a scope name")?.node;
                let body = self.parse_block()?;
                Stmt::NamedScope { name, body }
            }
        };
        Ok(Some(stmt))
    }

    fn parse_data(&mut self, width: DataWidth) -> Result<Stmt, SyntaxError> {
        let mut values = vec![self.parse_expr()?];
        while self.eat(&TokenKind::Comma).is_some() {
            values.push(self.parse_expr()?);
        }
        Ok(Stmt::Data { width, values })
    }

    fn parse_macro_definition(&mut self) -> ParseResult<Stmt> {
        let name = self.expect_ident("a macro name")?.node;
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if self.eat(&TokenKind::RParen).is_none() {
            loop {
                params.push(self.expect_ident("a parameter name")?.node);
                if self.eat(&TokenKind::Comma).is_some() {
                    continue;
                }
                self.expect(&TokenKind::RParen, "',' or ')'")?;
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(Stmt::MacroDef { name, params, body })
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let condition = self.parse_expr()?;
        let then_block = self.parse_block()?;
        let else_block = match self.eat(&TokenKind::Directive(Directive::Else)) {
            Some(_) => Some(self.parse_block()?),
            None => None,
        };
        Ok(Stmt::If {
            condition,
            then_block,
            else_block,
        })
    }

    // `.for k := start, end { ... }`, end exclusive.
    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let var = self.expect_ident("a loop variable")?.node;
        self.expect(&TokenKind::ColonEq, "':='")?;
        let start = self.parse_expr()?;
        self.expect(&TokenKind::Comma, "','")?;
        let end = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::For {
            var,
            start,
            end,
            body,
        })
    }

    fn parse_struct(&mut self) -> Result<Stmt, SyntaxError> {
        let name = self.expect_ident("a struct name")?.node;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::DoubleRBrace) {
            let kind = self.expect_ident("a field type (byte, word or long)")?;
            let width = match kind.node.as_str() {
                "byte" => DataWidth::Byte,
                "word" => DataWidth::Word,
                "long" => DataWidth::Long,
                other => {
                    return Err(SyntaxError::new(
                        format!("unknown field type '{other}'"),
                        kind.span,
                    )
                    .with_help("use byte, word or long"));
                }
            };
            let field = self.expect_ident("a field name")?.node;
            fields.push(StructField { name: field, width });
        }
        self.expect_rbrace()?;
        Ok(Stmt::Struct { name, fields })
    }

    // `key=value[, value]` pairs up to the end of the directive's line.
    fn parse_map_args(&mut self, start: Span) -> Result<MapArgs, SyntaxError> {
        let mut args = MapArgs::default();
        while !self.peek().first_on_line && matches!(self.peek_kind(), TokenKind::Ident(_)) {
            let key = self.expect_ident("a mapping attribute")?;
            self.expect(&TokenKind::Eq, "'='")?;
            match key.node.as_str() {
                "identifier" => {
                    let token = self.advance();
                    args.identifier = Some(match token.kind {
                        TokenKind::Ident(name) | TokenKind::Str(name) => name,
                        TokenKind::Number(_) => token.text,
                        _ => {
                            return Err(SyntaxError::new(
                                "expected a mapping identifier",
                                token.span,
                            ));
                        }
                    });
                }
                "writable" => args.writable = self.parse_constant()? != 0,
                "mask" => args.mask = Some(self.parse_constant()?),
                "bank_range" => args.bank_range = Some(self.parse_constant_pair()?),
                "addr_range" => args.address_range = Some(self.parse_constant_pair()?),
                "mirror_bank_range" => args.mirror_bank_range = Some(self.parse_constant_pair()?),
                other => {
                    return Err(SyntaxError::new(
                        format!("unknown mapping attribute '{other}'"),
                        key.span,
                    )
                    .with_help(
                        "expected identifier, writable, bank_range, addr_range, mask or mirror_bank_range",
                    ));
                }
            }
        }

        let missing = [
            ("identifier", args.identifier.is_none()),
            ("bank_range", args.bank_range.is_none()),
            ("addr_range", args.address_range.is_none()),
            ("mask", args.mask.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(SyntaxError::new(
                format!(".map is missing {}", missing.join(", ")),
                start,
            ));
        }
        Ok(args)
    }

    fn parse_constant(&mut self) -> Result<i64, SyntaxError> {
        let expr = self.parse_expr()?;
        evaluate(&expr, &Constants).map_err(|error| {
            SyntaxError::new(format!("mapping values must be constant: {error}"), expr.span)
        })
    }

    fn parse_constant_pair(&mut self) -> Result<(i64, i64), SyntaxError> {
        let first = self.parse_constant()?;
        self.expect(&TokenKind::Comma, "','")?;
        Ok((first, self.parse_constant()?))
    }
}
