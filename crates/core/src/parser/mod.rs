//! Recursive-descent parser over the scanner's token stream.
//!
//! `.include` directives are expanded while parsing: the included file is
//! scanned and parsed on its own and its statements are spliced in place.

use thiserror::Error;

use crate::ast::{Block, Expr, MacroArg, Stmt};
use crate::diag::Diagnostic;
use crate::lexer::{Token, TokenKind, lex};
use crate::span::{SourceId, Span, Spanned};

mod directives;
mod expr;
mod operands;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
    pub help: Option<String>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl From<SyntaxError> for Diagnostic {
    fn from(error: SyntaxError) -> Self {
        let diagnostic = Diagnostic::error(error.span, error.message);
        match error.help {
            Some(help) => diagnostic.with_help(help),
            None => diagnostic,
        }
    }
}

/// Supplies the text of `.include`d files.
pub trait SourceLoader {
    /// Loads `path` as included from `from`, registering it as a new source.
    fn load(&mut self, from: SourceId, path: &str) -> Result<(SourceId, String), String>;

    /// Called once the file returned by `load` has been parsed.
    fn finish(&mut self, id: SourceId);
}

/// Loader for sources that may not include other files.
#[derive(Debug, Default)]
pub struct NoIncludes;

impl SourceLoader for NoIncludes {
    fn load(&mut self, _from: SourceId, path: &str) -> Result<(SourceId, String), String> {
        Err(format!("cannot include '{path}' here"))
    }

    fn finish(&mut self, _id: SourceId) {}
}

type ParseResult<T> = Result<T, Diagnostic>;

pub fn parse(source_id: SourceId, source_text: &str) -> Result<Block, Diagnostic> {
    parse_with_loader(source_id, source_text, &mut NoIncludes)
}

pub fn parse_with_loader(
    source_id: SourceId,
    source_text: &str,
    loader: &mut dyn SourceLoader,
) -> Result<Block, Diagnostic> {
    let tokens = lex(source_id, source_text)?;
    Parser::new(tokens, source_id, loader).parse_program()
}

/// Parses a standalone expression such as a command-line value.
pub fn parse_expression(source_id: SourceId, source_text: &str) -> Result<Expr, Diagnostic> {
    let tokens = lex(source_id, source_text)?;
    let mut loader = NoIncludes;
    let mut parser = Parser::new(tokens, source_id, &mut loader);
    let expr = parser.parse_expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

pub(crate) struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    source_id: SourceId,
    loader: &'a mut dyn SourceLoader,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, source_id: SourceId, loader: &'a mut dyn SourceLoader) -> Self {
        Self {
            tokens,
            position: 0,
            source_id,
            loader,
        }
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn save(&self) -> usize {
        self.position
    }

    fn restore(&mut self, position: usize) {
        self.position = position;
    }

    fn eat(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, SyntaxError> {
        self.eat(kind).ok_or_else(|| self.unexpected(expected))
    }

    fn expect_eof(&mut self) -> Result<(), SyntaxError> {
        if self.at(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(
            format!("unexpected {}, expected {expected}", token.kind),
            token.span,
        )
    }

    fn expect_ident(&mut self, expected: &str) -> Result<Spanned<String>, SyntaxError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                let token = self.advance();
                Ok(Spanned::new(name, token.span))
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn expect_string(&mut self, expected: &str) -> Result<Spanned<String>, SyntaxError> {
        match self.peek_kind().clone() {
            TokenKind::Str(value) => {
                let token = self.advance();
                Ok(Spanned::new(value, token.span))
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    /// Consumes one `}`; the first half of a `}}` token also counts.
    fn expect_rbrace(&mut self) -> Result<Span, SyntaxError> {
        match self.peek_kind() {
            TokenKind::RBrace => Ok(self.advance().span),
            TokenKind::DoubleRBrace => {
                let token = &mut self.tokens[self.position];
                let span = Span::new(token.span.source_id, token.span.start, token.span.start + 1);
                token.kind = TokenKind::RBrace;
                token.span.start += 1;
                token.text = "}".to_string();
                Ok(span)
            }
            _ => Err(self.unexpected("'}'")),
        }
    }

    fn parse_program(&mut self) -> ParseResult<Block> {
        let mut block = Block::new();
        while !self.at(&TokenKind::Eof) {
            self.parse_statement(&mut block)?;
        }
        Ok(block)
    }

    pub(crate) fn parse_block(&mut self) -> ParseResult<Block> {
        let open = self.expect(&TokenKind::LBrace, "'{'")?;
        let mut block = Block::new();
        loop {
            match self.peek_kind() {
                TokenKind::RBrace | TokenKind::DoubleRBrace => break,
                TokenKind::Eof => {
                    let diagnostic: Diagnostic =
                        SyntaxError::new("unclosed block", self.peek().span)
                            .with_help("add a closing '}'")
                            .into();
                    return Err(diagnostic.with_label(open.span, "block opened here"));
                }
                _ => self.parse_statement(&mut block)?,
            }
        }
        self.expect_rbrace()?;
        Ok(block)
    }

    fn parse_statement(&mut self, out: &mut Block) -> ParseResult<()> {
        let token = self.peek().clone();
        let start = token.span;
        let stmt = match token.kind {
            TokenKind::Label(name) => {
                self.advance();
                Stmt::Label(name)
            }
            TokenKind::NakedOpcode(_) | TokenKind::Opcode { .. } => self.parse_opcode()?,
            TokenKind::Directive(directive) => {
                self.advance();
                match self.parse_directive(directive, start, out)? {
                    Some(stmt) => stmt,
                    None => return Ok(()),
                }
            }
            TokenKind::Ident(name) => {
                self.advance();
                self.parse_identifier_statement(name)?
            }
            TokenKind::StarEq => {
                self.advance();
                Stmt::CodePosition(self.parse_expr()?)
            }
            TokenKind::AtEq => {
                self.advance();
                Stmt::Relocation(self.parse_expr()?)
            }
            TokenKind::LBrace => Stmt::Compound(self.parse_block()?),
            TokenKind::DoubleLBrace => {
                self.advance();
                let name = self.expect_ident("code block name")?;
                self.expect(&TokenKind::DoubleRBrace, "'}}'")?;
                Stmt::CodeLookup(name.node)
            }
            _ => {
                return Err(self
                    .unexpected("a statement")
                    .with_help("statements are labels, instructions, directives, assignments or macro calls")
                    .into());
            }
        };
        let end = self.tokens[self.position.saturating_sub(1)].span;
        out.push(Spanned::new(stmt, start.to(end)));
        Ok(())
    }

    // `name = expr`, `name := expr` or `name(args)`.
    fn parse_identifier_statement(&mut self, name: String) -> ParseResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Eq | TokenKind::ColonEq => {
                self.advance();
                let value = self.parse_expr()?;
                Ok(Stmt::Assign { name, value })
            }
            TokenKind::LParen => {
                self.advance();
                let args = self.parse_macro_args()?;
                Ok(Stmt::MacroApply { name, args })
            }
            _ => Err(self
                .unexpected("'=', ':=' or '('")
                .with_help(format!("'{name}' is not an instruction; did you forget a ':' after a label?"))
                .into()),
        }
    }

    fn parse_macro_args(&mut self) -> ParseResult<Vec<MacroArg>> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen).is_some() {
            return Ok(args);
        }
        loop {
            let arg = if self.at(&TokenKind::LBrace) {
                MacroArg::Block(self.parse_block()?)
            } else {
                MacroArg::Expr(self.parse_expr()?)
            };
            args.push(arg);
            if self.eat(&TokenKind::Comma).is_some() {
                continue;
            }
            self.expect(&TokenKind::RParen, "',' or ')'")?;
            return Ok(args);
        }
    }

    /// Parses an included file and splices its statements into `out`.
    fn parse_include(&mut self, path: Spanned<String>, out: &mut Block) -> ParseResult<()> {
        let (id, text) = self
            .loader
            .load(self.source_id, &path.node)
            .map_err(|message| SyntaxError::new(message, path.span))?;
        let tokens = lex(id, &text)?;
        let block = Parser::new(tokens, id, &mut *self.loader).parse_program()?;
        self.loader.finish(id);
        out.extend(block);
        Ok(())
    }
}
