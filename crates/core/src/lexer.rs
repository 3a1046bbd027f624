use std::fmt;

use a816_isa65816::{IndexRegister, OperandSize, accepts_no_operand, is_block_move, is_mnemonic};
use logos::Logos;
use thiserror::Error;

use crate::diag::Diagnostic;
use crate::span::{SourceId, Span};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip(r"[ \t\r\f]+"))]
#[logos(skip(r";[^\n]*", allow_greedy = true))]
#[logos(skip(r"/\*([^*]|\*+[^*/])*\*+/"))]
enum RawToken {
    #[token("\n")]
    Newline,
    #[token("{{")]
    DoubleLBrace,
    #[token("}}")]
    DoubleRBrace,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(":=")]
    ColonEq,
    #[token("=")]
    Eq,
    #[token("*=")]
    StarEq,
    #[token("@=")]
    AtEq,
    #[token("#")]
    Hash,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,

    #[regex(r"'([^'\\\n]|\\.)*'", parse_string)]
    Str(String),
    #[regex(r"'([^'\\\n]|\\.)*")]
    UnterminatedStr,

    #[regex(r"0x[0-9a-fA-F]+|0b[01]+|0o[0-7]+|[0-9]+")]
    Number,

    #[regex(r"\.[A-Za-z_][A-Za-z0-9_]*")]
    Directive,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*")]
    Ident,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Db,
    Dw,
    Dl,
    Pointer,
    Text,
    Ascii,
    Table,
    Include,
    IncludeIps,
    Incbin,
    Macro,
    Map,
    If,
    Else,
    For,
    Struct,
    Scope,
}

impl Directive {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "db" => Self::Db,
            "dw" => Self::Dw,
            "dl" => Self::Dl,
            "pointer" => Self::Pointer,
            "text" => Self::Text,
            "ascii" => Self::Ascii,
            "table" => Self::Table,
            "include" => Self::Include,
            "include_ips" => Self::IncludeIps,
            "incbin" => Self::Incbin,
            "macro" => Self::Macro,
            "map" => Self::Map,
            "if" => Self::If,
            "else" => Self::Else,
            "for" => Self::For,
            "struct" => Self::Struct,
            "scope" => Self::Scope,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Mnemonic that starts an instruction with an operand.
    Opcode {
        mnemonic: String,
        size: Option<OperandSize>,
    },
    /// Mnemonic followed by the end of its line.
    NakedOpcode(String),
    Directive(Directive),
    Label(String),
    Ident(String),
    Number(i64),
    Str(String),
    Index(IndexRegister),

    LBrace,
    RBrace,
    DoubleLBrace,
    DoubleRBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    ColonEq,
    StarEq,
    AtEq,
    Hash,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Amp,
    Pipe,
    Caret,
    Tilde,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opcode { mnemonic, .. } | Self::NakedOpcode(mnemonic) => {
                write!(f, "opcode '{mnemonic}'")
            }
            Self::Directive(_) => f.write_str("directive"),
            Self::Label(name) => write!(f, "label '{name}'"),
            Self::Ident(name) => write!(f, "identifier '{name}'"),
            Self::Number(value) => write!(f, "number {value:#x}"),
            Self::Str(_) => f.write_str("string"),
            Self::Index(index) => write!(f, "index register '{index}'"),
            Self::Eof => f.write_str("end of file"),
            other => write!(f, "'{}'", punctuation(other)),
        }
    }
}

fn punctuation(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::LBrace => "{",
        TokenKind::RBrace => "}",
        TokenKind::DoubleLBrace => "{{",
        TokenKind::DoubleRBrace => "}}",
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::Comma => ",",
        TokenKind::Eq => "=",
        TokenKind::ColonEq => ":=",
        TokenKind::StarEq => "*=",
        TokenKind::AtEq => "@=",
        TokenKind::Hash => "#",
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::Shl => "<<",
        TokenKind::Shr => ">>",
        TokenKind::Amp => "&",
        TokenKind::Pipe => "|",
        TokenKind::Caret => "^",
        TokenKind::Tilde => "~",
        TokenKind::EqEq => "==",
        TokenKind::BangEq => "!=",
        TokenKind::Lt => "<",
        TokenKind::LtEq => "<=",
        TokenKind::Gt => ">",
        TokenKind::GtEq => ">=",
        _ => "?",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
    /// No other token precedes this one on its source line.
    pub first_on_line: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("unexpected character {text}")]
    UnexpectedCharacter { text: String, span: Span },
    #[error("unterminated string")]
    UnterminatedString { span: Span },
    #[error("invalid number '{text}'")]
    InvalidNumber { text: String, span: Span },
    #[error("invalid size specifier '.{suffix}'")]
    InvalidSize { suffix: String, span: Span },
    #[error("invalid index '{text}'")]
    InvalidIndex { text: String, span: Span },
    #[error("unknown directive '{text}'")]
    UnknownDirective { text: String, span: Span },
}

impl ScanError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedCharacter { span, .. }
            | Self::UnterminatedString { span }
            | Self::InvalidNumber { span, .. }
            | Self::InvalidSize { span, .. }
            | Self::InvalidIndex { span, .. }
            | Self::UnknownDirective { span, .. } => *span,
        }
    }
}

impl From<ScanError> for Diagnostic {
    fn from(error: ScanError) -> Self {
        let diagnostic = Diagnostic::error(error.span(), error.to_string());
        match error {
            ScanError::InvalidSize { .. } => diagnostic.with_help("use .b, .w or .l"),
            ScanError::InvalidIndex { .. } => diagnostic.with_help("index with x, y or s"),
            _ => diagnostic,
        }
    }
}

struct RawLexeme {
    token: RawToken,
    span: Span,
    text: String,
}

/// Scans `input` into tokens terminated by [`TokenKind::Eof`]. The first
/// lexical error aborts the scan.
pub fn lex(source_id: SourceId, input: &str) -> Result<Vec<Token>, ScanError> {
    let raw = lex_raw(source_id, input)?;
    classify(raw, Span::new(source_id, input.len(), input.len()))
}

fn lex_raw(source_id: SourceId, input: &str) -> Result<Vec<RawLexeme>, ScanError> {
    let mut lexer = RawToken::lexer(input);
    let mut lexemes = Vec::new();
    while let Some(next) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(source_id, range.start, range.end);
        let text = lexer.slice().to_string();
        match next {
            Ok(RawToken::UnterminatedStr) => {
                return Err(ScanError::UnterminatedString { span });
            }
            Ok(token) => lexemes.push(RawLexeme { token, span, text }),
            Err(()) => {
                return Err(ScanError::UnexpectedCharacter {
                    text: format_token_for_message(&text),
                    span,
                });
            }
        }
    }
    Ok(lexemes)
}

// Turns raw lexemes into grammar tokens: mnemonics become opcodes, `name:`
// becomes a label and `, x` inside an instruction operand becomes an index.
fn classify(raw: Vec<RawLexeme>, eof: Span) -> Result<Vec<Token>, ScanError> {
    let mut tokens = Vec::with_capacity(raw.len() + 1);
    let mut at_statement_start = true;
    let mut first_on_line = true;
    let mut in_operand = false;
    let mut position = 0;

    while position < raw.len() {
        let lexeme = &raw[position];
        let next = raw.get(position + 1);
        let mut consumed = 1;

        let kind = match &lexeme.token {
            RawToken::Newline => {
                at_statement_start = true;
                first_on_line = true;
                in_operand = false;
                position += 1;
                continue;
            }
            RawToken::Ident => {
                let adjacent_colon = next.is_some_and(|next| {
                    next.token == RawToken::Colon && next.span.start == lexeme.span.end
                });
                if adjacent_colon {
                    consumed = 2;
                    TokenKind::Label(lexeme.text.clone())
                } else if at_statement_start && is_mnemonic(mnemonic_part(&lexeme.text)) {
                    let kind = classify_opcode(lexeme, next)?;
                    in_operand = matches!(
                        &kind,
                        TokenKind::Opcode { mnemonic, .. } if !is_block_move(mnemonic)
                    );
                    kind
                } else {
                    TokenKind::Ident(lexeme.text.clone())
                }
            }
            RawToken::Comma if in_operand => match next {
                Some(next) if next.token == RawToken::Ident => {
                    let Some(index) = IndexRegister::from_name(&next.text) else {
                        return Err(ScanError::InvalidIndex {
                            text: next.text.clone(),
                            span: next.span,
                        });
                    };
                    consumed = 2;
                    TokenKind::Index(index)
                }
                _ => {
                    return Err(ScanError::InvalidIndex {
                        text: next.map_or_else(String::new, |next| next.text.clone()),
                        span: next.map_or(lexeme.span, |next| next.span),
                    });
                }
            },
            RawToken::Number => TokenKind::Number(parse_number(&lexeme.text).ok_or_else(|| {
                ScanError::InvalidNumber {
                    text: lexeme.text.clone(),
                    span: lexeme.span,
                }
            })?),
            RawToken::Directive => {
                let name = &lexeme.text[1..];
                TokenKind::Directive(Directive::from_name(name).ok_or_else(|| {
                    ScanError::UnknownDirective {
                        text: lexeme.text.clone(),
                        span: lexeme.span,
                    }
                })?)
            }
            RawToken::Str(value) => TokenKind::Str(value.clone()),
            RawToken::UnterminatedStr => {
                return Err(ScanError::UnterminatedString { span: lexeme.span });
            }
            RawToken::Colon => {
                return Err(ScanError::UnexpectedCharacter {
                    text: "':'".to_string(),
                    span: lexeme.span,
                });
            }
            other => simple_kind(other).ok_or_else(|| ScanError::UnexpectedCharacter {
                text: format_token_for_message(&lexeme.text),
                span: lexeme.span,
            })?,
        };

        let span = if consumed == 2 {
            lexeme.span.to(raw[position + 1].span)
        } else {
            lexeme.span
        };
        let text = raw[position..position + consumed]
            .iter()
            .map(|lexeme| lexeme.text.as_str())
            .collect::<String>();
        at_statement_start = matches!(
            kind,
            TokenKind::Label(_) | TokenKind::LBrace | TokenKind::RBrace | TokenKind::DoubleRBrace
        );
        tokens.push(Token {
            kind,
            span,
            text,
            first_on_line,
        });
        first_on_line = false;
        position += consumed;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: eof,
        text: String::new(),
        first_on_line: true,
    });
    Ok(tokens)
}

fn mnemonic_part(text: &str) -> &str {
    text.split_once('.').map_or(text, |(mnemonic, _)| mnemonic)
}

fn classify_opcode(lexeme: &RawLexeme, next: Option<&RawLexeme>) -> Result<TokenKind, ScanError> {
    let (mnemonic, size) = match lexeme.text.split_once('.') {
        Some((mnemonic, suffix)) => {
            let size = OperandSize::from_suffix(suffix).ok_or_else(|| ScanError::InvalidSize {
                suffix: suffix.to_string(),
                span: lexeme.span,
            })?;
            (mnemonic, Some(size))
        }
        None => (lexeme.text.as_str(), None),
    };
    let mnemonic = mnemonic.to_ascii_lowercase();

    let ends_line = next.is_none_or(|next| {
        matches!(
            next.token,
            RawToken::Newline | RawToken::RBrace | RawToken::DoubleRBrace
        )
    });
    if ends_line && size.is_none() && accepts_no_operand(&mnemonic) {
        Ok(TokenKind::NakedOpcode(mnemonic))
    } else {
        Ok(TokenKind::Opcode { mnemonic, size })
    }
}

fn simple_kind(token: &RawToken) -> Option<TokenKind> {
    Some(match token {
        RawToken::DoubleLBrace => TokenKind::DoubleLBrace,
        RawToken::DoubleRBrace => TokenKind::DoubleRBrace,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::Comma => TokenKind::Comma,
        RawToken::ColonEq => TokenKind::ColonEq,
        RawToken::Eq => TokenKind::Eq,
        RawToken::StarEq => TokenKind::StarEq,
        RawToken::AtEq => TokenKind::AtEq,
        RawToken::Hash => TokenKind::Hash,
        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Star => TokenKind::Star,
        RawToken::Slash => TokenKind::Slash,
        RawToken::Percent => TokenKind::Percent,
        RawToken::Shl => TokenKind::Shl,
        RawToken::Shr => TokenKind::Shr,
        RawToken::Amp => TokenKind::Amp,
        RawToken::Pipe => TokenKind::Pipe,
        RawToken::Caret => TokenKind::Caret,
        RawToken::Tilde => TokenKind::Tilde,
        RawToken::EqEq => TokenKind::EqEq,
        RawToken::BangEq => TokenKind::BangEq,
        RawToken::Lt => TokenKind::Lt,
        RawToken::LtEq => TokenKind::LtEq,
        RawToken::Gt => TokenKind::Gt,
        RawToken::GtEq => TokenKind::GtEq,
        RawToken::Newline
        | RawToken::Colon
        | RawToken::Str(_)
        | RawToken::UnterminatedStr
        | RawToken::Number
        | RawToken::Directive
        | RawToken::Ident => return None,
    })
}

/// Parses `0x`, `0b` and `0o` prefixed or decimal literals.
pub fn parse_number(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).ok();
    }
    if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        return i64::from_str_radix(oct, 8).ok();
    }
    text.parse::<i64>().ok()
}

fn parse_string(lex: &mut logos::Lexer<RawToken>) -> String {
    let slice = lex.slice();
    let content = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(match escaped {
                    'n' => '\n',
                    other => other,
                });
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn format_token_for_message(token: &str) -> String {
    let escaped: String = token.chars().flat_map(char::escape_default).collect();
    format!("'{escaped}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(SourceId(0), source)
            .expect("lex")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn naked_opcode_before_newline_brace_or_eof() {
        assert_eq!(
            kinds("rts\n{ nop }\nasl"),
            vec![
                TokenKind::NakedOpcode("rts".into()),
                TokenKind::LBrace,
                TokenKind::NakedOpcode("nop".into()),
                TokenKind::RBrace,
                TokenKind::NakedOpcode("asl".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn opcode_with_operand_and_comment() {
        assert_eq!(
            kinds("asl 0x12 ; shift\nrts ; done"),
            vec![
                TokenKind::Opcode {
                    mnemonic: "asl".into(),
                    size: None
                },
                TokenKind::Number(0x12),
                TokenKind::NakedOpcode("rts".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn labels_scoped_identifiers_and_assignment() {
        assert_eq!(
            kinds("start: lda.w foo.bar, x\nk := 2"),
            vec![
                TokenKind::Label("start".into()),
                TokenKind::Opcode {
                    mnemonic: "lda".into(),
                    size: Some(OperandSize::Word)
                },
                TokenKind::Ident("foo.bar".into()),
                TokenKind::Index(IndexRegister::X),
                TokenKind::Ident("k".into()),
                TokenKind::ColonEq,
                TokenKind::Number(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_prefixes_and_lone_zero() {
        assert_eq!(
            kinds(".db 0, 0x1F, 0b101, 0o17, 42"),
            vec![
                TokenKind::Directive(Directive::Db),
                TokenKind::Number(0),
                TokenKind::Comma,
                TokenKind::Number(0x1F),
                TokenKind::Comma,
                TokenKind::Number(5),
                TokenKind::Comma,
                TokenKind::Number(0o17),
                TokenKind::Comma,
                TokenKind::Number(42),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_support_escaped_quotes() {
        assert_eq!(
            kinds(r".ascii 'it\'s'"),
            vec![
                TokenKind::Directive(Directive::Ascii),
                TokenKind::Str("it's".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scan_errors() {
        assert!(matches!(
            lex(SourceId(0), ".ascii 'open\n"),
            Err(ScanError::UnterminatedString { .. })
        ));
        assert!(matches!(
            lex(SourceId(0), "lda.q 0x10"),
            Err(ScanError::InvalidSize { .. })
        ));
        assert!(matches!(
            lex(SourceId(0), "lda 0x10, z"),
            Err(ScanError::InvalidIndex { .. })
        ));
        assert!(matches!(
            lex(SourceId(0), ".bogus 1"),
            Err(ScanError::UnknownDirective { .. })
        ));
        let err = lex(SourceId(0), "lda $10").expect_err("dollar");
        assert_eq!(err.to_string(), "unexpected character '$'");
    }

    #[test]
    fn block_move_operands_keep_their_comma() {
        assert_eq!(
            kinds("mvn 0x7e, 0x01"),
            vec![
                TokenKind::Opcode {
                    mnemonic: "mvn".into(),
                    size: None
                },
                TokenKind::Number(0x7E),
                TokenKind::Comma,
                TokenKind::Number(0x01),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn block_comments_are_skipped() {
        assert_eq!(
            kinds("/* lda #1\n */ nop"),
            vec![TokenKind::NakedOpcode("nop".into()), TokenKind::Eof]
        );
    }
}
