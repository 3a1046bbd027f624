use a816_isa65816::{AddressingMode, IndexRegister, OperandSize};

use crate::span::{Span, Spanned};

pub type Block = Vec<Spanned<Stmt>>;

/// Unevaluated infix expression, kept in source order until a scope is
/// available to resolve its symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub items: Vec<Spanned<ExprItem>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprItem {
    Term(Term),
    Unary(UnaryOp),
    Binary(BinaryOp),
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Literal value and its source text, used for width inference.
    Number { value: i64, text: String },
    Symbol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Xor,
    Or,
}

impl BinaryOp {
    /// Binding level; lower binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Mul | Self::Div | Self::Rem => 3,
            Self::Add | Self::Sub => 4,
            Self::Shl | Self::Shr => 5,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 6,
            Self::Eq | Self::Ne => 7,
            Self::And => 8,
            Self::Xor => 9,
            Self::Or => 10,
        }
    }
}

pub const UNARY_PRECEDENCE: u8 = 2;

impl Expr {
    pub fn number(value: i64, span: Span) -> Self {
        Self {
            items: vec![Spanned::new(
                ExprItem::Term(Term::Number {
                    value,
                    text: value.to_string(),
                }),
                span,
            )],
            span,
        }
    }

    /// Name of the symbol when the expression is a lone reference.
    pub fn as_symbol(&self) -> Option<&str> {
        match self.items.as_slice() {
            [
                Spanned {
                    node: ExprItem::Term(Term::Symbol(name)),
                    ..
                },
            ] => Some(name),
            _ => None,
        }
    }

    /// Operand width implied by a lone hexadecimal or binary literal.
    pub fn literal_width(&self) -> Option<OperandSize> {
        let [
            Spanned {
                node: ExprItem::Term(Term::Number { text, .. }),
                ..
            },
        ] = self.items.as_slice()
        else {
            return None;
        };
        let lower = text.to_ascii_lowercase();
        if let Some(hex) = lower.strip_prefix("0x") {
            return Some(OperandSize::for_hex_digits(hex.len()));
        }
        lower.strip_prefix("0b").map(|bin| match bin.len() {
            0..=8 => OperandSize::Byte,
            9..=16 => OperandSize::Word,
            _ => OperandSize::Long,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeStmt {
    pub mnemonic: String,
    pub size: Option<OperandSize>,
    pub mode: AddressingMode,
    pub operand: Option<Expr>,
    pub index: Option<IndexRegister>,
    /// Register inside the parentheses of `(sr, s), y`.
    pub inner_index: Option<IndexRegister>,
    /// Second bank operand of `mvn`/`mvp`; `operand` holds the source.
    pub destination: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataWidth {
    Byte,
    Word,
    Long,
    Pointer,
}

impl DataWidth {
    pub fn byte_len(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Long | Self::Pointer => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroArg {
    Expr(Expr),
    Block(Block),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapArgs {
    pub identifier: Option<String>,
    pub bank_range: Option<(i64, i64)>,
    pub address_range: Option<(i64, i64)>,
    pub mask: Option<i64>,
    pub writable: bool,
    pub mirror_bank_range: Option<(i64, i64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub width: DataWidth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Label(String),
    Opcode(OpcodeStmt),
    /// `name = expr` or `name := expr`.
    Assign {
        name: String,
        value: Expr,
    },
    MacroDef {
        name: String,
        params: Vec<String>,
        body: Block,
    },
    MacroApply {
        name: String,
        args: Vec<MacroArg>,
    },
    NamedScope {
        name: String,
        body: Block,
    },
    Compound(Block),
    If {
        condition: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    For {
        var: String,
        start: Expr,
        end: Expr,
        body: Block,
    },
    Data {
        width: DataWidth,
        values: Vec<Expr>,
    },
    Text(String),
    Ascii(String),
    Table(String),
    IncludeBinary(String),
    IncludeIps {
        path: String,
        delta: Option<Expr>,
    },
    CodePosition(Expr),
    Relocation(Expr),
    Map(MapArgs),
    Struct {
        name: String,
        fields: Vec<StructField>,
    },
    CodeLookup(String),
}
