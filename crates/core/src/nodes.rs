//! Flat emission nodes produced by the code generator and walked by the
//! resolver passes.

use a816_ips::Block as PatchBlock;
use a816_isa65816::{EncodeError, Instruction, OperandSize};
use thiserror::Error;

use crate::ast::{DataWidth, Expr};
use crate::bus::BusError;
use crate::diag::Diagnostic;
use crate::expr::EvalError;
use crate::scope::ScopeError;
use crate::span::{Span, Spanned};

pub type NodeList = Vec<Spanned<Node>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Opcode(OpcodeNode),
    Label(String),
    /// Symbol whose value is only known once labels are placed. With
    /// `from_parent`, the expression is evaluated in the enclosing scope
    /// (macro arguments).
    SymbolBinding {
        name: String,
        value: Expr,
        from_parent: bool,
    },
    /// Raw file contents; `base` is bound as a label at the start address.
    BinaryInclude {
        base: String,
        bytes: Vec<u8>,
    },
    Data {
        width: DataWidth,
        value: Expr,
    },
    ScopeEnter,
    ScopeExit,
    /// Pre-encoded `.text` or `.ascii` bytes.
    Bytes(Vec<u8>),
    CodePosition(Expr),
    RelocationAddress(Expr),
    /// Records of an existing patch, replayed verbatim.
    IncludePatch {
        blocks: Vec<PatchBlock>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeNode {
    pub instruction: Instruction,
    /// Width requested with a `.b`/`.w`/`.l` suffix.
    pub size: Option<OperandSize>,
    pub operand: Option<Expr>,
    /// Destination bank of a block move.
    pub destination: Option<Expr>,
}

impl OpcodeNode {
    /// Operand width: the suffix, else the width fixed by the opcode form
    /// (`jml`, `brl`), else the literal's written width, else the smallest
    /// width holding `value`.
    pub fn operand_size(&self, value: i64) -> OperandSize {
        if let Some(size) = self.size {
            return size;
        }
        if !self.instruction.is_sized()
            && let Some(size) = self.instruction.operand_size(OperandSize::Byte)
        {
            return size;
        }
        self.operand
            .as_ref()
            .and_then(Expr::literal_width)
            .unwrap_or_else(|| OperandSize::fitting(value))
    }

    pub fn len(&self, value: i64) -> Result<usize, EncodeError> {
        self.instruction.len(self.operand_size(value))
    }

    /// Length used before the operand is known. Falls back to the widest
    /// encoding the instruction has so the size pass can keep going; a
    /// wrong guess surfaces as a moved label in the next pass.
    pub fn estimated_len(&self, proxy: i64) -> usize {
        if let Ok(len) = self.len(proxy) {
            return len;
        }
        [OperandSize::Long, OperandSize::Word, OperandSize::Byte]
            .into_iter()
            .find_map(|size| self.instruction.len(size).ok())
            .unwrap_or(1)
    }

    /// Branch length, counted from the instruction start to the next one.
    pub fn relative_len(&self) -> i64 {
        self.instruction
            .operand_size(OperandSize::Byte)
            .map_or(1, |size| 1 + size.byte_len() as i64)
    }
}

impl DataWidth {
    /// Little-endian bytes of `value`, which must fit signed or unsigned.
    pub fn encode(self, value: i64) -> Option<Vec<u8>> {
        let bits = 8 * self.byte_len() as u32;
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << bits) - 1;
        if !(min..=max).contains(&value) {
            return None;
        }
        Some(value.to_le_bytes()[..self.byte_len()].to_vec())
    }

    pub fn mask(self) -> i64 {
        (1i64 << (8 * self.byte_len())) - 1
    }
}

/// Fatal error raised while generating or resolving nodes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NodeError {
    pub message: String,
    pub span: Span,
    pub help: Option<String>,
}

impl NodeError {
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

    pub fn encode(error: EncodeError, span: Span) -> Self {
        let help = match &error {
            EncodeError::NoOpcodeForOperandSize { .. } => {
                Some("pick a supported width with a .b, .w or .l suffix")
            }
            EncodeError::MissingIndex { .. } => Some("add ', x' or ', y' after the operand"),
            EncodeError::BranchOutOfRange { .. } => Some("use brl or a jmp to reach the target"),
            _ => None,
        };
        let error = Self::new(error.to_string(), span);
        match help {
            Some(help) => error.with_help(help),
            None => error,
        }
    }

    pub fn bus(error: BusError, span: Span) -> Self {
        Self::new(error.to_string(), span)
    }

    pub fn scope(error: ScopeError, span: Span) -> Self {
        Self::new(error.to_string(), span)
    }
}

impl From<EvalError> for NodeError {
    fn from(error: EvalError) -> Self {
        let span = error.span();
        let undefined = error.is_undefined();
        let error = Self::new(error.to_string(), span);
        if undefined {
            error.with_help("define the symbol or label before assembling, or pass it with -D")
        } else {
            error
        }
    }
}

impl From<NodeError> for Diagnostic {
    fn from(error: NodeError) -> Self {
        let diagnostic = Diagnostic::error(error.span, error.message);
        match error.help {
            Some(help) => diagnostic.with_help(help),
            None => diagnostic,
        }
    }
}
