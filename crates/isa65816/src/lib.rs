use std::fmt;

use thiserror::Error;

mod table;

use crate::table::{Entry, MNEMONICS, entries};

/// Operand shape as written in source, before an opcode byte is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    None,
    Immediate,
    Direct,
    DirectIndexed,
    Indirect,
    IndirectIndexed,
    IndirectLong,
    IndirectIndexedLong,
    DpOrSrIndirectIndexed,
    StackIndexedIndirectIndexed,
    /// `source, destination` bank pair of `mvn`/`mvp`.
    BlockMove,
}

impl AddressingMode {
    /// Mode obtained when an index register follows the operand.
    pub fn indexed(self) -> Option<Self> {
        match self {
            Self::Direct => Some(Self::DirectIndexed),
            Self::Indirect => Some(Self::IndirectIndexed),
            Self::IndirectLong => Some(Self::IndirectIndexedLong),
            Self::DpOrSrIndirectIndexed => Some(Self::StackIndexedIndirectIndexed),
            _ => None,
        }
    }

    pub fn requires_index(self) -> bool {
        matches!(
            self,
            Self::DirectIndexed
                | Self::IndirectIndexed
                | Self::IndirectIndexedLong
                | Self::DpOrSrIndirectIndexed
                | Self::StackIndexedIndirectIndexed
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Immediate => "immediate",
            Self::Direct => "direct",
            Self::DirectIndexed => "direct_indexed",
            Self::Indirect => "indirect",
            Self::IndirectIndexed => "indirect_indexed",
            Self::IndirectLong => "indirect_long",
            Self::IndirectIndexedLong => "indirect_indexed_long",
            Self::DpOrSrIndirectIndexed => "dp_or_sr_indirect_indexed",
            Self::StackIndexedIndirectIndexed => "stack_indexed_indirect_indexed",
            Self::BlockMove => "block_move",
        }
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexRegister {
    X,
    Y,
    S,
}

impl IndexRegister {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "x" | "X" => Some(Self::X),
            "y" | "Y" => Some(Self::Y),
            "s" | "S" => Some(Self::S),
            _ => None,
        }
    }
}

impl fmt::Display for IndexRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "x",
            Self::Y => "y",
            Self::S => "s",
        })
    }
}

/// Width of an instruction operand, selected by a `.b`/`.w`/`.l` suffix or
/// inferred from the operand value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperandSize {
    Byte,
    Word,
    Long,
}

impl OperandSize {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "b" | "B" => Some(Self::Byte),
            "w" | "W" => Some(Self::Word),
            "l" | "L" => Some(Self::Long),
            _ => None,
        }
    }

    /// Smallest width whose hexadecimal rendering holds `value`.
    pub fn fitting(value: i64) -> Self {
        Self::for_hex_digits(format!("{:x}", value.unsigned_abs()).len())
    }

    pub fn for_hex_digits(digits: usize) -> Self {
        match digits {
            0..=2 => Self::Byte,
            3..=4 => Self::Word,
            _ => Self::Long,
        }
    }

    pub fn byte_len(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Long => 3,
        }
    }

    fn slot(self) -> usize {
        self.byte_len() - 1
    }

    pub fn suffix(self) -> char {
        match self {
            Self::Byte => 'b',
            Self::Word => 'w',
            Self::Long => 'l',
        }
    }
}

impl fmt::Display for OperandSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// How an opcode byte and its operand are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeForm {
    Implied(u8),
    /// Opcode bytes for byte, word and long operands.
    Sized([Option<u8>; 3]),
    /// Always followed by a 24-bit operand.
    Long(u8),
    /// Signed 8-bit displacement from the next instruction.
    Relative(u8),
    /// Signed 16-bit displacement from the next instruction.
    RelativeLong(u8),
    /// Destination bank then source bank.
    BlockMove(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("unknown mnemonic '{mnemonic}'")]
    UnknownMnemonic { mnemonic: String },
    #[error("addressing mode ({mode}) for opcode ({mnemonic}) is not defined")]
    ModeNotDefined {
        mnemonic: &'static str,
        mode: AddressingMode,
    },
    #[error("addressing mode ({mode}) for opcode ({mnemonic}) requires an index register")]
    MissingIndex {
        mnemonic: &'static str,
        mode: AddressingMode,
    },
    #[error("index register '{index}' is not defined for {mnemonic} in {mode} mode")]
    IndexNotDefined {
        mnemonic: &'static str,
        mode: AddressingMode,
        index: IndexRegister,
    },
    #[error("{mnemonic} does not support size ({size})")]
    NoOpcodeForOperandSize {
        mnemonic: &'static str,
        size: OperandSize,
    },
    #[error("branch displacement {displacement} does not fit in {bits} bits")]
    BranchOutOfRange { displacement: i64, bits: u32 },
    #[error("bank pair {value:#x} is out of range")]
    BankOutOfRange { value: i64 },
}

/// A mnemonic bound to one addressing mode, ready to be sized and encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: &'static str,
    pub mode: AddressingMode,
    pub index: Option<IndexRegister>,
    pub form: OpcodeForm,
}

pub fn is_mnemonic(name: &str) -> bool {
    canonical_mnemonic(name).is_some()
}

/// Whether the mnemonic has an encoding without operand.
pub fn accepts_no_operand(name: &str) -> bool {
    canonical_mnemonic(name)
        .and_then(entries)
        .is_some_and(|entries| {
            entries
                .iter()
                .any(|entry| entry.mode == AddressingMode::None)
        })
}

/// `mvn` and `mvp` take two comma-separated bank operands.
pub fn is_block_move(name: &str) -> bool {
    canonical_mnemonic(name)
        .and_then(entries)
        .is_some_and(|entries| {
            entries
                .iter()
                .any(|entry| entry.mode == AddressingMode::BlockMove)
        })
}

fn canonical_mnemonic(name: &str) -> Option<&'static str> {
    if name.len() != 3 {
        return None;
    }
    let lower = name.to_ascii_lowercase();
    MNEMONICS
        .iter()
        .copied()
        .find(|mnemonic| *mnemonic == lower)
}

pub fn select(
    mnemonic: &str,
    mode: AddressingMode,
    index: Option<IndexRegister>,
) -> Result<Instruction, EncodeError> {
    let Some(canonical) = canonical_mnemonic(mnemonic) else {
        return Err(EncodeError::UnknownMnemonic {
            mnemonic: mnemonic.to_string(),
        });
    };
    let table = entries(canonical).unwrap_or_default();
    let candidates: Vec<&Entry> = table.iter().filter(|entry| entry.mode == mode).collect();
    if candidates.is_empty() {
        return Err(EncodeError::ModeNotDefined {
            mnemonic: canonical,
            mode,
        });
    }

    if mode.requires_index() && index.is_none() {
        return Err(EncodeError::MissingIndex {
            mnemonic: canonical,
            mode,
        });
    }

    let found = candidates.iter().find(|entry| entry.index == index);
    match (found, index) {
        (Some(entry), _) => Ok(Instruction {
            mnemonic: canonical,
            mode,
            index,
            form: entry.form,
        }),
        (None, Some(index)) => Err(EncodeError::IndexNotDefined {
            mnemonic: canonical,
            mode,
            index,
        }),
        (None, None) => Err(EncodeError::ModeNotDefined {
            mnemonic: canonical,
            mode,
        }),
    }
}

impl Instruction {
    pub fn is_relative(&self) -> bool {
        matches!(
            self.form,
            OpcodeForm::Relative(_) | OpcodeForm::RelativeLong(_)
        )
    }

    /// Whether the operand width is chosen by the caller.
    pub fn is_sized(&self) -> bool {
        matches!(self.form, OpcodeForm::Sized(_))
    }

    pub fn opcode(&self, size: OperandSize) -> Result<u8, EncodeError> {
        match self.form {
            OpcodeForm::Implied(opcode)
            | OpcodeForm::Relative(opcode)
            | OpcodeForm::RelativeLong(opcode)
            | OpcodeForm::BlockMove(opcode) => Ok(opcode),
            OpcodeForm::Long(opcode) => {
                if size == OperandSize::Long {
                    Ok(opcode)
                } else {
                    Err(self.no_opcode_for(size))
                }
            }
            OpcodeForm::Sized(slots) => slots[size.slot()].ok_or_else(|| self.no_opcode_for(size)),
        }
    }

    /// Operand width actually encoded, given the requested one.
    pub fn operand_size(&self, requested: OperandSize) -> Option<OperandSize> {
        match self.form {
            OpcodeForm::Implied(_) => None,
            OpcodeForm::Relative(_) => Some(OperandSize::Byte),
            OpcodeForm::RelativeLong(_) | OpcodeForm::BlockMove(_) => Some(OperandSize::Word),
            OpcodeForm::Long(_) => Some(OperandSize::Long),
            OpcodeForm::Sized(_) => Some(requested),
        }
    }

    /// Encoded length in bytes, failing if no opcode exists for the width.
    pub fn len(&self, size: OperandSize) -> Result<usize, EncodeError> {
        self.opcode(size)?;
        Ok(1 + self
            .operand_size(size)
            .map_or(0, OperandSize::byte_len))
    }

    /// Encodes the instruction. For relative forms `value` is the
    /// displacement, already measured from the next instruction; block
    /// moves take `source << 8 | destination`.
    pub fn encode(&self, size: OperandSize, value: i64) -> Result<Vec<u8>, EncodeError> {
        let opcode = self.opcode(size)?;
        let mut out = vec![opcode];
        match self.form {
            OpcodeForm::Implied(_) => {}
            OpcodeForm::Relative(_) => {
                let displacement =
                    i8::try_from(value).map_err(|_| EncodeError::BranchOutOfRange {
                        displacement: value,
                        bits: 8,
                    })?;
                out.push(displacement as u8);
            }
            OpcodeForm::RelativeLong(_) => {
                let displacement =
                    i16::try_from(value).map_err(|_| EncodeError::BranchOutOfRange {
                        displacement: value,
                        bits: 16,
                    })?;
                out.extend_from_slice(&displacement.to_le_bytes());
            }
            OpcodeForm::BlockMove(_) => {
                let banks = u16::try_from(value).map_err(|_| EncodeError::BankOutOfRange { value })?;
                out.extend_from_slice(&banks.to_le_bytes());
            }
            OpcodeForm::Long(_) => push_value(&mut out, OperandSize::Long, value),
            OpcodeForm::Sized(_) => push_value(&mut out, size, value),
        }
        Ok(out)
    }

    fn no_opcode_for(&self, size: OperandSize) -> EncodeError {
        EncodeError::NoOpcodeForOperandSize {
            mnemonic: self.mnemonic,
            size,
        }
    }
}

fn push_value(out: &mut Vec<u8>, size: OperandSize, value: i64) {
    let bytes = (value as u64).to_le_bytes();
    out.extend_from_slice(&bytes[..size.byte_len()]);
}

/// Table entry that produces a given opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedOpcode {
    pub mnemonic: &'static str,
    pub mode: AddressingMode,
    pub index: Option<IndexRegister>,
    /// Operand width, `None` for implied forms.
    pub size: Option<OperandSize>,
}

pub fn decode_opcode(opcode: u8) -> Option<DecodedOpcode> {
    for &mnemonic in MNEMONICS {
        for entry in entries(mnemonic).unwrap_or_default() {
            let size = match entry.form {
                OpcodeForm::Implied(byte) if byte == opcode => None,
                OpcodeForm::Relative(byte) if byte == opcode => Some(OperandSize::Byte),
                OpcodeForm::RelativeLong(byte) | OpcodeForm::BlockMove(byte) if byte == opcode => {
                    Some(OperandSize::Word)
                }
                OpcodeForm::Long(byte) if byte == opcode => Some(OperandSize::Long),
                OpcodeForm::Sized(slots) => {
                    let Some(slot) = slots.iter().position(|slot| *slot == Some(opcode)) else {
                        continue;
                    };
                    Some(match slot {
                        0 => OperandSize::Byte,
                        1 => OperandSize::Word,
                        _ => OperandSize::Long,
                    })
                }
                _ => continue,
            };
            return Some(DecodedOpcode {
                mnemonic,
                mode: entry.mode,
                index: entry.index,
                size,
            });
        }
    }
    None
}

/// Renders encoded bytes as `mnemonic operand` for trace output.
pub fn format_instruction(bytes: &[u8]) -> String {
    let Some((&opcode, operand)) = bytes.split_first() else {
        return String::new();
    };
    let Some(decoded) = decode_opcode(opcode) else {
        return format!(".db 0x{opcode:02x}");
    };
    if operand.is_empty() {
        return decoded.mnemonic.to_string();
    }
    let mut value = 0u32;
    for (shift, byte) in operand.iter().enumerate() {
        value |= u32::from(*byte) << (shift * 8);
    }
    if decoded.mode == AddressingMode::BlockMove
        && let [destination, source] = operand
    {
        return format!("{} 0x{source:02x}, 0x{destination:02x}", decoded.mnemonic);
    }
    let digits = operand.len() * 2;
    let text = format!("0x{value:0digits$x}");
    let operand = match (decoded.mode, decoded.index) {
        (AddressingMode::Immediate, _) => format!("#{text}"),
        (AddressingMode::DirectIndexed, Some(index)) => format!("{text}, {index}"),
        (AddressingMode::Indirect, _) => format!("({text})"),
        (AddressingMode::IndirectIndexed, Some(index)) => format!("({text}), {index}"),
        (AddressingMode::IndirectLong, _) => format!("[{text}]"),
        (AddressingMode::IndirectIndexedLong, Some(index)) => format!("[{text}], {index}"),
        (AddressingMode::DpOrSrIndirectIndexed, Some(index)) => format!("({text}, {index})"),
        (AddressingMode::StackIndexedIndirectIndexed, Some(index)) => {
            format!("({text}, s), {index}")
        }
        _ => text,
    };
    format!("{} {operand}", decoded.mnemonic)
}
