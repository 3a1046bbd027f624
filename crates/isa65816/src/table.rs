use crate::{AddressingMode, IndexRegister, OpcodeForm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    pub mode: AddressingMode,
    pub index: Option<IndexRegister>,
    pub form: OpcodeForm,
}

macro_rules! slot {
    (-) => {
        None
    };
    ($byte:literal) => {
        Some($byte)
    };
}

macro_rules! sized {
    ($byte:tt, $word:tt, $long:tt) => {
        OpcodeForm::Sized([slot!($byte), slot!($word), slot!($long)])
    };
}

macro_rules! entry {
    ($mode:ident => $form:expr) => {
        Entry {
            mode: AddressingMode::$mode,
            index: None,
            form: $form,
        }
    };
    ($mode:ident, $index:ident => $form:expr) => {
        Entry {
            mode: AddressingMode::$mode,
            index: Some(IndexRegister::$index),
            form: $form,
        }
    };
}

macro_rules! implied {
    ($opcode:literal) => {
        &[entry!(None => OpcodeForm::Implied($opcode))]
    };
}

macro_rules! branch {
    ($opcode:literal) => {
        &[entry!(Direct => OpcodeForm::Relative($opcode))]
    };
}

// Accumulator group: adc and cmp eor lda ora sbc share one operand layout.
macro_rules! alu {
    ($imm:literal, $dp:literal, $abs:literal, $long:literal,
     $dpx:literal, $absx:literal, $longx:literal, $absy:literal, $sr:literal,
     $ind:literal, $indy:literal, $indl:literal, $indly:literal, $indx:literal, $sry:literal) => {
        &[
            entry!(Immediate => sized!($imm, $imm, -)),
            entry!(Direct => sized!($dp, $abs, $long)),
            entry!(DirectIndexed, X => sized!($dpx, $absx, $longx)),
            entry!(DirectIndexed, Y => sized!(-, $absy, -)),
            entry!(DirectIndexed, S => sized!($sr, -, -)),
            entry!(Indirect => sized!($ind, -, -)),
            entry!(IndirectIndexed, Y => sized!($indy, -, -)),
            entry!(IndirectLong => sized!($indl, -, -)),
            entry!(IndirectIndexedLong, Y => sized!($indly, -, -)),
            entry!(DpOrSrIndirectIndexed, X => sized!($indx, -, -)),
            entry!(StackIndexedIndirectIndexed, Y => sized!($sry, -, -)),
        ]
    };
}

// Read-modify-write group: asl dec inc lsr rol ror.
macro_rules! rmw {
    ($acc:literal, $dp:literal, $abs:literal, $dpx:literal, $absx:literal) => {
        &[
            entry!(None => OpcodeForm::Implied($acc)),
            entry!(Direct => sized!($dp, $abs, -)),
            entry!(DirectIndexed, X => sized!($dpx, $absx, -)),
        ]
    };
}

pub(crate) const MNEMONICS: &[&str] = &[
    "adc", "and", "asl", "bcc", "bcs", "beq", "bit", "bmi", "bne", "bpl", "bra", "brk", "brl",
    "bvc", "bvs", "clc", "cld", "cli", "clv", "cmp", "cop", "cpx", "cpy", "dec", "dex", "dey",
    "eor", "inc", "inx", "iny", "jml", "jmp", "jsl", "jsr", "lda", "ldx", "ldy", "lsr", "mvn", "mvp", "nop",
    "ora", "pea", "pei", "per", "pha", "phb", "phd", "phk", "php", "phx", "phy", "pla", "plb",
    "pld", "plp", "plx", "ply", "rep", "rol", "ror", "rti", "rtl", "rts", "sbc", "sec", "sed",
    "sei", "sep", "sta", "stp", "stx", "sty", "stz", "tax", "tay", "tcd", "tcs", "tdc", "trb",
    "tsb", "tsc", "tsx", "txa", "txs", "txy", "tya", "tyx", "wai", "wdm", "xba", "xce",
];

pub(crate) fn entries(mnemonic: &str) -> Option<&'static [Entry]> {
    let entries: &'static [Entry] = match mnemonic {
        "adc" => alu!(
            0x69, 0x65, 0x6D, 0x6F, 0x75, 0x7D, 0x7F, 0x79, 0x63, 0x72, 0x71, 0x67, 0x77, 0x61,
            0x73
        ),
        "and" => alu!(
            0x29, 0x25, 0x2D, 0x2F, 0x35, 0x3D, 0x3F, 0x39, 0x23, 0x32, 0x31, 0x27, 0x37, 0x21,
            0x33
        ),
        "cmp" => alu!(
            0xC9, 0xC5, 0xCD, 0xCF, 0xD5, 0xDD, 0xDF, 0xD9, 0xC3, 0xD2, 0xD1, 0xC7, 0xD7, 0xC1,
            0xD3
        ),
        "eor" => alu!(
            0x49, 0x45, 0x4D, 0x4F, 0x55, 0x5D, 0x5F, 0x59, 0x43, 0x52, 0x51, 0x47, 0x57, 0x41,
            0x53
        ),
        "lda" => alu!(
            0xA9, 0xA5, 0xAD, 0xAF, 0xB5, 0xBD, 0xBF, 0xB9, 0xA3, 0xB2, 0xB1, 0xA7, 0xB7, 0xA1,
            0xB3
        ),
        "ora" => alu!(
            0x09, 0x05, 0x0D, 0x0F, 0x15, 0x1D, 0x1F, 0x19, 0x03, 0x12, 0x11, 0x07, 0x17, 0x01,
            0x13
        ),
        "sbc" => alu!(
            0xE9, 0xE5, 0xED, 0xEF, 0xF5, 0xFD, 0xFF, 0xF9, 0xE3, 0xF2, 0xF1, 0xE7, 0xF7, 0xE1,
            0xF3
        ),
        "sta" => &[
            entry!(Direct => sized!(0x85, 0x8D, 0x8F)),
            entry!(DirectIndexed, X => sized!(0x95, 0x9D, 0x9F)),
            entry!(DirectIndexed, Y => sized!(-, 0x99, -)),
            entry!(DirectIndexed, S => sized!(0x83, -, -)),
            entry!(Indirect => sized!(0x92, -, -)),
            entry!(IndirectIndexed, Y => sized!(0x91, -, -)),
            entry!(IndirectLong => sized!(0x87, -, -)),
            entry!(IndirectIndexedLong, Y => sized!(0x97, -, -)),
            entry!(DpOrSrIndirectIndexed, X => sized!(0x81, -, -)),
            entry!(StackIndexedIndirectIndexed, Y => sized!(0x93, -, -)),
        ],

        "asl" => rmw!(0x0A, 0x06, 0x0E, 0x16, 0x1E),
        "dec" => rmw!(0x3A, 0xC6, 0xCE, 0xD6, 0xDE),
        "inc" => rmw!(0x1A, 0xE6, 0xEE, 0xF6, 0xFE),
        "lsr" => rmw!(0x4A, 0x46, 0x4E, 0x56, 0x5E),
        "rol" => rmw!(0x2A, 0x26, 0x2E, 0x36, 0x3E),
        "ror" => rmw!(0x6A, 0x66, 0x6E, 0x76, 0x7E),

        "bit" => &[
            entry!(Immediate => sized!(0x89, 0x89, -)),
            entry!(Direct => sized!(0x24, 0x2C, -)),
            entry!(DirectIndexed, X => sized!(0x34, 0x3C, -)),
        ],
        "cpx" => &[
            entry!(Immediate => sized!(0xE0, 0xE0, -)),
            entry!(Direct => sized!(0xE4, 0xEC, -)),
        ],
        "cpy" => &[
            entry!(Immediate => sized!(0xC0, 0xC0, -)),
            entry!(Direct => sized!(0xC4, 0xCC, -)),
        ],
        "ldx" => &[
            entry!(Immediate => sized!(0xA2, 0xA2, -)),
            entry!(Direct => sized!(0xA6, 0xAE, -)),
            entry!(DirectIndexed, Y => sized!(0xB6, 0xBE, -)),
        ],
        "ldy" => &[
            entry!(Immediate => sized!(0xA0, 0xA0, -)),
            entry!(Direct => sized!(0xA4, 0xAC, -)),
            entry!(DirectIndexed, X => sized!(0xB4, 0xBC, -)),
        ],
        "stx" => &[
            entry!(Direct => sized!(0x86, 0x8E, -)),
            entry!(DirectIndexed, Y => sized!(0x96, -, -)),
        ],
        "sty" => &[
            entry!(Direct => sized!(0x84, 0x8C, -)),
            entry!(DirectIndexed, X => sized!(0x94, -, -)),
        ],
        "stz" => &[
            entry!(Direct => sized!(0x64, 0x9C, -)),
            entry!(DirectIndexed, X => sized!(0x74, 0x9E, -)),
        ],
        "trb" => &[entry!(Direct => sized!(0x14, 0x1C, -))],
        "tsb" => &[entry!(Direct => sized!(0x04, 0x0C, -))],

        "jmp" => &[
            entry!(Direct => sized!(-, 0x4C, 0x5C)),
            entry!(Indirect => sized!(-, 0x6C, -)),
            entry!(IndirectLong => sized!(-, 0xDC, -)),
            entry!(DpOrSrIndirectIndexed, X => sized!(-, 0x7C, -)),
        ],
        "jml" => &[
            entry!(Direct => OpcodeForm::Long(0x5C)),
            entry!(IndirectLong => sized!(-, 0xDC, -)),
        ],
        "jsr" => &[
            entry!(Direct => sized!(-, 0x20, 0x22)),
            entry!(DpOrSrIndirectIndexed, X => sized!(-, 0xFC, -)),
        ],
        "jsl" => &[entry!(Direct => OpcodeForm::Long(0x22))],

        "pea" => &[entry!(Direct => sized!(-, 0xF4, -))],
        "pei" => &[entry!(Indirect => sized!(0xD4, -, -))],
        "per" => &[entry!(Direct => OpcodeForm::RelativeLong(0x62))],

        "brk" => implied!(0x00),
        "cop" => &[entry!(Immediate => sized!(0x02, -, -))],
        "rep" => &[entry!(Immediate => sized!(0xC2, -, -))],
        "sep" => &[entry!(Immediate => sized!(0xE2, -, -))],
        "wdm" => &[entry!(Immediate => sized!(0x42, -, -))],

        "bcc" => branch!(0x90),
        "bcs" => branch!(0xB0),
        "beq" => branch!(0xF0),
        "bmi" => branch!(0x30),
        "bne" => branch!(0xD0),
        "bpl" => branch!(0x10),
        "bra" => branch!(0x80),
        "bvc" => branch!(0x50),
        "bvs" => branch!(0x70),
        "brl" => &[entry!(Direct => OpcodeForm::RelativeLong(0x82))],
        "mvn" => &[entry!(BlockMove => OpcodeForm::BlockMove(0x54))],
        "mvp" => &[entry!(BlockMove => OpcodeForm::BlockMove(0x44))],

        "clc" => implied!(0x18),
        "cld" => implied!(0xD8),
        "cli" => implied!(0x58),
        "clv" => implied!(0xB8),
        "dex" => implied!(0xCA),
        "dey" => implied!(0x88),
        "inx" => implied!(0xE8),
        "iny" => implied!(0xC8),
        "nop" => implied!(0xEA),
        "pha" => implied!(0x48),
        "phb" => implied!(0x8B),
        "phd" => implied!(0x0B),
        "phk" => implied!(0x4B),
        "php" => implied!(0x08),
        "phx" => implied!(0xDA),
        "phy" => implied!(0x5A),
        "pla" => implied!(0x68),
        "plb" => implied!(0xAB),
        "pld" => implied!(0x2B),
        "plp" => implied!(0x28),
        "plx" => implied!(0xFA),
        "ply" => implied!(0x7A),
        "rti" => implied!(0x40),
        "rtl" => implied!(0x6B),
        "rts" => implied!(0x60),
        "sec" => implied!(0x38),
        "sed" => implied!(0xF8),
        "sei" => implied!(0x78),
        "stp" => implied!(0xDB),
        "tax" => implied!(0xAA),
        "tay" => implied!(0xA8),
        "tcd" => implied!(0x5B),
        "tcs" => implied!(0x1B),
        "tdc" => implied!(0x7B),
        "tsc" => implied!(0x3B),
        "tsx" => implied!(0xBA),
        "txa" => implied!(0x8A),
        "txs" => implied!(0x9A),
        "txy" => implied!(0x9B),
        "tya" => implied!(0x98),
        "tyx" => implied!(0xBB),
        "wai" => implied!(0xCB),
        "xba" => implied!(0xEB),
        "xce" => implied!(0xFB),
        _ => return None,
    };
    Some(entries)
}
