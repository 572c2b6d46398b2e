use serde::{Deserialize, Serialize};

use crate::opcode::Opcode;
use crate::version::Version;

/// What an operand means.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandKind {
    /// Signed immediate (`ldi`, `pushi`).
    Int,
    /// Unsigned immediate (`link`).
    UInt,
    /// Signed displacement from the next instruction (branches, `call`).
    Label,
    /// Number of argument bytes pushed for a call or send.
    FrameSize,
    /// Kernel function number.
    Kernel,
    /// Export table index.
    Export,
    /// Script (unit) number.
    Script,
    /// Class (species) number.
    Class,
    /// Byte offset of a property in the current object.
    Property,
    /// Variable index for the load/store families.
    Variable,
    /// Parameter index (`&rest`).
    Param,
    /// Variable type and modifier bits of `lea`.
    LeaType,
    /// `lofsa`/`lofss` displacement from the next instruction.
    RelativeOffset,
    /// `lofsa`/`lofss` absolute offset into the unit.
    AbsoluteOffset,
    /// Source line of a `_line_` marker.
    Line,
    /// Source file of a `_file_` marker.
    File,
}

impl OperandKind {
    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            OperandKind::Int | OperandKind::Label | OperandKind::RelativeOffset
        )
    }
}

/// How many bytes an operand occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    /// One byte when the raw opcode's low bit is set, two otherwise.
    Flag,
    Byte,
    Word,
    /// NUL-terminated string.
    CString,
}

/// One entry of an opcode's operand list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperandType {
    pub kind: OperandKind,
    pub width: Width,
}

impl OperandType {
    const fn flag(kind: OperandKind) -> Self {
        Self {
            kind,
            width: Width::Flag,
        }
    }

    const fn byte(kind: OperandKind) -> Self {
        Self {
            kind,
            width: Width::Byte,
        }
    }

    const fn word(kind: OperandKind) -> Self {
        Self {
            kind,
            width: Width::Word,
        }
    }

    /// Encoded size in bytes given the raw opcode byte; `None` for strings.
    pub const fn size(&self, raw: u8) -> Option<usize> {
        match self.width {
            Width::Flag if raw & 1 == 1 => Some(1),
            Width::Flag => Some(2),
            Width::Byte => Some(1),
            Width::Word => Some(2),
            Width::CString => None,
        }
    }
}

/// A decoded operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// A numeric operand, sign-extended when its kind is signed.
    Value { kind: OperandKind, value: i32 },
    /// A string operand.
    Text { kind: OperandKind, text: String },
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Value { kind, .. } | Operand::Text { kind, .. } => *kind,
        }
    }

    pub fn value(&self) -> Option<i32> {
        match self {
            Operand::Value { value, .. } => Some(*value),
            Operand::Text { .. } => None,
        }
    }

    /// The operand's low 16 bits, as stored in the instruction stream.
    pub fn raw_u16(&self) -> Option<u16> {
        self.value().map(|v| v as u16)
    }
}

use OperandKind as K;

const NONE: &[OperandType] = &[];
const LABEL: &[OperandType] = &[OperandType::flag(K::Label)];
const INT: &[OperandType] = &[OperandType::flag(K::Int)];
const UINT: &[OperandType] = &[OperandType::flag(K::UInt)];
const CLASS: &[OperandType] = &[OperandType::flag(K::Class)];
const PARAM: &[OperandType] = &[OperandType::flag(K::Param)];
const LEA: &[OperandType] = &[OperandType::flag(K::LeaType), OperandType::flag(K::Variable)];
const PROPERTY: &[OperandType] = &[OperandType::flag(K::Property)];
const VARIABLE: &[OperandType] = &[OperandType::flag(K::Variable)];
const FILE: &[OperandType] = &[OperandType {
    kind: K::File,
    width: Width::CString,
}];
const LINE: &[OperandType] = &[OperandType::word(K::Line)];

const CALL_SCI0: &[OperandType] = &[OperandType::flag(K::Label), OperandType::byte(K::FrameSize)];
const CALLK_SCI0: &[OperandType] = &[OperandType::flag(K::Kernel), OperandType::byte(K::FrameSize)];
const CALLB_SCI0: &[OperandType] = &[OperandType::flag(K::Export), OperandType::byte(K::FrameSize)];
const CALLE_SCI0: &[OperandType] = &[
    OperandType::flag(K::Script),
    OperandType::flag(K::Export),
    OperandType::byte(K::FrameSize),
];
const SEND_SCI0: &[OperandType] = &[OperandType::byte(K::FrameSize)];
const SUPER_SCI0: &[OperandType] = &[OperandType::flag(K::Class), OperandType::byte(K::FrameSize)];
const LOFS_SCI0: &[OperandType] = &[OperandType::flag(K::RelativeOffset)];

const CALL_SCI2: &[OperandType] = &[OperandType::flag(K::Label), OperandType::word(K::FrameSize)];
const CALLK_SCI2: &[OperandType] = &[OperandType::flag(K::Kernel), OperandType::word(K::FrameSize)];
const CALLB_SCI2: &[OperandType] = &[OperandType::flag(K::Export), OperandType::word(K::FrameSize)];
const CALLE_SCI2: &[OperandType] = &[
    OperandType::flag(K::Script),
    OperandType::flag(K::Export),
    OperandType::word(K::FrameSize),
];
const SEND_SCI2: &[OperandType] = &[OperandType::word(K::FrameSize)];
const SUPER_SCI2: &[OperandType] = &[OperandType::flag(K::Class), OperandType::word(K::FrameSize)];
const LOFS_SCI2: &[OperandType] = &[OperandType::word(K::AbsoluteOffset)];

/// Ordered operand types of `opcode` under `version`'s table.
///
/// Opcodes absent from the table (and the sentinel) have no operands.
pub fn operand_types(version: Version, opcode: Opcode) -> &'static [OperandType] {
    use Opcode as O;

    let sci2 = matches!(version, Version::Sci2);
    match opcode {
        O::Bt | O::Bnt | O::Jmp => LABEL,
        O::Ldi | O::Pushi => INT,
        O::Link => UINT,
        O::Call => if sci2 { CALL_SCI2 } else { CALL_SCI0 },
        O::Callk => if sci2 { CALLK_SCI2 } else { CALLK_SCI0 },
        O::Callb => if sci2 { CALLB_SCI2 } else { CALLB_SCI0 },
        O::Calle => if sci2 { CALLE_SCI2 } else { CALLE_SCI0 },
        O::Send | O::SelfSend => if sci2 { SEND_SCI2 } else { SEND_SCI0 },
        O::Super => if sci2 { SUPER_SCI2 } else { SUPER_SCI0 },
        O::Class => CLASS,
        O::Rest => PARAM,
        O::Lea => LEA,
        O::PToA | O::AToP | O::PToS | O::SToP | O::IpToA | O::DpToA | O::IpToS | O::DpToS => {
            PROPERTY
        }
        O::Lofsa | O::Lofss => {
            if version.absolute_offsets() { LOFS_SCI2 } else { LOFS_SCI0 }
        }
        O::Filename if sci2 => FILE,
        O::LineNumber if sci2 => LINE,
        O::Filename | O::LineNumber | O::Indeterminate => NONE,
        op if op.code().is_some_and(|c| c >= 0x40) => VARIABLE,
        _ => NONE,
    }
}
