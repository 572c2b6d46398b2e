use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Raw byte of the `_file_` pseudo-opcode in tables that have it.
pub const FILENAME_RAW: u8 = 0x7d;
/// Raw byte of the `_line_` pseudo-opcode in tables that have it.
pub const LINE_NUMBER_RAW: u8 = 0x7e;
/// Bit in `lea`'s first operand selecting accumulator-indexed addressing.
pub const LEA_ACC_INDEX: u16 = 0x10;

bitflags! {
    /// Control-flow properties of an opcode.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OpcodeFlags: u8 {
        /// Transfers control to a label operand.
        const JUMP = 1 << 0;
        /// The jump is taken only on a condition (`bt`/`bnt`).
        const CONDITIONAL = 1 << 1;
        /// Leaves the function.
        const RETURN = 1 << 2;
        /// Calls a procedure or kernel function.
        const CALL = 1 << 3;
        /// Sends a message to an object.
        const SEND = 1 << 4;
        /// Debug information only; never executed.
        const PSEUDO = 1 << 5;
    }
}

macro_rules! opcodes {
    ($($variant:ident = $code:literal => $mnemonic:literal,)*) => {
        /// Symbolic operation of the script VM.
        ///
        /// The general opcodes occupy the upper seven bits of the raw byte;
        /// the pseudo-opcodes [`Opcode::Filename`] and [`Opcode::LineNumber`]
        /// use fixed raw bytes and only exist in some tables.
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub enum Opcode {
            $($variant,)*
            Filename,
            LineNumber,
            /// Sentinel for unknown raw values and names.
            Indeterminate,
        }

        impl Opcode {
            const GENERAL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            /// 7-bit opcode number, `None` for pseudo-opcodes and the sentinel.
            pub const fn code(self) -> Option<u8> {
                match self {
                    $(Opcode::$variant => Some($code),)*
                    _ => None,
                }
            }

            /// Base mnemonic.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                    Opcode::Filename => "_file_",
                    Opcode::LineNumber => "_line_",
                    Opcode::Indeterminate => "???",
                }
            }

            const fn from_code(code: u8) -> Opcode {
                match code {
                    $($code => Opcode::$variant,)*
                    _ => Opcode::Indeterminate,
                }
            }
        }
    };
}

opcodes! {
    Bnot = 0x00 => "bnot",
    Add = 0x01 => "add",
    Sub = 0x02 => "sub",
    Mul = 0x03 => "mul",
    Div = 0x04 => "div",
    Mod = 0x05 => "mod",
    Shr = 0x06 => "shr",
    Shl = 0x07 => "shl",
    Xor = 0x08 => "xor",
    And = 0x09 => "and",
    Or = 0x0a => "or",
    Neg = 0x0b => "neg",
    Not = 0x0c => "not",
    Eq = 0x0d => "eq?",
    Ne = 0x0e => "ne?",
    Gt = 0x0f => "gt?",
    Ge = 0x10 => "ge?",
    Lt = 0x11 => "lt?",
    Le = 0x12 => "le?",
    Ugt = 0x13 => "ugt?",
    Uge = 0x14 => "uge?",
    Ult = 0x15 => "ult?",
    Ule = 0x16 => "ule?",
    Bt = 0x17 => "bt",
    Bnt = 0x18 => "bnt",
    Jmp = 0x19 => "jmp",
    Ldi = 0x1a => "ldi",
    Push = 0x1b => "push",
    Pushi = 0x1c => "pushi",
    Toss = 0x1d => "toss",
    Dup = 0x1e => "dup",
    Link = 0x1f => "link",
    Call = 0x20 => "call",
    Callk = 0x21 => "callk",
    Callb = 0x22 => "callb",
    Calle = 0x23 => "calle",
    Ret = 0x24 => "ret",
    Send = 0x25 => "send",
    Class = 0x28 => "class",
    SelfSend = 0x2a => "self",
    Super = 0x2b => "super",
    Rest = 0x2c => "&rest",
    Lea = 0x2d => "lea",
    SelfId = 0x2e => "selfID",
    Pprev = 0x30 => "pprev",
    PToA = 0x31 => "pToa",
    AToP = 0x32 => "aTop",
    PToS = 0x33 => "pTos",
    SToP = 0x34 => "sTop",
    IpToA = 0x35 => "ipToa",
    DpToA = 0x36 => "dpToa",
    IpToS = 0x37 => "ipTos",
    DpToS = 0x38 => "dpTos",
    Lofsa = 0x39 => "lofsa",
    Lofss = 0x3a => "lofss",
    Push0 = 0x3b => "push0",
    Push1 = 0x3c => "push1",
    Push2 = 0x3d => "push2",
    PushSelf = 0x3e => "pushSelf",
    Lag = 0x40 => "lag",
    Lal = 0x41 => "lal",
    Lat = 0x42 => "lat",
    Lap = 0x43 => "lap",
    Lsg = 0x44 => "lsg",
    Lsl = 0x45 => "lsl",
    Lst = 0x46 => "lst",
    Lsp = 0x47 => "lsp",
    Lagi = 0x48 => "lagi",
    Lali = 0x49 => "lali",
    Lati = 0x4a => "lati",
    Lapi = 0x4b => "lapi",
    Lsgi = 0x4c => "lsgi",
    Lsli = 0x4d => "lsli",
    Lsti = 0x4e => "lsti",
    Lspi = 0x4f => "lspi",
    Sag = 0x50 => "sag",
    Sal = 0x51 => "sal",
    Sat = 0x52 => "sat",
    Sap = 0x53 => "sap",
    Ssg = 0x54 => "ssg",
    Ssl = 0x55 => "ssl",
    Sst = 0x56 => "sst",
    Ssp = 0x57 => "ssp",
    Sagi = 0x58 => "sagi",
    Sali = 0x59 => "sali",
    Sati = 0x5a => "sati",
    Sapi = 0x5b => "sapi",
    Ssgi = 0x5c => "ssgi",
    Ssli = 0x5d => "ssli",
    Ssti = 0x5e => "ssti",
    Sspi = 0x5f => "sspi",
    PlusAg = 0x60 => "+ag",
    PlusAl = 0x61 => "+al",
    PlusAt = 0x62 => "+at",
    PlusAp = 0x63 => "+ap",
    PlusSg = 0x64 => "+sg",
    PlusSl = 0x65 => "+sl",
    PlusSt = 0x66 => "+st",
    PlusSp = 0x67 => "+sp",
    PlusAgi = 0x68 => "+agi",
    PlusAli = 0x69 => "+ali",
    PlusAti = 0x6a => "+ati",
    PlusApi = 0x6b => "+api",
    PlusSgi = 0x6c => "+sgi",
    PlusSli = 0x6d => "+sli",
    PlusSti = 0x6e => "+sti",
    PlusSpi = 0x6f => "+spi",
    MinusAg = 0x70 => "-ag",
    MinusAl = 0x71 => "-al",
    MinusAt = 0x72 => "-at",
    MinusAp = 0x73 => "-ap",
    MinusSg = 0x74 => "-sg",
    MinusSl = 0x75 => "-sl",
    MinusSt = 0x76 => "-st",
    MinusSp = 0x77 => "-sp",
    MinusAgi = 0x78 => "-agi",
    MinusAli = 0x79 => "-ali",
    MinusAti = 0x7a => "-ati",
    MinusApi = 0x7b => "-api",
    MinusSgi = 0x7c => "-sgi",
    MinusSli = 0x7d => "-sli",
    MinusSti = 0x7e => "-sti",
    MinusSpi = 0x7f => "-spi",
}

impl Opcode {
    /// Every opcode that exists in `version`'s table, in raw order.
    pub fn all(version: Version) -> impl Iterator<Item = Opcode> {
        let pseudo: &'static [Opcode] = if version.has_debug_opcodes() {
            &[Opcode::Filename, Opcode::LineNumber]
        } else {
            &[]
        };
        Self::GENERAL.iter().chain(pseudo).copied()
    }

    pub fn flags(self) -> OpcodeFlags {
        match self {
            Opcode::Bt | Opcode::Bnt => OpcodeFlags::JUMP | OpcodeFlags::CONDITIONAL,
            Opcode::Jmp => OpcodeFlags::JUMP,
            Opcode::Ret => OpcodeFlags::RETURN,
            Opcode::Call | Opcode::Callk | Opcode::Callb | Opcode::Calle => OpcodeFlags::CALL,
            Opcode::Send | Opcode::SelfSend | Opcode::Super => OpcodeFlags::SEND,
            Opcode::Filename | Opcode::LineNumber => OpcodeFlags::PSEUDO,
            _ => OpcodeFlags::empty(),
        }
    }

    #[inline]
    pub fn is_branch(self) -> bool {
        self.flags().contains(OpcodeFlags::JUMP)
    }

    #[inline]
    pub fn is_conditional(self) -> bool {
        self.flags().contains(OpcodeFlags::CONDITIONAL)
    }

    #[inline]
    pub fn is_indeterminate(self) -> bool {
        self == Opcode::Indeterminate
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Map a raw opcode byte to its opcode under `version`'s table.
///
/// Unknown bytes yield [`Opcode::Indeterminate`].
pub fn decode_opcode(version: Version, raw: u8) -> Opcode {
    if version.has_debug_opcodes() {
        match raw {
            FILENAME_RAW => return Opcode::Filename,
            LINE_NUMBER_RAW => return Opcode::LineNumber,
            _ => {}
        }
    }
    Opcode::from_code(raw >> 1)
}

/// Raw byte for `opcode` under `version`'s table.
///
/// `wide` selects 16-bit operands for the width-flagged operand kinds. Returns
/// `None` when the opcode does not exist in the table.
pub fn encode_opcode(version: Version, opcode: Opcode, wide: bool) -> Option<u8> {
    match opcode {
        Opcode::Filename => version.has_debug_opcodes().then_some(FILENAME_RAW),
        Opcode::LineNumber => version.has_debug_opcodes().then_some(LINE_NUMBER_RAW),
        Opcode::Indeterminate => None,
        op => {
            let base = op.code()? << 1;
            let raw = base | u8::from(!wide);
            // The byte form of pushSelf is taken by `_file_`; pushSelf has no
            // operands, so its word form is equivalent.
            if version.has_debug_opcodes() && raw == FILENAME_RAW {
                Some(base)
            } else {
                Some(raw)
            }
        }
    }
}

/// Display mnemonic, accounting for `lea`'s accumulator-indexed form.
pub fn name_for_opcode(opcode: Opcode, first_operand: u16) -> &'static str {
    if opcode == Opcode::Lea && first_operand & LEA_ACC_INDEX != 0 {
        "leai"
    } else {
        opcode.mnemonic()
    }
}

/// Reverse of [`name_for_opcode`].
///
/// The flag is `true` when `name` is the alternate-addressing mnemonic.
/// Unknown names return `(Opcode::Indeterminate, false)`.
pub fn opcode_for_name(name: &str) -> (Opcode, bool) {
    if name == "leai" {
        return (Opcode::Lea, true);
    }
    let found = Opcode::GENERAL
        .iter()
        .chain(&[Opcode::Filename, Opcode::LineNumber])
        .copied()
        .find(|op| op.mnemonic() == name);
    (found.unwrap_or(Opcode::Indeterminate), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_codes_are_indeterminate() {
        for raw in [0x4c, 0x4d, 0x4e, 0x4f, 0x52, 0x53, 0x5e, 0x5f] {
            assert_eq!(decode_opcode(Version::Sci0, raw), Opcode::Indeterminate);
        }
    }

    #[test]
    fn pseudo_bytes_depend_on_table() {
        assert_eq!(decode_opcode(Version::Sci0, FILENAME_RAW), Opcode::PushSelf);
        assert_eq!(decode_opcode(Version::Sci2, FILENAME_RAW), Opcode::Filename);
        assert_eq!(decode_opcode(Version::Sci0, LINE_NUMBER_RAW), Opcode::Indeterminate);
        assert_eq!(decode_opcode(Version::Sci2, LINE_NUMBER_RAW), Opcode::LineNumber);
        assert_eq!(decode_opcode(Version::Sci2, 0x7f), Opcode::Indeterminate);
    }
}
