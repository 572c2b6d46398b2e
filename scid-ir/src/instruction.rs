use scid_isa::{Opcode, OpcodeFlags, Operand, name_for_opcode};
use serde::{Deserialize, Serialize};

/// A single decoded bytecode instruction with resolved operands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Byte offset within the unit's code buffer.
    pub address: u32,
    /// The opcode.
    pub opcode: Opcode,
    /// Decoded operands.
    pub operands: Vec<Operand>,
    /// Total instruction size in bytes.
    pub size: u32,
    /// Absolute target of a branch or local call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,
}

impl Instruction {
    pub fn next_address(&self) -> u32 {
        self.address + self.size
    }

    pub fn flags(&self) -> OpcodeFlags {
        self.opcode.flags()
    }

    /// Whether this instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        self.flags()
            .intersects(OpcodeFlags::JUMP | OpcodeFlags::RETURN)
    }

    /// Display mnemonic, `leai` included.
    pub fn mnemonic(&self) -> &'static str {
        let first = self
            .operands
            .first()
            .and_then(Operand::raw_u16)
            .unwrap_or(0);
        name_for_opcode(self.opcode, first)
    }
}
