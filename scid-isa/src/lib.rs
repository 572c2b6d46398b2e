//! Opcode tables and operand model for SCI script bytecode.
//!
//! This crate maps raw opcode bytes to symbolic opcodes for each package
//! format version, describes every opcode's operand list, and provides a
//! single-instruction decoder plus a label-resolving assembler.

// Re-exported for users of `OpcodeFlags`.
pub use bitflags;

mod decoder;
mod emitter;
mod opcode;
mod operand;
mod version;

pub use decoder::{DecodeError, Decoded, decode_at};
pub use emitter::{Arg, Assembled, Assembler, EncodeError, Label};
pub use opcode::{
    FILENAME_RAW, LEA_ACC_INDEX, LINE_NUMBER_RAW, Opcode, OpcodeFlags, decode_opcode,
    encode_opcode, name_for_opcode, opcode_for_name,
};
pub use operand::{Operand, OperandKind, OperandType, Width, operand_types};
pub use version::{UnknownVersion, Version};
