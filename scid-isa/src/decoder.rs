use crate::opcode::{Opcode, decode_opcode};
use crate::operand::{Operand, Width, operand_types};
use crate::version::Version;

/// Errors from [`decode_at`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The raw byte at `offset` has no opcode in the active table.
    #[error("invalid opcode {raw:#04x} at offset {offset:#x}")]
    InvalidOpcode { offset: usize, raw: u8 },
    /// Fewer bytes remain than the opcode's operands declare.
    #[error("truncated instruction at offset {0:#x}")]
    Truncated(usize),
}

/// One instruction decoded from raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoded {
    pub opcode: Opcode,
    /// The raw opcode byte, which also carries the operand width bit.
    pub raw: u8,
    pub operands: Vec<Operand>,
    /// Total encoded size in bytes.
    pub size: usize,
}

/// Decode the instruction starting at `offset` in `code`.
///
/// Operand widths come from `version`'s table; numeric operands are read
/// little-endian and sign-extended when their kind is signed.
pub fn decode_at(version: Version, code: &[u8], offset: usize) -> Result<Decoded, DecodeError> {
    let raw = *code.get(offset).ok_or(DecodeError::Truncated(offset))?;
    let opcode = decode_opcode(version, raw);
    if opcode.is_indeterminate() {
        return Err(DecodeError::InvalidOpcode { offset, raw });
    }

    let mut pos = offset + 1;
    let mut operands = Vec::new();
    for ty in operand_types(version, opcode) {
        if ty.width == Width::CString {
            let rest = code.get(pos..).ok_or(DecodeError::Truncated(offset))?;
            let nul = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or(DecodeError::Truncated(offset))?;
            let text = String::from_utf8_lossy(&rest[..nul]).into_owned();
            operands.push(Operand::Text {
                kind: ty.kind,
                text,
            });
            pos += nul + 1;
            continue;
        }

        let size = ty.size(raw).unwrap_or(2);
        let bytes = code
            .get(pos..pos + size)
            .ok_or(DecodeError::Truncated(offset))?;
        let value = match (size, ty.kind.is_signed()) {
            (1, true) => bytes[0] as i8 as i32,
            (1, false) => bytes[0] as i32,
            (_, true) => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
            (_, false) => u16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        };
        operands.push(Operand::Value {
            kind: ty.kind,
            value,
        });
        pos += size;
    }

    Ok(Decoded {
        opcode,
        raw,
        operands,
        size: pos - offset,
    })
}
