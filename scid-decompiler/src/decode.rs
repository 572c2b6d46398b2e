use std::collections::BTreeSet;

use scid_ir::cfg::CfgError;
use scid_ir::instruction::Instruction;
use scid_isa::{DecodeError, Opcode, OpcodeFlags, Operand, OperandKind, Version, decode_at};

use crate::error::{Error, Result};

/// Decode the function starting at `entry` in `code`.
///
/// Decoding runs straight through the bytes and stops at the first `ret` or
/// `jmp` past which no branch seen so far still points, or at the end of the
/// buffer. Branch and local call targets are resolved to absolute addresses.
///
/// Undecodable bytes are a [`Error::MalformedEncoding`] for this function
/// only; a branch into the middle of an instruction or outside the decoded
/// range is an [`Error::InvariantViolation`].
pub fn decode_function(version: Version, code: &[u8], entry: u32) -> Result<Vec<Instruction>> {
    if entry as usize >= code.len() {
        return Err(Error::MalformedEncoding {
            entry,
            source: DecodeError::Truncated(entry as usize),
        });
    }

    let mut instructions = Vec::new();
    let mut offset = entry as usize;
    // Furthest forward branch target seen so far.
    let mut horizon = entry;

    while offset < code.len() {
        let decoded =
            decode_at(version, code, offset).map_err(|source| Error::MalformedEncoding {
                entry,
                source,
            })?;
        let address = offset as u32;
        let next = address + decoded.size as u32;
        let flags = decoded.opcode.flags();
        let target = resolve_target(decoded.opcode, &decoded.operands, next, code.len());

        if flags.contains(OpcodeFlags::JUMP) {
            if let Some(t) = target {
                horizon = horizon.max(t);
            }
        }

        instructions.push(Instruction {
            address,
            opcode: decoded.opcode,
            operands: decoded.operands,
            size: decoded.size as u32,
            target,
        });
        offset = next as usize;

        let ends = flags.contains(OpcodeFlags::RETURN)
            || (flags.contains(OpcodeFlags::JUMP) && !flags.contains(OpcodeFlags::CONDITIONAL));
        if ends && horizon < next {
            break;
        }
    }

    let starts: BTreeSet<u32> = instructions.iter().map(|i| i.address).collect();
    for insn in instructions.iter().filter(|i| i.opcode.is_branch()) {
        match insn.target {
            Some(t) if starts.contains(&t) => {}
            t => {
                return Err(CfgError::UnknownTarget {
                    from: insn.address,
                    target: t.unwrap_or(u32::MAX),
                }
                .into());
            }
        }
    }

    log::trace!(
        "decoded {} instructions from {entry:#06x}",
        instructions.len()
    );
    Ok(instructions)
}

/// Absolute target of a branch or local call: the next instruction's
/// address plus the signed displacement. `None` when it falls outside
/// `0..len`.
fn resolve_target(opcode: Opcode, operands: &[Operand], next: u32, len: usize) -> Option<u32> {
    if !opcode.is_branch() && opcode != Opcode::Call {
        return None;
    }
    let disp = operands
        .iter()
        .find(|op| op.kind() == OperandKind::Label)?
        .value()?;
    let target = next as i64 + disp as i64;
    (0..len as i64).contains(&target).then_some(target as u32)
}
