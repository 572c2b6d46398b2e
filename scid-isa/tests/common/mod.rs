#![allow(dead_code)]

use scid_isa::*;

/// Decode `bytes` front to back.
pub fn decode_all(version: Version, bytes: &[u8]) -> Vec<Decoded> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let d = decode_at(version, bytes, pos).unwrap();
        pos += d.size;
        out.push(d);
    }
    out
}

/// Assemble `program` (`(opcode, wide, args)`) and check that decoding the
/// result gives back the same opcodes and immediates.
pub fn assert_roundtrip(version: Version, program: &[(Opcode, bool, Vec<Arg>)]) {
    let mut asm = Assembler::new(version);
    for (op, wide, args) in program {
        if *wide {
            asm.emit(*op, args.clone());
        } else {
            asm.emit_narrow(*op, args.clone());
        }
    }
    let out = asm.finish().unwrap();
    let decoded = decode_all(version, &out.bytes);
    assert_eq!(decoded.len(), program.len(), "length mismatch");
    for (i, ((op, _, args), d)) in program.iter().zip(&decoded).enumerate() {
        assert_eq!(*op, d.opcode, "opcode mismatch at {i}");
        assert_eq!(out.offsets[i] as usize + d.size, next_offset(&out, i), "size at {i}");
        for (arg, operand) in args.iter().zip(&d.operands) {
            match (arg, operand) {
                (Arg::Imm(v), Operand::Value { value, .. }) => {
                    assert_eq!(*v as u16, *value as u16, "operand mismatch at {i}")
                }
                (Arg::Text(s), Operand::Text { text, .. }) => assert_eq!(s, text),
                (Arg::Label(_), Operand::Value { .. }) => {}
                other => panic!("operand shape mismatch at {i}: {other:?}"),
            }
        }
    }
}

fn next_offset(out: &Assembled, i: usize) -> usize {
    out.offsets
        .get(i + 1)
        .map(|&o| o as usize)
        .unwrap_or(out.bytes.len())
}
