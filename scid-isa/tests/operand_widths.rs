mod common;

use common::decode_all;
use scid_isa::*;

fn size_of(version: Version, op: Opcode, wide: bool, args: Vec<Arg>) -> usize {
    let mut asm = Assembler::new(version);
    if wide {
        asm.emit(op, args);
    } else {
        asm.emit_narrow(op, args);
    }
    asm.finish().unwrap().bytes.len()
}

#[test]
fn flag_width_follows_low_bit() {
    for version in Version::ALL {
        assert_eq!(size_of(version, Opcode::Ldi, false, vec![Arg::Imm(1)]), 2);
        assert_eq!(size_of(version, Opcode::Ldi, true, vec![Arg::Imm(1)]), 3);
        assert_eq!(size_of(version, Opcode::Lag, false, vec![Arg::Imm(1)]), 2);
        assert_eq!(size_of(version, Opcode::Lag, true, vec![Arg::Imm(1)]), 3);
    }
}

#[test]
fn frame_size_width_depends_on_table() {
    let args = || vec![Arg::Imm(21), Arg::Imm(4)];
    assert_eq!(size_of(Version::Sci0, Opcode::Callk, false, args()), 3);
    assert_eq!(size_of(Version::Sci2, Opcode::Callk, false, args()), 4);
    assert_eq!(size_of(Version::Sci0, Opcode::Send, true, vec![Arg::Imm(4)]), 2);
    assert_eq!(size_of(Version::Sci2, Opcode::Send, true, vec![Arg::Imm(4)]), 3);
}

#[test]
fn lofs_offsets_depend_on_table() {
    let sci0 = operand_types(Version::Sci0, Opcode::Lofsa);
    assert_eq!(sci0[0].kind, OperandKind::RelativeOffset);
    assert_eq!(sci0[0].width, Width::Flag);

    let sci2 = operand_types(Version::Sci2, Opcode::Lofss);
    assert_eq!(sci2[0].kind, OperandKind::AbsoluteOffset);
    assert_eq!(sci2[0].width, Width::Word);
    assert_eq!(size_of(Version::Sci2, Opcode::Lofsa, false, vec![Arg::Imm(0x120)]), 3);

    for version in Version::ALL {
        let absolute = operand_types(version, Opcode::Lofsa)[0].kind == OperandKind::AbsoluteOffset;
        assert_eq!(absolute, version.absolute_offsets());
    }
}

#[test]
fn signed_kinds_sign_extend() {
    // ldi.b 0xff, pushi.w 0xffff, link.b 0xff
    let bytes = [0x35, 0xff, 0x38, 0xff, 0xff, 0x3f, 0xff];
    let decoded = decode_all(Version::Sci0, &bytes);
    assert_eq!(decoded[0].operands[0].value(), Some(-1));
    assert_eq!(decoded[1].operands[0].value(), Some(-1));
    assert_eq!(decoded[2].operands[0].value(), Some(255));
}

#[test]
fn branch_displacement_is_relative_to_next_instruction() {
    let mut asm = Assembler::new(Version::Sci0);
    let top = asm.new_label();
    asm.bind(top);
    asm.emit_narrow(Opcode::Push0, []);
    asm.emit_narrow(Opcode::Bt, [top.into()]);
    let out = asm.finish().unwrap();
    // push0 (1) + bt.b (2); displacement = 0 - 3
    assert_eq!(out.bytes, vec![0x77, 0x2f, 0xfd]);
}

#[test]
fn origin_shifts_offsets_and_labels() {
    let mut asm = Assembler::with_origin(Version::Sci0, 0x100);
    let end = asm.new_label();
    asm.emit(Opcode::Jmp, [end.into()]);
    asm.emit_narrow(Opcode::Ldi, [Arg::Imm(5)]);
    asm.bind(end);
    asm.emit_narrow(Opcode::Ret, []);
    let out = asm.finish().unwrap();
    assert_eq!(out.offsets, vec![0x100, 0x103, 0x105]);
    assert_eq!(out.labels, vec![0x105]);
    assert_eq!(&out.bytes[1..3], &[2, 0]);
}

#[test]
fn lea_alternate_mnemonic() {
    assert_eq!(name_for_opcode(Opcode::Lea, 0x02), "lea");
    assert_eq!(name_for_opcode(Opcode::Lea, 0x12), "leai");
    assert_eq!(name_for_opcode(Opcode::Ldi, 0x10), "ldi");
    assert_eq!(opcode_for_name("leai"), (Opcode::Lea, true));
    assert_eq!(opcode_for_name("lea"), (Opcode::Lea, false));
    assert_eq!(opcode_for_name("eq?"), (Opcode::Eq, false));
    assert_eq!(opcode_for_name("_line_"), (Opcode::LineNumber, false));
    assert_eq!(opcode_for_name("frobnicate"), (Opcode::Indeterminate, false));
}

#[test]
fn flags_classify_control_flow() {
    assert!(Opcode::Bnt.is_branch() && Opcode::Bnt.is_conditional());
    assert!(Opcode::Jmp.is_branch() && !Opcode::Jmp.is_conditional());
    assert!(Opcode::Ret.flags().contains(OpcodeFlags::RETURN));
    assert!(Opcode::Calle.flags().contains(OpcodeFlags::CALL));
    assert!(Opcode::Filename.flags().contains(OpcodeFlags::PSEUDO));
    assert!(Opcode::Add.flags().is_empty());
}
