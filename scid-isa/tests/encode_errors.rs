use scid_isa::*;

#[test]
fn unknown_opcode_in_table() {
    let mut asm = Assembler::new(Version::Sci0);
    asm.emit(Opcode::LineNumber, [Arg::Imm(1)]);
    assert!(matches!(
        asm.finish(),
        Err(EncodeError::UnknownOpcode(Opcode::LineNumber, Version::Sci0))
    ));
}

#[test]
fn operand_count_mismatch() {
    let mut asm = Assembler::new(Version::Sci0);
    asm.emit(Opcode::Ldi, []);
    assert!(matches!(
        asm.finish(),
        Err(EncodeError::OperandCount {
            opcode: Opcode::Ldi,
            expected: 1,
            found: 0
        })
    ));
}

#[test]
fn operand_shape_mismatch() {
    let mut asm = Assembler::new(Version::Sci0);
    asm.emit(Opcode::Ldi, [Arg::Text("x".into())]);
    assert!(matches!(
        asm.finish(),
        Err(EncodeError::OperandMismatch {
            opcode: Opcode::Ldi,
            index: 0
        })
    ));
}

#[test]
fn immediate_out_of_range() {
    let mut asm = Assembler::new(Version::Sci0);
    asm.emit_narrow(Opcode::Ldi, [Arg::Imm(300)]);
    assert!(matches!(
        asm.finish(),
        Err(EncodeError::OperandRange {
            value: 300,
            bytes: 1,
            ..
        })
    ));

    let mut asm = Assembler::new(Version::Sci0);
    asm.emit(Opcode::Ldi, [Arg::Imm(70000)]);
    assert!(matches!(asm.finish(), Err(EncodeError::OperandRange { bytes: 2, .. })));
}

#[test]
fn narrow_branch_out_of_range() {
    let mut asm = Assembler::new(Version::Sci0);
    let far = asm.new_label();
    asm.emit_narrow(Opcode::Bnt, [far.into()]);
    for _ in 0..100 {
        asm.emit(Opcode::Ldi, [Arg::Imm(0)]);
    }
    asm.bind(far);
    asm.emit_narrow(Opcode::Ret, []);
    assert!(matches!(
        asm.finish(),
        Err(EncodeError::OperandRange {
            opcode: Opcode::Bnt,
            value: 300,
            bytes: 1
        })
    ));
}

#[test]
fn wide_branch_reaches_far_label() {
    let mut asm = Assembler::new(Version::Sci0);
    let far = asm.new_label();
    asm.emit(Opcode::Bnt, [far.into()]);
    for _ in 0..100 {
        asm.emit(Opcode::Ldi, [Arg::Imm(0)]);
    }
    asm.bind(far);
    asm.emit_narrow(Opcode::Ret, []);
    let out = asm.finish().unwrap();
    let d = decode_at(Version::Sci0, &out.bytes, 0).unwrap();
    assert_eq!(d.operands[0].value(), Some(300));
    assert_eq!(out.labels[0], 303);
}

#[test]
fn unbound_label() {
    let mut asm = Assembler::new(Version::Sci0);
    let l = asm.new_label();
    asm.emit(Opcode::Jmp, [l.into()]);
    assert!(matches!(asm.finish(), Err(EncodeError::UnboundLabel(0))));
}

#[test]
fn foreign_label() {
    let mut asm = Assembler::new(Version::Sci0);
    asm.emit(Opcode::Jmp, [Arg::Label(Label(7))]);
    assert!(matches!(asm.finish(), Err(EncodeError::LabelOutOfRange(7))));
}
