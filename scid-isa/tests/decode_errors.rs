use scid_isa::*;

#[test]
fn decode_empty_is_truncated() {
    assert_eq!(decode_at(Version::Sci0, &[], 0), Err(DecodeError::Truncated(0)));
}

#[test]
fn decode_past_end_is_truncated() {
    assert_eq!(
        decode_at(Version::Sci0, &[0x48], 5),
        Err(DecodeError::Truncated(5))
    );
}

#[test]
fn decode_invalid_opcode() {
    for version in Version::ALL {
        assert_eq!(
            decode_at(version, &[0x4c, 0x00], 0),
            Err(DecodeError::InvalidOpcode {
                offset: 0,
                raw: 0x4c
            })
        );
    }
    // 0x7e is `_line_` only in the later table.
    assert_eq!(
        decode_at(Version::Sci0, &[0x48, 0x7e], 1),
        Err(DecodeError::InvalidOpcode {
            offset: 1,
            raw: 0x7e
        })
    );
}

#[test]
fn decode_truncated_operand() {
    // ldi.w with one operand byte
    assert_eq!(
        decode_at(Version::Sci0, &[0x34, 0x01], 0),
        Err(DecodeError::Truncated(0))
    );
    // calle.b missing its frame size
    assert_eq!(
        decode_at(Version::Sci0, &[0x48, 0x47, 0x01, 0x02], 1),
        Err(DecodeError::Truncated(1))
    );
}

#[test]
fn decode_unterminated_filename() {
    assert_eq!(
        decode_at(Version::Sci2, &[FILENAME_RAW, b'a', b'b'], 0),
        Err(DecodeError::Truncated(0))
    );
}

#[test]
fn decode_reports_size() {
    let d = decode_at(Version::Sci2, &[FILENAME_RAW, b'x', 0, 0x48], 0).unwrap();
    assert_eq!(d.opcode, Opcode::Filename);
    assert_eq!(d.size, 3);
    assert_eq!(
        d.operands,
        vec![Operand::Text {
            kind: OperandKind::File,
            text: "x".into()
        }]
    );
}
