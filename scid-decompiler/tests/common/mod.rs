#![allow(dead_code)]

use std::collections::BTreeMap;

use scid_decompiler::{SpeciesInfo, StaticLookup, decompile_function};
use scid_ir::construct::Construct;
use scid_ir::script::FunctionBody;
use scid_isa::{Assembled, Assembler, Opcode, Version};

pub const UNIT: u16 = 5;

/// Assemble a `Sci0` program.
pub fn assemble(build: impl FnOnce(&mut Assembler)) -> Assembled {
    let mut asm = Assembler::new(Version::Sci0);
    build(&mut asm);
    asm.finish().unwrap()
}

/// Decompile the function at address 0 of `out`.
pub fn decompile(out: &Assembled) -> FunctionBody {
    decompile_function(Version::Sci0, &out.bytes, 0).unwrap()
}

pub fn root(body: &FunctionBody) -> &Construct {
    body.root.as_ref().expect("body has a root")
}

/// Opcodes under `c`, by address.
pub fn opcodes(c: &Construct) -> Vec<Opcode> {
    c.instructions().into_iter().map(|i| i.opcode).collect()
}

/// First operand of the first instruction under `c`.
pub fn first_imm(c: &Construct) -> Option<i32> {
    c.instructions().first()?.operands.first()?.value()
}

/// Children of a top-level sequence (or the construct itself).
pub fn items(c: &Construct) -> Vec<&Construct> {
    match c {
        Construct::Sequence(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Selector and class tables shared by the object tests.
///
/// Species 10 (`Prop`, unit 999) defaults `foo` to 1 and `bar` to 2.
pub fn lookup() -> StaticLookup {
    let selectors = [
        (0, "-objID-"),
        (1, "foo"),
        (2, "bar"),
        (3, "name"),
        (4, "-info-"),
        (5, "doit"),
        (6, "x"),
        (7, "target"),
        (8, "init"),
        (9, "description"),
    ];
    StaticLookup {
        selectors: selectors
            .into_iter()
            .map(|(id, name)| (id, name.to_string()))
            .collect(),
        species: BTreeMap::from([
            (10, SpeciesInfo {
                name: "Prop".into(),
                script: 999,
            }),
            (11, SpeciesInfo {
                name: "Door".into(),
                script: UNIT,
            }),
        ]),
        defaults: BTreeMap::from([(10, vec![(1, 1), (2, 2)])]),
        strings: BTreeMap::from([(
            UNIT,
            BTreeMap::from([
                (0x200, "frontDoor".to_string()),
                (0x210, "Door".to_string()),
                (0x220, "A sturdy oak door.".to_string()),
            ]),
        )]),
        words: BTreeMap::from([(40, "look".to_string()), (41, "examine".to_string())]),
    }
}
