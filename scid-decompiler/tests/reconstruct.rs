mod common;

use std::collections::BTreeMap;

use common::*;
use scid_decompiler::{
    CompanionSymbols, CompiledUnit, DecompilerConfig, Error, NoSymbols, ObjectRecord, SymbolStore,
    reconstruct,
};
use scid_ir::script::{BodyStatus, CallKind, ClassProperty, PropertyValue, Script};
use scid_isa::{Arg, Opcode};

struct Fixture {
    unit: CompiledUnit,
    helper: u32,
}

/// A class `Door` with a `doit` method calling a local helper, an exported
/// instance `frontDoor`, and one public procedure calling other units.
fn fixture() -> Fixture {
    let out = assemble(|asm| {
        let doit = asm.new_label();
        let helper = asm.new_label();
        let public = asm.new_label();
        let init = asm.new_label();
        // Keeps real entry points off offset zero.
        asm.emit_narrow(Opcode::Ret, []);
        asm.bind(doit);
        asm.emit_narrow(Opcode::Pushi, [Arg::Imm(1)]);
        asm.emit_narrow(Opcode::Call, [helper.into(), Arg::Imm(0)]);
        asm.emit_narrow(Opcode::Ret, []);
        asm.bind(helper);
        asm.emit_narrow(Opcode::Ldi, [Arg::Imm(2)]);
        asm.emit_narrow(Opcode::Ret, []);
        asm.bind(public);
        asm.emit_narrow(Opcode::Calle, [Arg::Imm(77), Arg::Imm(3), Arg::Imm(0)]);
        asm.emit_narrow(Opcode::Callb, [Arg::Imm(2), Arg::Imm(0)]);
        asm.emit_narrow(Opcode::Ret, []);
        asm.bind(init);
        asm.emit_narrow(Opcode::Ret, []);
    });
    let [doit, helper, public, init] = [0, 1, 2, 3].map(|i| out.labels[i]);

    let door = ObjectRecord {
        offset: 0x100,
        species: 11,
        superclass: Some(10),
        is_class: true,
        properties: vec![(0, 0x1234), (3, 0x210), (1, 1), (2, 3)],
        methods: vec![(5, doit as u16)],
    };
    let front_door = ObjectRecord {
        offset: 0x120,
        species: 11,
        superclass: Some(11),
        is_class: false,
        properties: vec![(3, 0x200), (1, 1), (6, 65535), (7, 0x100), (9, 0x220)],
        methods: vec![(8, init as u16)],
    };
    let unit = CompiledUnit {
        number: UNIT,
        code: out.bytes,
        exports: vec![0x120, public as u16, 0],
        objects: vec![door, front_door],
        locals: vec![3, 65535],
        synonyms: vec![(40, 41)],
    };
    Fixture { unit, helper }
}

fn run(unit: &CompiledUnit, symbols: &dyn CompanionSymbols) -> Script {
    reconstruct(unit, &lookup(), symbols, &DecompilerConfig::default()).unwrap()
}

#[test]
fn class_lists_only_overridden_properties() {
    let script = run(&fixture().unit, &NoSymbols);
    let door = script.class("Door").unwrap();
    assert_eq!(door.superclass.as_deref(), Some("Prop"));
    assert!(!door.instance);
    assert_eq!(door.properties, [ClassProperty {
        name: "bar".into(),
        value: PropertyValue::Number(3),
    }]);
    assert!(script.uses.contains(&999));
}

#[test]
fn instance_without_defaults_lists_every_property() {
    let script = run(&fixture().unit, &NoSymbols);
    let front = script.class("frontDoor").unwrap();
    assert!(front.instance);
    assert!(front.public);
    assert_eq!(front.superclass.as_deref(), Some("Door"));
    let props: Vec<(&str, &PropertyValue)> = front
        .properties
        .iter()
        .map(|p| (p.name.as_str(), &p.value))
        .collect();
    assert_eq!(props, [
        ("foo", &PropertyValue::Number(1)),
        ("x", &PropertyValue::Number(-1)),
        ("target", &PropertyValue::Symbol("Door".into())),
        ("description", &PropertyValue::String("A sturdy oak door.".into())),
    ]);
    assert_eq!(front.methods[0].name, "init");
    assert_eq!(front.methods[0].class, "frontDoor");
}

#[test]
fn unresolved_placeholder_is_kept_verbatim() {
    let script = run(&fixture().unit, &NoSymbols);
    let public = script.procedure("proc5_1").unwrap();
    assert!(public.public);
    let calls: Vec<(CallKind, &str)> = public
        .body
        .calls
        .iter()
        .map(|c| (c.kind, c.name.as_str()))
        .collect();
    assert_eq!(calls, [
        (CallKind::External, "proc77_3"),
        (CallKind::Base, "proc0_2"),
    ]);
    assert!(script.uses.contains(&77));
    assert!(script.uses.contains(&0));
    assert!(!script.uses.contains(&UNIT));
}

#[test]
fn companion_symbols_name_calls_and_receive_proposals() {
    let store = SymbolStore::from(BTreeMap::from([(
        77,
        BTreeMap::from([(3, "openDoor".to_string())]),
    )]));
    let script = run(&fixture().unit, &store);

    let public = script.procedure("proc5_1").unwrap();
    assert_eq!(public.body.calls[0].name, "openDoor");
    assert_eq!(store.export_name(UNIT, 1).as_deref(), Some("proc5_1"));
    assert_eq!(store.version(UNIT), Some(1));
    assert_eq!(store.version(77), Some(0));
}

#[test]
fn local_call_targets_become_internal_procedures() {
    let Fixture { unit, helper } = fixture();
    let script = run(&unit, &NoSymbols);

    let name = format!("localproc_{helper:04x}");
    let proc = script.procedure(&name).unwrap();
    assert!(!proc.public);
    assert_eq!(proc.class.as_deref(), Some("Door"));
    assert!(proc.body.is_structured());

    let doit = &script.class("Door").unwrap().methods[0];
    assert_eq!(doit.name, "doit");
    assert_eq!(doit.body.calls[0].kind, CallKind::Local);
    assert_eq!(doit.body.calls[0].name, name);

    let names: Vec<&str> = script.procedures.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["proc5_1", name.as_str()]);
}

#[test]
fn discovery_can_be_disabled() {
    let Fixture { unit, helper } = fixture();
    let config = DecompilerConfig {
        discover_internal_procedures: false,
        ..DecompilerConfig::default()
    };
    let script = reconstruct(&unit, &lookup(), &NoSymbols, &config).unwrap();
    assert_eq!(script.procedures.len(), 1);
    let doit = &script.class("Door").unwrap().methods[0];
    assert_eq!(doit.body.calls[0].name, format!("localproc_{helper:04x}"));
}

#[test]
fn truncated_method_leaves_siblings_intact() {
    let mut unit = fixture().unit;
    let broken = unit.code.len() as u16;
    // ldi.w missing its second operand byte
    unit.code.extend_from_slice(&[0x34, 0x01]);
    unit.objects[0].methods.push((8, broken));

    let script = run(&unit, &NoSymbols);
    let door = script.class("Door").unwrap();
    assert!(door.methods[0].body.is_structured());
    assert!(matches!(
        door.methods[1].body.status,
        BodyStatus::Undecodable { .. }
    ));
    assert!(door.methods[1].body.root.is_none());
}

#[test]
fn broken_branch_aborts_the_unit() {
    let unit = CompiledUnit {
        number: UNIT,
        // ret; bnt.b +1 (into the ldi.w below); ldi.w 0; ret
        code: vec![0x49, 0x31, 0x01, 0x34, 0x00, 0x00, 0x49],
        exports: vec![1],
        ..CompiledUnit::default()
    };
    let err = reconstruct(&unit, &lookup(), &NoSymbols, &DecompilerConfig::default()).unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
}

#[test]
fn sequential_and_parallel_runs_agree() {
    let unit = fixture().unit;
    let sequential = DecompilerConfig {
        parallel: false,
        ..DecompilerConfig::default()
    };
    let a = reconstruct(&unit, &lookup(), &NoSymbols, &sequential).unwrap();
    let b = run(&unit, &NoSymbols);
    assert_eq!(a, b);
}

#[test]
fn script_variables_and_synonyms() {
    let script = run(&fixture().unit, &NoSymbols);
    let values: Vec<i32> = script.globals.iter().map(|g| g.value).collect();
    assert_eq!(values, [3, -1]);
    assert_eq!(script.synonyms[0].word, "look");
    assert_eq!(script.synonyms[0].replacement, "examine");
}

#[test]
fn script_survives_yaml() {
    let script = run(&fixture().unit, &NoSymbols);
    let text = serde_yaml::to_string(&script).unwrap();
    let back: Script = serde_yaml::from_str(&text).unwrap();
    assert_eq!(back, script);
}
