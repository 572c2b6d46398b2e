//! Reassembling a compiled unit into classes and procedures.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use scid_ir::cfg::Cfg;
use scid_ir::instruction::Instruction;
use scid_ir::script::{
    BodyStatus, CallKind, CallSite, ClassDefinition, ClassProperty, FunctionBody,
    MethodDefinition, ProcedureDefinition, PropertyValue, Script, ScriptVariable, Synonym,
};
use scid_isa::{Opcode, OperandKind, Version};

use crate::config::DecompilerConfig;
use crate::decode::decode_function;
use crate::error::{Error, Result};
use crate::lookup::ScriptLookup;
use crate::structuring::structure;
use crate::symbols::{CompanionSymbols, placeholder, resolve_placeholder};
use crate::unit::{CompiledUnit, ObjectRecord};

/// A call instruction before names are assigned.
#[derive(Debug, Clone, Copy)]
struct PendingCall {
    address: u32,
    kind: CallKind,
    target: CallTarget,
}

#[derive(Debug, Clone, Copy)]
enum CallTarget {
    Local(u32),
    Export { script: u16, index: u16 },
}

struct Compiled {
    body: FunctionBody,
    calls: Vec<PendingCall>,
}

/// Decompile the function at `entry` on its own.
///
/// Call sites are named with placeholders: `localproc_<addr>` for local
/// calls and `proc<unit>_<index>` for calls into other units.
pub fn decompile_function(version: Version, code: &[u8], entry: u32) -> Result<FunctionBody> {
    let Compiled { mut body, calls } = compile(version, code, entry)?;
    body.calls = calls
        .iter()
        .map(|call| CallSite {
            address: call.address,
            kind: call.kind,
            name: match call.target {
                CallTarget::Local(t) => local_name(t),
                CallTarget::Export { script, index } => placeholder(script, index),
            },
        })
        .collect();
    Ok(body)
}

fn compile(version: Version, code: &[u8], entry: u32) -> Result<Compiled> {
    let instructions = match decode_function(version, code, entry) {
        Ok(insns) => insns,
        Err(Error::MalformedEncoding { entry, source }) => {
            log::warn!("function at {entry:#06x} is undecodable: {source}");
            return Ok(Compiled {
                body: FunctionBody::undecodable(entry, source.to_string()),
                calls: Vec::new(),
            });
        }
        Err(e) => return Err(e),
    };
    let calls = pending_calls(&instructions);
    let cfg = Cfg::build(instructions)?;
    let (root, structured) = structure(cfg)?;
    let status = if structured {
        BodyStatus::Structured
    } else {
        log::warn!("function at {entry:#06x} is only partly structured");
        BodyStatus::Degraded
    };
    Ok(Compiled {
        body: FunctionBody {
            address: entry,
            status,
            root: Some(root),
            calls: Vec::new(),
        },
        calls,
    })
}

fn pending_calls(instructions: &[Instruction]) -> Vec<PendingCall> {
    let operand = |insn: &Instruction, kind: OperandKind| {
        insn.operands
            .iter()
            .find(|op| op.kind() == kind)
            .and_then(|op| op.raw_u16())
    };
    instructions
        .iter()
        .filter_map(|insn| {
            let (kind, target) = match insn.opcode {
                Opcode::Call => (CallKind::Local, CallTarget::Local(insn.target?)),
                Opcode::Callb => (CallKind::Base, CallTarget::Export {
                    script: 0,
                    index: operand(insn, OperandKind::Export)?,
                }),
                Opcode::Calle => (CallKind::External, CallTarget::Export {
                    script: operand(insn, OperandKind::Script)?,
                    index: operand(insn, OperandKind::Export)?,
                }),
                _ => return None,
            };
            Some(PendingCall {
                address: insn.address,
                kind,
                target,
            })
        })
        .collect()
}

fn local_name(address: u32) -> String {
    format!("localproc_{address:04x}")
}

/// Who a decompiled entry point belongs to.
#[derive(Debug, Clone)]
enum Owner {
    Method { object: usize },
    Public { index: u16, name: String },
    Internal,
}

/// Rebuild the object model of `unit`.
///
/// Function bodies that fail to decode are kept as undecodable; broken
/// control flow anywhere in the unit aborts with
/// [`Error::InvariantViolation`].
pub fn reconstruct(
    unit: &CompiledUnit,
    lookup: &dyn ScriptLookup,
    symbols: &dyn CompanionSymbols,
    config: &DecompilerConfig,
) -> Result<Script> {
    let mut script = Script {
        number: unit.number,
        ..Script::default()
    };

    let names: Vec<String> = unit
        .objects
        .iter()
        .map(|obj| object_name(unit.number, lookup, obj))
        .collect();
    let by_offset: BTreeMap<u16, usize> = unit
        .objects
        .iter()
        .enumerate()
        .map(|(i, obj)| (obj.offset, i))
        .collect();

    // Entry points, in first-seen order per address.
    let mut owners: BTreeMap<u32, Vec<Owner>> = BTreeMap::new();
    for (object, obj) in unit.objects.iter().enumerate() {
        for &(_, offset) in &obj.methods {
            owners
                .entry(offset as u32)
                .or_default()
                .push(Owner::Method { object });
        }
    }
    for (index, &offset) in unit.exports.iter().enumerate() {
        let index = index as u16;
        // Zero marks an empty slot.
        if offset == 0 || by_offset.contains_key(&offset) || owners.contains_key(&(offset as u32)) {
            continue;
        }
        let name = symbols
            .export_name(unit.number, index)
            .unwrap_or_else(|| placeholder(unit.number, index));
        if config.propose_bindings && symbols.propose_export_name(unit.number, index, &name) {
            log::debug!("bound export {index} of unit {} to {name}", unit.number);
        }
        owners
            .entry(offset as u32)
            .or_default()
            .push(Owner::Public { index, name });
    }

    let mut compiled: BTreeMap<u32, Compiled> = BTreeMap::new();
    let mut batch: Vec<u32> = owners.keys().copied().collect();
    while !batch.is_empty() {
        let results = compile_all(config, &unit.code, &batch);
        for (entry, result) in batch.iter().zip(results) {
            compiled.insert(*entry, result?);
        }
        if !config.discover_internal_procedures {
            break;
        }
        let found: BTreeSet<u32> = compiled
            .values()
            .flat_map(|c| c.calls.iter())
            .filter_map(|call| match call.target {
                CallTarget::Local(t) if !compiled.contains_key(&t) => Some(t),
                _ => None,
            })
            .collect();
        for &entry in &found {
            log::debug!("discovered internal procedure at {entry:#06x}");
            owners.entry(entry).or_default().push(Owner::Internal);
        }
        batch = found.into_iter().collect();
    }

    // Names for local call targets.
    let mut local_names: BTreeMap<u32, String> = BTreeMap::new();
    for (&entry, list) in &owners {
        let name = list.iter().find_map(|owner| match owner {
            Owner::Public { name, .. } => Some(name.clone()),
            Owner::Internal => Some(local_name(entry)),
            Owner::Method { .. } => None,
        });
        if let Some(name) = name {
            local_names.insert(entry, name);
        }
    }

    // Which objects' methods call each local target.
    let mut callers: BTreeMap<u32, BTreeSet<usize>> = BTreeMap::new();
    for (entry, c) in &compiled {
        let objects: Vec<usize> = owners
            .get(entry)
            .into_iter()
            .flatten()
            .filter_map(|owner| match owner {
                Owner::Method { object, .. } => Some(*object),
                _ => None,
            })
            .collect();
        for call in &c.calls {
            if let CallTarget::Local(t) = call.target {
                let set = callers.entry(t).or_default();
                set.extend(objects.iter().copied());
                if objects.is_empty() {
                    // Called from a procedure: never class-scoped.
                    set.insert(usize::MAX);
                }
            }
        }
    }

    let mut bodies: BTreeMap<u32, FunctionBody> = BTreeMap::new();
    for (entry, c) in compiled {
        let mut calls = Vec::with_capacity(c.calls.len());
        for call in &c.calls {
            let name = match call.target {
                CallTarget::Local(t) => local_names.get(&t).cloned().unwrap_or_else(|| local_name(t)),
                CallTarget::Export { script: other, index } => {
                    if other != unit.number {
                        script.uses.insert(other);
                    }
                    let name = placeholder(other, index);
                    if config.resolve_placeholders {
                        resolve_placeholder(&name, symbols)
                    } else {
                        name
                    }
                }
            };
            calls.push(CallSite {
                address: call.address,
                kind: call.kind,
                name,
            });
        }
        let mut body = c.body;
        body.calls = calls;
        bodies.insert(entry, body);
    }
    let body_at = |entry: u32| {
        bodies
            .get(&entry)
            .cloned()
            .unwrap_or_else(|| FunctionBody::undecodable(entry, "not decoded"))
    };

    for (i, obj) in unit.objects.iter().enumerate() {
        let superclass = obj.superclass.map(|s| match lookup.species(s) {
            Some(info) => {
                if info.script != unit.number {
                    script.uses.insert(info.script);
                }
                info.name
            }
            None => {
                log::debug!("unknown species {s} for {}", names[i]);
                format!("species_{s}")
            }
        });
        let methods = obj
            .methods
            .iter()
            .map(|&(selector, offset)| MethodDefinition {
                name: selector_name(lookup, selector),
                class: names[i].clone(),
                body: body_at(offset as u32),
            })
            .collect();
        script.classes.push(ClassDefinition {
            name: names[i].clone(),
            superclass,
            species: obj.species,
            public: unit.exports.contains(&obj.offset),
            instance: !obj.is_class,
            properties: properties(unit, lookup, obj, &names, &by_offset),
            methods,
        });
    }

    let mut public: Vec<(u16, &String, u32)> = Vec::new();
    let mut internal: Vec<u32> = Vec::new();
    for (&entry, list) in &owners {
        for owner in list {
            match owner {
                Owner::Public { index, name } => public.push((*index, name, entry)),
                Owner::Internal => internal.push(entry),
                Owner::Method { .. } => {}
            }
        }
    }
    public.sort_by_key(|p| p.0);
    for (_, name, entry) in public {
        script.procedures.push(ProcedureDefinition {
            name: name.clone(),
            class: None,
            public: true,
            body: body_at(entry),
        });
    }
    for entry in internal {
        // Helpers used by a single class's methods belong to that class.
        let class = match callers.get(&entry) {
            Some(set) if set.len() == 1 => set.first().and_then(|&o| names.get(o)).cloned(),
            _ => None,
        };
        script.procedures.push(ProcedureDefinition {
            name: local_name(entry),
            class,
            public: false,
            body: body_at(entry),
        });
    }

    script.globals = unit
        .locals
        .iter()
        .enumerate()
        .map(|(index, &value)| ScriptVariable {
            index: index as u16,
            value: value as i16 as i32,
        })
        .collect();
    script.synonyms = unit
        .synonyms
        .iter()
        .map(|&(word, replacement)| Synonym {
            word: word_name(lookup, word),
            replacement: word_name(lookup, replacement),
        })
        .collect();

    log::debug!(
        "unit {}: {} objects, {} procedures, uses {:?}",
        unit.number,
        script.classes.len(),
        script.procedures.len(),
        script.uses
    );
    Ok(script)
}

fn compile_all(config: &DecompilerConfig, code: &[u8], entries: &[u32]) -> Vec<Result<Compiled>> {
    if config.parallel {
        entries
            .par_iter()
            .map(|&entry| compile(config.version, code, entry))
            .collect()
    } else {
        entries
            .iter()
            .map(|&entry| compile(config.version, code, entry))
            .collect()
    }
}

fn object_name(unit: u16, lookup: &dyn ScriptLookup, obj: &ObjectRecord) -> String {
    let from_property = obj.properties.iter().find_map(|&(selector, value)| {
        if lookup.selector_name(selector).as_deref() == Some("name") {
            lookup.string_at(unit, value)
        } else {
            None
        }
    });
    from_property
        .or_else(|| {
            obj.is_class
                .then(|| lookup.species(obj.species).map(|s| s.name))
                .flatten()
        })
        .unwrap_or_else(|| format!("obj_{:04x}", obj.offset))
}

fn selector_name(lookup: &dyn ScriptLookup, selector: u16) -> String {
    lookup.selector_name(selector).unwrap_or_else(|| {
        log::debug!("unknown selector {selector}");
        format!("sel_{selector}")
    })
}

fn word_name(lookup: &dyn ScriptLookup, id: u16) -> String {
    lookup.word(id).unwrap_or_else(|| format!("word_{id}"))
}

/// `-objID-`, `-info-` and friends.
fn is_system_property(name: &str) -> bool {
    name.len() > 2 && name.starts_with('-') && name.ends_with('-')
}

/// Properties whose value differs from the inherited default.
///
/// Defaults come from the superclass species, else from the object's own
/// species; with neither, every property is listed.
fn properties(
    unit: &CompiledUnit,
    lookup: &dyn ScriptLookup,
    obj: &ObjectRecord,
    names: &[String],
    by_offset: &BTreeMap<u16, usize>,
) -> Vec<ClassProperty> {
    let defaults = obj
        .superclass
        .and_then(|s| lookup.species_defaults(s))
        .or_else(|| lookup.species_defaults(obj.species));
    obj.properties
        .iter()
        .filter_map(|&(selector, value)| {
            let name = selector_name(lookup, selector);
            if name == "name" || is_system_property(&name) {
                return None;
            }
            if defaults
                .as_ref()
                .is_some_and(|d| d.contains(&(selector, value)))
            {
                return None;
            }
            let value = match by_offset.get(&value) {
                _ if value == u16::MAX => PropertyValue::Number(-1),
                Some(&other) if unit.objects[other].offset != obj.offset => {
                    PropertyValue::Symbol(names[other].clone())
                }
                _ => match lookup.string_at(unit.number, value) {
                    Some(text) => PropertyValue::String(text),
                    None => PropertyValue::Number(value as i32),
                },
            };
            Some(ClassProperty { name, value })
        })
        .collect()
}
