//! Whole-unit object model handed to source emission.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::construct::Construct;

/// One reconstructed script unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub number: u16,
    pub classes: Vec<ClassDefinition>,
    pub procedures: Vec<ProcedureDefinition>,
    /// Script-level variables, in slot order.
    pub globals: Vec<ScriptVariable>,
    pub synonyms: Vec<Synonym>,
    /// Units this one depends on for classes or public procedures.
    pub uses: BTreeSet<u16>,
}

impl Script {
    pub fn class(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn procedure(&self, name: &str) -> Option<&ProcedureDefinition> {
        self.procedures.iter().find(|p| p.name == name)
    }

    /// Every function body in the unit, methods first.
    pub fn bodies(&self) -> impl Iterator<Item = &FunctionBody> {
        self.classes
            .iter()
            .flat_map(|c| c.methods.iter().map(|m| &m.body))
            .chain(self.procedures.iter().map(|p| &p.body))
    }
}

/// A class or an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub name: String,
    /// Name of the class this one derives from (for instances, its class).
    pub superclass: Option<String>,
    pub species: u16,
    /// Listed in the export table.
    pub public: bool,
    /// An instance rather than a class.
    pub instance: bool,
    pub properties: Vec<ClassProperty>,
    pub methods: Vec<MethodDefinition>,
}

/// A property whose value differs from the inherited default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassProperty {
    pub name: String,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Number(i32),
    /// Reference to another object of the same unit, by name.
    Symbol(String),
    /// Text stored in the unit's string area.
    String(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDefinition {
    /// Selector name.
    pub name: String,
    pub class: String,
    pub body: FunctionBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureDefinition {
    pub name: String,
    pub class: Option<String>,
    pub public: bool,
    pub body: FunctionBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptVariable {
    pub index: u16,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synonym {
    pub word: String,
    pub replacement: String,
}

/// Outcome of decompiling one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyStatus {
    /// Fully structured.
    Structured,
    /// Contains a raw region with explicit jumps.
    Degraded,
    /// The bytecode could not be decoded; `root` is absent.
    Undecodable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionBody {
    /// Entry address within the unit's code buffer.
    pub address: u32,
    pub status: BodyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<Construct>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<CallSite>,
}

impl FunctionBody {
    pub fn undecodable(address: u32, reason: impl Into<String>) -> Self {
        Self {
            address,
            status: BodyStatus::Undecodable {
                reason: reason.into(),
            },
            root: None,
            calls: Vec::new(),
        }
    }

    pub fn is_structured(&self) -> bool {
        self.status == BodyStatus::Structured
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// `call`: a procedure of this unit.
    Local,
    /// `callb`: a public procedure of the root unit.
    Base,
    /// `calle`: a public procedure of another unit.
    External,
}

/// A resolved procedure call inside a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Address of the call instruction.
    pub address: u32,
    pub kind: CallKind,
    pub name: String,
}
