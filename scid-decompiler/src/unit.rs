use serde::{Deserialize, Serialize};

/// One compiled script unit, as parsed by the host.
///
/// Every offset (exports, objects, methods) is an address in `code`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompiledUnit {
    pub number: u16,
    /// The unit's whole buffer. Loaded separately from the tables.
    #[serde(skip)]
    pub code: Vec<u8>,
    /// Export table: code or object offsets, by export index.
    pub exports: Vec<u16>,
    pub objects: Vec<ObjectRecord>,
    /// Initial values of the script variables.
    pub locals: Vec<u16>,
    /// `(word, replacement)` vocabulary ids.
    pub synonyms: Vec<(u16, u16)>,
}

/// A class or instance from the unit's object table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectRecord {
    pub offset: u16,
    pub species: u16,
    /// Species of the parent class; `None` for a root class.
    pub superclass: Option<u16>,
    pub is_class: bool,
    /// `(selector, value)` in declaration order.
    pub properties: Vec<(u16, u16)>,
    /// `(selector, code offset)` in declaration order.
    pub methods: Vec<(u16, u16)>,
}
