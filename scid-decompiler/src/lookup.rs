use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name and defining unit of a class species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesInfo {
    pub name: String,
    pub script: u16,
}

/// Read-only name service consulted during reconstruction.
///
/// A `None` answer is never an error: callers substitute a placeholder.
pub trait ScriptLookup: Sync {
    fn selector_name(&self, selector: u16) -> Option<String>;
    fn species(&self, species: u16) -> Option<SpeciesInfo>;
    /// Default `(selector, value)` list of a class species.
    fn species_defaults(&self, _species: u16) -> Option<Vec<(u16, u16)>> {
        None
    }
    /// String stored at `offset` in `unit`.
    fn string_at(&self, _unit: u16, _offset: u16) -> Option<String> {
        None
    }
    /// Vocabulary word by id.
    fn word(&self, _id: u16) -> Option<String> {
        None
    }
}

/// [`ScriptLookup`] over in-memory tables, loadable with serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticLookup {
    pub selectors: BTreeMap<u16, String>,
    pub species: BTreeMap<u16, SpeciesInfo>,
    pub defaults: BTreeMap<u16, Vec<(u16, u16)>>,
    /// Strings by unit, then offset.
    pub strings: BTreeMap<u16, BTreeMap<u16, String>>,
    pub words: BTreeMap<u16, String>,
}

impl ScriptLookup for StaticLookup {
    fn selector_name(&self, selector: u16) -> Option<String> {
        self.selectors.get(&selector).cloned()
    }

    fn species(&self, species: u16) -> Option<SpeciesInfo> {
        self.species.get(&species).cloned()
    }

    fn species_defaults(&self, species: u16) -> Option<Vec<(u16, u16)>> {
        self.defaults.get(&species).cloned()
    }

    fn string_at(&self, unit: u16, offset: u16) -> Option<String> {
        self.strings.get(&unit)?.get(&offset).cloned()
    }

    fn word(&self, id: u16) -> Option<String> {
        self.words.get(&id).cloned()
    }
}
