//! Companion symbol tables shared between units.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Per-unit export names not derivable from bytecode.
pub trait CompanionSymbols: Sync {
    /// Name of export `index` of `unit`, if recorded.
    fn export_name(&self, unit: u16, index: u16) -> Option<String>;

    /// Offer a name for export `index` of `unit`. Returns whether it was
    /// recorded; an existing binding is never replaced.
    fn propose_export_name(&self, _unit: u16, _index: u16, _name: &str) -> bool {
        false
    }
}

/// One unit's table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolTable {
    /// Bumped on every accepted write.
    pub version: u64,
    pub exports: BTreeMap<u16, String>,
}

/// Shared, versioned store of companion tables.
///
/// Writes to one unit's table hold that entry's shard lock, so concurrent
/// proposals for the same unit are serialized while readers of other units
/// proceed. Readers may see a table that is one write behind.
#[derive(Debug, Default)]
pub struct SymbolStore {
    tables: DashMap<u16, SymbolTable>,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `unit`'s table, e.g. after loading it from disk.
    pub fn insert_table(&self, unit: u16, table: SymbolTable) {
        self.tables.insert(unit, table);
    }

    /// Snapshot of `unit`'s table.
    pub fn table(&self, unit: u16) -> Option<SymbolTable> {
        self.tables.get(&unit).map(|t| t.value().clone())
    }

    pub fn version(&self, unit: u16) -> Option<u64> {
        self.tables.get(&unit).map(|t| t.version)
    }

    /// Snapshot of every table, ordered by unit.
    pub fn snapshot(&self) -> BTreeMap<u16, SymbolTable> {
        self.tables
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

impl From<BTreeMap<u16, BTreeMap<u16, String>>> for SymbolStore {
    fn from(tables: BTreeMap<u16, BTreeMap<u16, String>>) -> Self {
        let store = SymbolStore::new();
        for (unit, exports) in tables {
            store.insert_table(unit, SymbolTable {
                version: 0,
                exports,
            });
        }
        store
    }
}

impl CompanionSymbols for SymbolStore {
    fn export_name(&self, unit: u16, index: u16) -> Option<String> {
        self.tables.get(&unit)?.exports.get(&index).cloned()
    }

    fn propose_export_name(&self, unit: u16, index: u16, name: &str) -> bool {
        let mut table = self.tables.entry(unit).or_default();
        if table.exports.contains_key(&index) {
            return false;
        }
        table.exports.insert(index, name.to_string());
        table.version += 1;
        true
    }
}

/// Companion symbols that know nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl CompanionSymbols for NoSymbols {
    fn export_name(&self, _unit: u16, _index: u16) -> Option<String> {
        None
    }
}

/// Parse a `proc<unit>_<index>` placeholder.
pub fn parse_placeholder(name: &str) -> Option<(u16, u16)> {
    let rest = name.strip_prefix("proc")?;
    let (unit, index) = rest.split_once('_')?;
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(unit) || !all_digits(index) {
        return None;
    }
    Some((unit.parse().ok()?, index.parse().ok()?))
}

pub fn placeholder(unit: u16, index: u16) -> String {
    format!("proc{unit}_{index}")
}

/// Resolve a placeholder through `symbols`, keeping it verbatim when the
/// referenced table has no binding.
pub fn resolve_placeholder(name: &str, symbols: &dyn CompanionSymbols) -> String {
    match parse_placeholder(name) {
        Some((unit, index)) => symbols.export_name(unit, index).unwrap_or_else(|| {
            log::debug!("no companion binding for {name}, keeping placeholder");
            name.to_string()
        }),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_parsing() {
        assert_eq!(parse_placeholder("proc77_3"), Some((77, 3)));
        assert_eq!(parse_placeholder("proc0_12"), Some((0, 12)));
        assert_eq!(parse_placeholder("proc_3"), None);
        assert_eq!(parse_placeholder("proc77_"), None);
        assert_eq!(parse_placeholder("proc7a_3"), None);
        assert_eq!(parse_placeholder("localproc_0010"), None);
        assert_eq!(placeholder(77, 3), "proc77_3");
    }

    #[test]
    fn unresolved_placeholder_is_kept() {
        let store = SymbolStore::new();
        assert_eq!(resolve_placeholder("proc77_3", &store), "proc77_3");
        assert_eq!(resolve_placeholder("Print", &store), "Print");
    }

    #[test]
    fn proposals_never_replace_and_bump_version() {
        let store = SymbolStore::new();
        assert!(store.propose_export_name(0, 1, "Print"));
        assert!(!store.propose_export_name(0, 1, "Other"));
        assert_eq!(store.export_name(0, 1).as_deref(), Some("Print"));
        assert_eq!(store.version(0), Some(1));
        assert_eq!(resolve_placeholder("proc0_1", &store), "Print");
    }
}
