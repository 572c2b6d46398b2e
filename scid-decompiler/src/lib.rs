pub mod branch;
pub mod config;
pub mod decode;
pub mod error;
pub mod lookup;
pub mod reconstruct;
pub mod structuring;
pub mod symbols;
pub mod unit;

pub use config::DecompilerConfig;
pub use decode::decode_function;
pub use error::{Error, Result};
pub use lookup::{ScriptLookup, SpeciesInfo, StaticLookup};
pub use reconstruct::{decompile_function, reconstruct};
pub use symbols::{CompanionSymbols, NoSymbols, SymbolStore, SymbolTable};
pub use unit::{CompiledUnit, ObjectRecord};

use scid_ir::script::Script;

/// Reconstruct `unit` with the default configuration and no companion
/// symbols.
pub fn decompile_unit(unit: &CompiledUnit, lookup: &dyn ScriptLookup) -> Result<Script> {
    reconstruct(unit, lookup, &NoSymbols, &DecompilerConfig::default())
}
