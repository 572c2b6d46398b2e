use scid_isa::Version;
use serde::{Deserialize, Serialize};

/// Knobs for [`reconstruct`](crate::reconstruct::reconstruct).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecompilerConfig {
    /// Opcode table to decode with.
    pub version: Version,
    /// Turn local `call` targets that are neither exports nor methods into
    /// internal procedures.
    pub discover_internal_procedures: bool,
    /// Resolve `proc<unit>_<index>` names through the companion symbols.
    pub resolve_placeholders: bool,
    /// Register names chosen for this unit's public procedures with the
    /// companion symbols.
    pub propose_bindings: bool,
    /// Decompile the functions of a unit on the rayon pool.
    pub parallel: bool,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        Self {
            version: Version::default(),
            discover_internal_procedures: true,
            resolve_placeholders: true,
            propose_bindings: true,
            parallel: true,
        }
    }
}
