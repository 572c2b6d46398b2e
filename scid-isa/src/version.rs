use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Package format a compiled unit was produced for.
///
/// Each format selects its own opcode table. The tables agree on opcode
/// numbering but not on every operand width, so anything that reads or
/// writes operands must go through the table of the active version.
///
/// ```
/// use scid_isa::Version;
///
/// let v: Version = "sci2".parse().unwrap();
/// assert!(v.has_debug_opcodes());
/// assert_eq!(v.to_string(), "sci2");
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    /// The original package format (SCI0 through SCI1.1).
    #[default]
    Sci0,
    /// The later package format (SCI2 and up).
    Sci2,
}

impl Version {
    /// Every known table, oldest first.
    pub const ALL: [Version; 2] = [Version::Sci0, Version::Sci2];

    /// Whether the `_file_` / `_line_` pseudo-opcodes exist in this table.
    #[inline]
    pub const fn has_debug_opcodes(self) -> bool {
        matches!(self, Version::Sci2)
    }

    /// Whether `lofsa`/`lofss` carry absolute offsets instead of
    /// displacements relative to the next instruction.
    #[inline]
    pub const fn absolute_offsets(self) -> bool {
        matches!(self, Version::Sci2)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Version::Sci0 => "sci0",
            Version::Sci2 => "sci2",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a version name is not recognized.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown package format version '{0}' (expected sci0 or sci2)")]
pub struct UnknownVersion(pub String);

impl FromStr for Version {
    type Err = UnknownVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sci0" | "sci1" | "sci11" => Ok(Version::Sci0),
            "sci2" | "sci21" | "sci3" => Ok(Version::Sci2),
            _ => Err(UnknownVersion(s.to_string())),
        }
    }
}
