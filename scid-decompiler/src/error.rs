use scid_ir::cfg::CfgError;
use scid_isa::DecodeError;

/// Errors from decompiling a function or a unit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The function's bytes do not decode. Only that function is affected.
    #[error("malformed encoding in function at {entry:#06x}: {source}")]
    MalformedEncoding {
        entry: u32,
        #[source]
        source: DecodeError,
    },
    /// Corrupted control flow. Reconstruction of the unit is abandoned.
    #[error("invariant violation: {0}")]
    InvariantViolation(#[from] CfgError),
}

pub type Result<T> = std::result::Result<T, Error>;
