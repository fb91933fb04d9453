//! Crate-wide error taxonomy.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Array dimensionality or element count disagrees with `ndim`/`nbw` or with a grid's size.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A space specification fails uniqueness, a deserialized class tag is unknown, or a
    /// component's dimension count disagrees with its space.
    #[error("invalid specification: {0}")]
    InvalidSpec(String),

    /// A source/union index is out of bounds, or a selection mask's size does not match `ndim`.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// A `PartialMixture` was used after its parent mixture's component count or version changed.
    #[error("stale partial mixture: parent mixture was mutated after construction")]
    Staleness,

    /// Underlying container read/write failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error that does not originate from this crate (serialization backends and the like).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
