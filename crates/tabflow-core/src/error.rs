//! Error types for the columnar batch model and IR layer.

use thiserror::Error;

/// Errors produced by `tabflow-core`'s data model and IR types.
///
/// Compile-time concerns (DSL/plan validation) are reported as plain
/// strings on the `Plan` itself per spec; this enum covers the
/// lower-level, typed failures that the batch/arena/expression layer can
/// raise and that callers may want to match on.
#[derive(Debug, Error)]
pub enum TabflowError {
    /// The arena's block allocator could not satisfy a request.
    #[error("arena out of memory: requested {requested} bytes")]
    ArenaOom { requested: usize },

    /// A column/row index was out of the batch's declared bounds.
    #[error("batch index out of bounds: {what} {index} (len {len})")]
    OutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A column name was not found in the schema.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// An argument tree did not have the shape an op required.
    #[error("invalid argument for `{op}.{arg}`: {reason}")]
    InvalidArg {
        op: &'static str,
        arg: &'static str,
        reason: String,
    },

    /// Wraps any other error, preserving context the way the teacher's
    /// `RdeError::Other` wraps `anyhow::Error`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TabflowError>;
