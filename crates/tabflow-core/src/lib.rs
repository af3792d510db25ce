//! # tabflow-core
//!
//! Foundational types for the tabflow data-transformation engine: the
//! columnar batch model, the arena and buffer primitives it's built on,
//! the expression sub-language, and the IR/operator contracts that the
//! compiler (`tabflow-plan`) and the concrete operators (`tabflow-codec`,
//! `tabflow-ops`) are built against.
//!
//! ## Layout
//!
//! - [`arena`] / [`buffer`] — the bump allocator and growable byte buffer
//!   every batch and decoder is built on.
//! - [`value`] / [`dates`] — the scalar `Value`/`DataType` model and its
//!   date/timestamp arithmetic.
//! - [`batch`] — typed column arrays with null bitmaps and owned string
//!   storage.
//! - [`expr`] — the filter/derive expression language: AST, parser,
//!   evaluator.
//! - [`ir`] — the op registry descriptor shapes and the validated plan.
//! - [`error`] — the crate's typed error.
//!
//! Operators are expressed as the trait objects in this crate
//! ([`Decoder`], [`Encoder`], [`Transform`]); `destroy` from the spec's
//! process/flush/destroy triple has no method here — it's simply `Drop`.

pub mod arena;
pub mod batch;
pub mod buffer;
pub mod capabilities;
pub mod dates;
pub mod error;
pub mod expr;
pub mod ir;
pub mod value;

pub use batch::{Batch, Schema};
pub use capabilities::Capabilities;
pub use error::{Result, TabflowError};
pub use value::{DataType, Value};

/// A dynamic argument tree: the host-neutral shape every op constructor
/// and the DSL/JSON plan parsers agree on. Reusing `serde_json::Value`
/// directly (rather than a bespoke tagged enum) since it already *is*
/// the null/bool/number/string/array/object tree the spec calls for.
pub type ArgTree = serde_json::Value;

/// Streaming decoder: turns raw bytes into batches.
///
/// `push` may be called many times as bytes arrive; it returns every
/// full batch the new bytes complete. `flush` returns the trailing
/// partial batch, if any, and is terminal — no further `push` call is
/// valid on a decoder after `flush`.
pub trait Decoder {
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<Batch>>;
    fn flush(&mut self) -> Result<Option<Batch>>;
}

/// Streaming encoder: turns batches back into bytes.
pub trait Encoder {
    fn encode(&mut self, batch: &Batch) -> Result<Vec<u8>>;
    fn flush(&mut self) -> Result<Vec<u8>>;
}

/// A transform step in the operator chain.
///
/// `process` borrows its input and must not retain it past return;
/// emitting `Ok(None)` means every row was consumed (filtered, buffered
/// for a later `flush`, folded into running state) without producing
/// output for this call. `flush` is terminal: the orchestrator never
/// calls `process` again on a step after calling `flush`.
pub trait Transform {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>>;
    fn flush(&mut self) -> Result<Option<Batch>>;
}
