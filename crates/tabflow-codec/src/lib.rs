//! Streaming CSV/JSONL/text decoders and encoders.
//!
//! Each format is a pair of concrete `Decoder`/`Encoder` implementations
//! (`tabflow_core::Decoder`/`Encoder`) plus a pair of `construct_*`
//! functions shaped to slot directly into an `OpEntry.constructor` in
//! the registry `tabflow-plan` assembles.

pub mod csv;
pub mod jsonl;
pub mod table;
pub mod text;

pub use csv::{CsvDecoder, CsvEncoder, CsvOptions};
pub use jsonl::{JsonlDecoder, JsonlEncoder, JsonlOptions};
pub use table::TableEncoder;
pub use text::{TextDecoder, TextEncoder, TextOptions};
