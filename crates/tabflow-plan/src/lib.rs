//! # tabflow-plan
//!
//! The surface-to-runtime layer: the pipe-style DSL parser and the
//! `.tfp` JSON-plan parser (both producing a `tabflow_core::ir::Plan`),
//! the static op registry naming every codec and transform this
//! implementation natively supports, the schema-inference rules bound
//! into that registry, and the [`pipeline::Pipeline`] orchestrator that
//! validates, compiles, and runs a plan end to end.
//!
//! ## Layout
//!
//! - [`dsl`] — `parse_dsl` (pipe syntax) and `parse_json_plan` (`.tfp`
//!   on-disk form).
//! - [`registry`] — the concrete, static [`tabflow_core::ir::OpEntry`]
//!   table; validation and the IR→operator compiler live on
//!   `tabflow_core::ir::Plan`/`compile` and are reused here, not
//!   reimplemented.
//! - [`schema_rules`] — the per-op `fn(&ArgTree, &Schema) -> Schema`
//!   values the registry binds.
//! - [`pipeline`] — `Pipeline`: owns the compiled decoder/steps/encoder
//!   triple and the four output channels (main, errors, stats,
//!   samples), and drives `push`/`finish`/`pull`.

pub mod dsl;
pub mod pipeline;
pub mod registry;
pub mod schema_rules;

pub use dsl::{parse_dsl, parse_json_plan};
pub use pipeline::{Channel, Pipeline, PlanSource};
pub use registry::registry;
