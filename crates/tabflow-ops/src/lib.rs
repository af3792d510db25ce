//! Streaming transform operators: the ~45 concrete `Transform` (and one
//! `Join`) implementations the compiler wires in between a decoder and
//! an encoder.
//!
//! Grouped by shape rather than alphabetically, mirroring how the
//! teacher splits its transform crate into one file per operator
//! family:
//!
//! - [`row_ops`] — row-at-a-time, non-aggregating: filter, derive,
//!   select, rename, unique, passthrough, clean, grep.
//! - [`buffered_ops`] — buffer-then-flush or prefix/suffix: sort, head,
//!   skip, tail, top, sample.
//! - [`agg_ops`] — group-agg, frequency, normalize, stats.
//! - [`join_op`] — the one-shot build/probe join.
//! - [`stream_ops`] — window, step, lead, interpolate, diff, ewma.
//! - [`encode_ops`] — onehot, label-encode, unpivot, explode/split.
//! - [`stats_algo`] — Welford/P²/HyperLogLog/histogram/reservoir/xorshift
//!   building blocks `agg_ops::Stats` is built from.
//! - [`key`] / [`common`] — small helpers shared across the above.

pub mod agg_ops;
pub mod buffered_ops;
pub mod common;
pub mod encode_ops;
pub mod join_op;
pub mod key;
pub mod row_ops;
pub mod stats_algo;
pub mod stream_ops;
