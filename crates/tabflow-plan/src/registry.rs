//! The concrete, static op registry: every codec and transform this
//! implementation natively supports, plus a handful of `Ecosystem`-tier
//! names that validate and schema-infer but have no native target (the
//! connectors the surrounding corpus supports and this engine
//! deliberately doesn't — see DESIGN.md).

use std::sync::OnceLock;

use tabflow_core::capabilities::Capabilities;
use tabflow_core::ir::{ArgDescriptor, OpEntry, OpKind, Tier};

use crate::schema_rules as rules;

const fn req(name: &'static str) -> ArgDescriptor {
    ArgDescriptor { name, required: true }
}

const fn opt(name: &'static str) -> ArgDescriptor {
    ArgDescriptor { name, required: false }
}

const NO_ARGS: &[ArgDescriptor] = &[];

fn build_registry() -> Vec<OpEntry> {
    use tabflow_codec::{csv, jsonl, table, text};
    use tabflow_ops::{agg_ops, buffered_ops, encode_ops, join_op, row_ops, stream_ops};

    let streaming_bounded = Capabilities::STREAMING
        .union(Capabilities::BOUNDED_MEMORY)
        .union(Capabilities::DETERMINISTIC)
        .union(Capabilities::BROWSER_SAFE);
    let streaming_unbounded =
        Capabilities::STREAMING.union(Capabilities::DETERMINISTIC).union(Capabilities::BROWSER_SAFE);
    let buffering_unbounded = Capabilities::DETERMINISTIC.union(Capabilities::BROWSER_SAFE);
    let buffering_bounded = buffering_unbounded.union(Capabilities::BOUNDED_MEMORY);

    vec![
        // -- codecs ----------------------------------------------------
        OpEntry {
            name: "codec.csv.decode",
            kind: OpKind::Decoder,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: NO_ARGS,
            schema_fn: rules::unknown_schema,
            constructor: Some(csv::construct_decoder),
        },
        OpEntry {
            name: "codec.csv.encode",
            kind: OpKind::Encoder,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: NO_ARGS,
            schema_fn: rules::sink_schema,
            constructor: Some(csv::construct_encoder),
        },
        OpEntry {
            name: "codec.jsonl.decode",
            kind: OpKind::Decoder,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: NO_ARGS,
            schema_fn: rules::unknown_schema,
            constructor: Some(jsonl::construct_decoder),
        },
        OpEntry {
            name: "codec.jsonl.encode",
            kind: OpKind::Encoder,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: NO_ARGS,
            schema_fn: rules::sink_schema,
            constructor: Some(jsonl::construct_encoder),
        },
        OpEntry {
            name: "codec.text.decode",
            kind: OpKind::Decoder,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: NO_ARGS,
            schema_fn: rules::unknown_schema,
            constructor: Some(text::construct_decoder),
        },
        OpEntry {
            name: "codec.text.encode",
            kind: OpKind::Encoder,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: NO_ARGS,
            schema_fn: rules::sink_schema,
            constructor: Some(text::construct_encoder),
        },
        OpEntry {
            name: "codec.table.encode",
            kind: OpKind::Encoder,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: NO_ARGS,
            schema_fn: rules::sink_schema,
            constructor: Some(table::construct_encoder),
        },
        // -- row-at-a-time ----------------------------------------------
        OpEntry {
            name: "filter",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("expr")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(row_ops::construct_filter),
        },
        OpEntry {
            name: "validate",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("expr")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(row_ops::construct_filter),
        },
        OpEntry {
            name: "derive",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("columns")],
            schema_fn: rules::derive_schema,
            constructor: Some(row_ops::construct_derive),
        },
        OpEntry {
            name: "select",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("columns")],
            schema_fn: rules::select_schema,
            constructor: Some(row_ops::construct_select),
        },
        OpEntry {
            name: "rename",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("mapping")],
            schema_fn: rules::rename_schema,
            constructor: Some(row_ops::construct_rename),
        },
        OpEntry {
            name: "unique",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_unbounded,
            args: &[opt("columns")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(row_ops::construct_unique),
        },
        OpEntry {
            name: "passthrough",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: NO_ARGS,
            schema_fn: rules::passthrough_schema,
            constructor: Some(row_ops::construct_passthrough),
        },
        OpEntry {
            name: "clean",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[opt("normalize_case"), opt("remove_nulls"), opt("trim_strings")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(row_ops::construct_clean),
        },
        OpEntry {
            name: "grep",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("pattern"), opt("invert"), opt("regex")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(row_ops::construct_grep),
        },
        // -- no-op --------------------------------------------------------
        OpEntry {
            name: "flatten",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: NO_ARGS,
            schema_fn: rules::passthrough_schema,
            constructor: None,
        },
        // -- buffered / prefix-suffix ------------------------------------
        OpEntry {
            name: "sort",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: buffering_unbounded,
            args: &[req("columns")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(buffered_ops::construct_sort),
        },
        OpEntry {
            name: "head",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("n")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(buffered_ops::construct_head),
        },
        OpEntry {
            name: "skip",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("n")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(buffered_ops::construct_skip),
        },
        OpEntry {
            name: "tail",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: buffering_bounded,
            args: &[req("n")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(buffered_ops::construct_tail),
        },
        OpEntry {
            name: "top",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: buffering_bounded,
            args: &[req("n"), req("column"), opt("desc")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(buffered_ops::construct_top),
        },
        OpEntry {
            name: "sample",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: buffering_bounded,
            args: &[req("n"), opt("seed")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(buffered_ops::construct_sample),
        },
        // -- aggregating ---------------------------------------------------
        OpEntry {
            name: "group-agg",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: buffering_unbounded,
            args: &[req("group_by"), req("aggs")],
            schema_fn: rules::group_agg_schema,
            constructor: Some(agg_ops::construct_group_agg),
        },
        OpEntry {
            name: "frequency",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: buffering_unbounded,
            args: &[req("columns")],
            schema_fn: rules::frequency_schema,
            constructor: Some(agg_ops::construct_frequency),
        },
        OpEntry {
            name: "normalize",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: buffering_unbounded,
            args: &[req("columns"), opt("method")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(agg_ops::construct_normalize),
        },
        OpEntry {
            name: "stats",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: buffering_bounded,
            args: &[opt("stats"), opt("columns")],
            schema_fn: rules::stats_schema,
            constructor: Some(agg_ops::construct_stats),
        },
        // -- join ------------------------------------------------------
        OpEntry {
            name: "join",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: Capabilities::STREAMING.union(Capabilities::DETERMINISTIC).union(Capabilities::FS),
            args: &[req("file"), req("left_on"), req("right_on"), opt("how")],
            schema_fn: join_op::schema_fn,
            constructor: Some(join_op::construct_join),
        },
        // -- streaming statistics-of-one-column ---------------------------
        OpEntry {
            name: "window",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("column"), req("k"), req("func"), opt("as")],
            schema_fn: rules::window_schema,
            constructor: Some(stream_ops::construct_window),
        },
        OpEntry {
            name: "step",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("column"), req("func"), opt("as")],
            schema_fn: rules::step_schema,
            constructor: Some(stream_ops::construct_step),
        },
        OpEntry {
            name: "lead",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("column"), req("n"), opt("as")],
            schema_fn: rules::lead_schema,
            constructor: Some(stream_ops::construct_lead),
        },
        OpEntry {
            name: "interpolate",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_unbounded,
            args: &[req("column"), opt("mode")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(stream_ops::construct_interpolate),
        },
        OpEntry {
            name: "diff",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("column"), opt("k"), opt("as")],
            schema_fn: rules::diff_schema,
            constructor: Some(stream_ops::construct_diff),
        },
        OpEntry {
            name: "ewma",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("column"), req("alpha"), opt("as")],
            schema_fn: rules::ewma_schema,
            constructor: Some(stream_ops::construct_ewma),
        },
        // -- categorical / row-multiplying ---------------------------------
        OpEntry {
            name: "onehot",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_unbounded,
            args: &[req("column")],
            schema_fn: rules::onehot_schema,
            constructor: Some(encode_ops::construct_onehot),
        },
        OpEntry {
            name: "label-encode",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_unbounded,
            args: &[req("column"), opt("as")],
            schema_fn: rules::label_encode_schema,
            constructor: Some(encode_ops::construct_label_encode),
        },
        OpEntry {
            name: "unpivot",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("columns")],
            schema_fn: rules::unpivot_schema,
            constructor: Some(encode_ops::construct_unpivot),
        },
        OpEntry {
            name: "explode",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("column"), opt("delimiter")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(encode_ops::construct_explode),
        },
        OpEntry {
            name: "split",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: streaming_bounded,
            args: &[req("column"), opt("delimiter")],
            schema_fn: rules::passthrough_schema,
            constructor: Some(encode_ops::construct_explode),
        },
        // -- Ecosystem tier: named in the vocabulary, no native target ----
        OpEntry {
            name: "source.kafka",
            kind: OpKind::Decoder,
            tier: Tier::Ecosystem,
            capabilities: Capabilities::empty(),
            args: NO_ARGS,
            schema_fn: rules::unknown_schema,
            constructor: None,
        },
        OpEntry {
            name: "sink.iceberg",
            kind: OpKind::Encoder,
            tier: Tier::Ecosystem,
            capabilities: Capabilities::empty(),
            args: NO_ARGS,
            schema_fn: rules::sink_schema,
            constructor: None,
        },
        OpEntry {
            name: "sink.parquet",
            kind: OpKind::Encoder,
            tier: Tier::Ecosystem,
            capabilities: Capabilities::empty(),
            args: NO_ARGS,
            schema_fn: rules::sink_schema,
            constructor: None,
        },
    ]
}

static REGISTRY: OnceLock<Vec<OpEntry>> = OnceLock::new();

/// The static registry instance, built once and reused for the
/// lifetime of the process. Safe to read concurrently: immutable after
/// first construction.
pub fn registry() -> &'static [OpEntry] {
    REGISTRY.get_or_init(build_registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabflow_core::ir::OpEntry as Entry;

    #[test]
    fn every_op_name_is_unique() {
        let reg = registry();
        let mut names: Vec<&str> = reg.iter().map(|e| e.name).collect();
        names.sort_unstable();
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len(), "duplicate op name in registry");
    }

    #[test]
    fn codec_shortcuts_resolve() {
        let reg = registry();
        assert!(Entry::find(reg, "codec.csv.decode").is_some());
        assert!(Entry::find(reg, "codec.table.encode").is_some());
    }

    #[test]
    fn ecosystem_tier_has_no_constructor() {
        let reg = registry();
        let entry = Entry::find(reg, "source.kafka").unwrap();
        assert!(entry.constructor.is_none());
        assert_eq!(entry.tier, Tier::Ecosystem);
    }
}
