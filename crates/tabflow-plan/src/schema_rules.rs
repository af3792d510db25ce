//! Per-op schema-inference rules: pure `fn(&ArgTree, &Schema) -> Schema`
//! values bound into each [`crate::registry::OpEntry`]. Every rule is
//! best-effort — a shape it can't resolve (a missing arg, a lookup file
//! that isn't readable yet) just yields a schema with fewer guarantees,
//! never an error; `Plan::infer_schema` treats failure as non-fatal.

use arcstr::ArcStr;
use tabflow_core::batch::Schema;
use tabflow_core::value::DataType;
use tabflow_core::ArgTree;

/// Decoders: nothing is known about the output until the first batch
/// arrives.
pub fn unknown_schema(_args: &ArgTree, _input: &Schema) -> Schema {
    Schema::empty()
}

/// Encoders: a sink has no output schema of its own.
pub fn sink_schema(_args: &ArgTree, _input: &Schema) -> Schema {
    Schema::empty()
}

/// Most row-at-a-time ops: output columns are exactly the input
/// columns.
pub fn passthrough_schema(_args: &ArgTree, input: &Schema) -> Schema {
    input.clone()
}

pub fn select_schema(args: &ArgTree, input: &Schema) -> Schema {
    let mut schema = Schema::empty();
    let Some(columns) = args.get("columns").and_then(|v| v.as_array()) else {
        return schema;
    };
    for column in columns {
        let Some(name) = column.as_str() else { continue };
        let ty = input.index_of(name).map(|i| input.type_of(i)).unwrap_or(DataType::Null);
        schema.push(ArcStr::from(name), ty);
    }
    schema
}

pub fn rename_schema(args: &ArgTree, input: &Schema) -> Schema {
    let mut schema = input.clone();
    let Some(mapping) = args.get("mapping").and_then(|v| v.as_object()) else {
        return schema;
    };
    for col in 0..schema.len() {
        let current_name = schema.name(col).as_str().to_string();
        if let Some(new_name) = mapping.get(&current_name).and_then(|v| v.as_str()) {
            let ty = schema.type_of(col);
            schema.set(col, ArcStr::from(new_name), ty);
        }
    }
    schema
}

/// `derive` appends one column per declared derivation with type
/// unknown (resolved at runtime from row 0), so the schema as a whole
/// is marked not fully known.
pub fn derive_schema(args: &ArgTree, input: &Schema) -> Schema {
    let mut schema = input.clone();
    if let Some(columns) = args.get("columns").and_then(|v| v.as_array()) {
        for column in columns {
            if let Some(name) = column.get("name").and_then(|v| v.as_str()) {
                schema.push(ArcStr::from(name), DataType::Null);
            }
        }
    }
    schema.set_known(false);
    schema
}

pub fn frequency_schema(_args: &ArgTree, _input: &Schema) -> Schema {
    Schema::new(
        vec![(ArcStr::from("value"), DataType::String), (ArcStr::from("count"), DataType::Int64)],
        true,
    )
}

pub fn group_agg_schema(args: &ArgTree, _input: &Schema) -> Schema {
    let mut schema = Schema::empty();
    if let Some(group_by) = args.get("group_by").and_then(|v| v.as_str()) {
        for name in group_by.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            schema.push(ArcStr::from(name), DataType::String);
        }
    }
    if let Some(aggs) = args.get("aggs").and_then(|v| v.as_array()) {
        for spec in aggs {
            let column = spec.get("column").and_then(|v| v.as_str()).unwrap_or("");
            let func = spec.get("func").and_then(|v| v.as_str()).unwrap_or("");
            let name = spec
                .get("as")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{func}_{column}"));
            let ty = if func == "count" { DataType::Int64 } else { DataType::Float64 };
            schema.push(ArcStr::from(name.as_str()), ty);
        }
    }
    schema
}

pub fn stats_schema(args: &ArgTree, _input: &Schema) -> Schema {
    let mut schema = Schema::new(vec![(ArcStr::from("column"), DataType::String)], true);
    let default_stats = ["count", "sum", "avg", "min", "max", "var", "stddev", "median"];
    let requested: Vec<String> = args
        .get("stats")
        .and_then(|v| v.as_str())
        .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
        .unwrap_or_else(|| default_stats.iter().map(|s| s.to_string()).collect());
    for stat in requested {
        let ty = if stat == "count" { DataType::Int64 } else { DataType::Float64 };
        schema.push(ArcStr::from(stat.as_str()), ty);
    }
    schema
}

fn output_name(args: &ArgTree, as_key: &str, default: String) -> String {
    args.get(as_key).and_then(|v| v.as_str()).map(str::to_string).unwrap_or(default)
}

pub fn window_schema(args: &ArgTree, input: &Schema) -> Schema {
    let mut schema = input.clone();
    let column = args.get("column").and_then(|v| v.as_str()).unwrap_or("");
    let func = args.get("func").and_then(|v| v.as_str()).unwrap_or("");
    let name = output_name(args, "as", format!("{func}_{column}"));
    schema.push(ArcStr::from(name.as_str()), DataType::Float64);
    schema
}

pub fn step_schema(args: &ArgTree, input: &Schema) -> Schema {
    window_schema(args, input)
}

pub fn lead_schema(args: &ArgTree, input: &Schema) -> Schema {
    let mut schema = input.clone();
    let column = args.get("column").and_then(|v| v.as_str()).unwrap_or("");
    let name = output_name(args, "as", format!("lead_{column}"));
    schema.push(ArcStr::from(name.as_str()), DataType::Float64);
    schema
}

pub fn diff_schema(args: &ArgTree, input: &Schema) -> Schema {
    let mut schema = input.clone();
    let column = args.get("column").and_then(|v| v.as_str()).unwrap_or("");
    let name = output_name(args, "as", format!("diff_{column}"));
    schema.push(ArcStr::from(name.as_str()), DataType::Float64);
    schema
}

pub fn ewma_schema(args: &ArgTree, input: &Schema) -> Schema {
    let mut schema = input.clone();
    let column = args.get("column").and_then(|v| v.as_str()).unwrap_or("");
    let name = output_name(args, "as", format!("ewma_{column}"));
    schema.push(ArcStr::from(name.as_str()), DataType::Float64);
    schema
}

/// The discovered-value set grows across batches, so the output schema
/// can only ever be "at least the input columns" — mark unknown rather
/// than guess which indicator columns will appear.
pub fn onehot_schema(_args: &ArgTree, input: &Schema) -> Schema {
    let mut schema = input.clone();
    schema.set_known(false);
    schema
}

pub fn label_encode_schema(args: &ArgTree, input: &Schema) -> Schema {
    let mut schema = input.clone();
    let column = args.get("column").and_then(|v| v.as_str()).unwrap_or("");
    let name = output_name(args, "as", format!("{column}_label"));
    schema.push(ArcStr::from(name.as_str()), DataType::Int64);
    schema
}

pub fn unpivot_schema(args: &ArgTree, input: &Schema) -> Schema {
    let value_columns: Vec<String> = args
        .get("columns")
        .and_then(|v| v.as_str())
        .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    let mut schema = Schema::empty();
    for i in 0..input.len() {
        let name = input.name(i).as_str();
        if !value_columns.iter().any(|v| v == name) {
            schema.push(input.name(i).clone(), input.type_of(i));
        }
    }
    schema.push(ArcStr::from("variable"), DataType::String);
    schema.push(ArcStr::from("value"), DataType::String);
    schema
}
