//! Small helpers shared across operators.

use tabflow_core::batch::Batch;
use tabflow_core::value::{DataType, Value};

/// Deep-copy every row of `input` into a freshly owned batch with the
/// same schema — the baseline every passthrough-shaped operator
/// (passthrough, rename) builds on, since `Batch` owns its arena and
/// can't simply be cloned.
pub fn copy_whole_batch(input: &Batch) -> Batch {
    let mut out = Batch::with_capacity_for(input.schema().clone(), input.row_count().max(1));
    out.set_row_count(input.row_count());
    for row in 0..input.row_count() {
        out.copy_row(row, input, row);
    }
    out
}

/// Coerce `v` to `ty`, widening across the Int64/Float64 boundary;
/// anything else that doesn't already match yields null (per spec:
/// "incompatible yields null").
pub fn coerce_to(v: &Value, ty: DataType) -> Option<Value> {
    if v.is_null() {
        return None;
    }
    if v.type_of() == ty {
        return Some(v.clone());
    }
    match (ty, v) {
        (DataType::Float64, Value::Int64(i)) => Some(Value::Float64(*i as f64)),
        (DataType::Int64, Value::Float64(f)) => Some(Value::Int64(*f as i64)),
        _ => None,
    }
}
