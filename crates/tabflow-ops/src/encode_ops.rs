//! Categorical and row-multiplying transforms: onehot, label-encode,
//! unpivot, explode/split.

use std::collections::HashMap;

use arcstr::ArcStr;
use tabflow_core::batch::{Batch, Schema};
use tabflow_core::ir::CompiledOp;
use tabflow_core::value::DataType;
use tabflow_core::{ArgTree, Result, Transform};

/// Accumulates the set of distinct values seen (insertion order) and
/// emits one Int64 indicator column per discovered value per batch.
/// The distinct set grows monotonically, so the output schema grows
/// across batches — downstream consumers must tolerate that.
pub struct Onehot {
    column: String,
    values: Vec<String>,
    seen: HashMap<String, usize>,
}

impl Onehot {
    pub fn new(column: String) -> Self {
        Onehot {
            column,
            values: Vec::new(),
            seen: HashMap::new(),
        }
    }
}

impl Transform for Onehot {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let Some(col) = input.schema().index_of(&self.column) else {
            return Ok(None);
        };
        for row in 0..input.row_count() {
            if input.is_null(row, col) {
                continue;
            }
            let key = input.get_value(row, col).key_repr();
            if !self.seen.contains_key(&key) {
                self.seen.insert(key.clone(), self.values.len());
                self.values.push(key);
            }
        }

        let mut schema = input.schema().clone();
        for value in &self.values {
            schema.push(ArcStr::from(format!("{}_{}", self.column, value)), DataType::Int64);
        }
        let base_cols = input.n_cols();
        let mut out = Batch::with_capacity_for(schema, input.row_count());
        out.set_row_count(input.row_count());
        for row in 0..input.row_count() {
            out.copy_row(row, input, row);
            let row_key = if input.is_null(row, col) {
                None
            } else {
                Some(input.get_value(row, col).key_repr())
            };
            for (i, value) in self.values.iter().enumerate() {
                let indicator = row_key.as_deref() == Some(value.as_str());
                out.set_int64(row, base_cols + i, indicator as i64);
            }
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

/// First-seen order assigns sequential Int64 labels, memoized across
/// batches.
pub struct LabelEncode {
    column: String,
    output_name: String,
    labels: HashMap<String, i64>,
}

impl LabelEncode {
    pub fn new(column: String, output_name: String) -> Self {
        LabelEncode {
            column,
            output_name,
            labels: HashMap::new(),
        }
    }
}

impl Transform for LabelEncode {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let Some(col) = input.schema().index_of(&self.column) else {
            return Ok(None);
        };
        let mut schema = input.schema().clone();
        schema.push(ArcStr::from(self.output_name.as_str()), DataType::Int64);
        let out_col = schema.len() - 1;
        let mut out = Batch::with_capacity_for(schema, input.row_count());
        out.set_row_count(input.row_count());
        for row in 0..input.row_count() {
            out.copy_row(row, input, row);
            if input.is_null(row, col) {
                out.set_null(row, out_col);
                continue;
            }
            let key = input.get_value(row, col).key_repr();
            let next_label = self.labels.len() as i64;
            let label = *self.labels.entry(key).or_insert(next_label);
            out.set_int64(row, out_col, label);
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

/// For each row, emits one output row per listed value column, with
/// `variable` (source column name) and `value` (cell converted to
/// string) appended, and the melted columns dropped.
pub struct Unpivot {
    value_columns: Vec<String>,
}

impl Unpivot {
    pub fn new(value_columns: Vec<String>) -> Self {
        Unpivot { value_columns }
    }
}

impl Transform for Unpivot {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if input.row_count() == 0 {
            return Ok(None);
        }
        let value_idx: Vec<usize> = self
            .value_columns
            .iter()
            .filter_map(|c| input.schema().index_of(c))
            .collect();
        let id_idx: Vec<usize> = (0..input.n_cols()).filter(|c| !value_idx.contains(c)).collect();

        let mut schema = Schema::empty();
        for &c in &id_idx {
            schema.push(input.schema().name(c).clone(), input.schema().type_of(c));
        }
        schema.push(ArcStr::from("variable"), DataType::String);
        schema.push(ArcStr::from("value"), DataType::String);

        let total_rows = input.row_count() * value_idx.len();
        let mut out = Batch::with_capacity_for(schema, total_rows.max(1));
        out.set_row_count(total_rows);
        let mut out_row = 0;
        for row in 0..input.row_count() {
            for &val_col in &value_idx {
                for (out_col, &src_col) in id_idx.iter().enumerate() {
                    if input.is_null(row, src_col) {
                        out.set_null(out_row, out_col);
                    } else {
                        out.set_value(out_row, out_col, &input.get_value(row, src_col));
                    }
                }
                let var_col = id_idx.len();
                out.set_string(out_row, var_col, input.schema().name(val_col).as_str());
                let value_col = id_idx.len() + 1;
                if input.is_null(row, val_col) {
                    out.set_null(out_row, value_col);
                } else {
                    out.set_string(out_row, value_col, &input.get_value(row, val_col).to_string());
                }
                out_row += 1;
            }
        }
        Ok(if out_row == 0 { None } else { Some(out) })
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

/// Row-multiplying string split: each row's `column` is split on
/// `delimiter`, emitting one output row per resulting piece with every
/// other column repeated.
pub struct Explode {
    column: String,
    delimiter: String,
}

impl Explode {
    pub fn new(column: String, delimiter: String) -> Self {
        Explode { column, delimiter }
    }
}

impl Transform for Explode {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let Some(col) = input.schema().index_of(&self.column) else {
            return Ok(None);
        };
        let mut pieces_per_row = Vec::with_capacity(input.row_count());
        let mut total = 0;
        for row in 0..input.row_count() {
            let pieces: Vec<String> = if input.is_null(row, col) {
                vec![String::new()]
            } else {
                input
                    .get_str(row, col)
                    .split(self.delimiter.as_str())
                    .map(str::to_string)
                    .collect()
            };
            total += pieces.len();
            pieces_per_row.push(pieces);
        }

        let schema = input.schema().clone();
        let mut out = Batch::with_capacity_for(schema, total.max(1));
        out.set_row_count(total);
        let mut out_row = 0;
        for row in 0..input.row_count() {
            for piece in &pieces_per_row[row] {
                out.copy_row(out_row, input, row);
                out.set_string(out_row, col, piece);
                out_row += 1;
            }
        }
        Ok(if out_row == 0 { None } else { Some(out) })
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

fn split_csv_list(s: &str) -> Vec<String> {
    s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
}

pub fn noop_schema(_args: &ArgTree, input: &Schema) -> Schema {
    input.clone()
}

pub fn construct_onehot(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let column = args
        .get("column")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("onehot requires `column`"))?
        .to_string();
    Ok(CompiledOp::Transform(Box::new(Onehot::new(column))))
}

pub fn construct_label_encode(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let column = args
        .get("column")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("label-encode requires `column`"))?
        .to_string();
    let output_name = args
        .get("as")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{column}_label"));
    Ok(CompiledOp::Transform(Box::new(LabelEncode::new(column, output_name))))
}

pub fn construct_unpivot(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let value_columns = args
        .get("columns")
        .and_then(|v| v.as_str())
        .map(split_csv_list)
        .ok_or_else(|| anyhow::anyhow!("unpivot requires `columns`"))?;
    Ok(CompiledOp::Transform(Box::new(Unpivot::new(value_columns))))
}

pub fn construct_explode(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let column = args
        .get("column")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("explode requires `column`"))?
        .to_string();
    let delimiter = args.get("delimiter").and_then(|v| v.as_str()).unwrap_or(",").to_string();
    Ok(CompiledOp::Transform(Box::new(Explode::new(column, delimiter))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabflow_core::value::DataType;

    fn strings(values: &[&str]) -> Batch {
        let schema = Schema::new(vec![(ArcStr::from("color"), DataType::String)], true);
        let mut b = Batch::with_capacity_for(schema, values.len());
        b.set_row_count(values.len());
        for (i, v) in values.iter().enumerate() {
            b.set_string(i, 0, v);
        }
        b
    }

    #[test]
    fn onehot_grows_schema_monotonically() {
        let mut onehot = Onehot::new("color".to_string());
        let out1 = onehot.process(&strings(&["red", "blue"])).unwrap().unwrap();
        assert_eq!(out1.n_cols(), 3);
        let out2 = onehot.process(&strings(&["green"])).unwrap().unwrap();
        assert_eq!(out2.n_cols(), 4);
    }

    #[test]
    fn label_encode_assigns_first_seen_order() {
        let mut encoder = LabelEncode::new("color".to_string(), "color_label".to_string());
        let out = encoder.process(&strings(&["blue", "red", "blue"])).unwrap().unwrap();
        assert_eq!(out.get_int64(0, 1), 0);
        assert_eq!(out.get_int64(1, 1), 1);
        assert_eq!(out.get_int64(2, 1), 0);
    }

    #[test]
    fn explode_splits_on_delimiter() {
        let schema = Schema::new(vec![(ArcStr::from("tags"), DataType::String)], true);
        let mut b = Batch::with_capacity_for(schema, 1);
        b.set_row_count(1);
        b.set_string(0, 0, "a|b|c");
        let mut explode = Explode::new("tags".to_string(), "|".to_string());
        let out = explode.process(&b).unwrap().unwrap();
        assert_eq!(out.row_count(), 3);
        assert_eq!(out.get_str(1, 0), "b");
    }
}
