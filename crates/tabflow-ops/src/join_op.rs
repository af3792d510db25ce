//! One-shot build/probe join: the lookup file loads entirely on the
//! first `process` call, then every input row probes a key → row-index
//! multi-map built from it.

use std::collections::HashMap;
use std::fs;

use tabflow_codec::{CsvDecoder, CsvOptions};
use tabflow_core::batch::{Batch, Schema};
use tabflow_core::ir::CompiledOp;
use tabflow_core::{ArgTree, Decoder, Result, TabflowError, Transform};

use crate::key::build_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

struct LookupTable {
    batch: Batch,
    right_key_col: usize,
    output_cols: Vec<usize>,
    index: HashMap<String, Vec<usize>>,
}

/// Loads `path` entirely through a CSV decoder and builds a key → row
/// multi-map keyed on `right_col`.
fn load_lookup(path: &str, right_col: &str) -> anyhow::Result<LookupTable> {
    let bytes = fs::read(path).map_err(|e| anyhow::anyhow!("join: failed to read lookup file `{path}`: {e}"))?;
    let mut decoder = CsvDecoder::new(CsvOptions::default());
    let mut batches = decoder.push(&bytes)?;
    if let Some(last) = decoder.flush()? {
        batches.push(last);
    }

    let schema = batches
        .first()
        .map(|b| b.schema().clone())
        .unwrap_or_else(Schema::empty);
    let total_rows: usize = batches.iter().map(|b| b.row_count()).sum();
    let mut merged = Batch::with_capacity_for(schema.clone(), total_rows.max(1));
    merged.set_row_count(total_rows);
    let mut out_row = 0;
    for batch in &batches {
        for row in 0..batch.row_count() {
            merged.copy_row(out_row, batch, row);
            out_row += 1;
        }
    }

    let right_key_col = schema
        .index_of(right_col)
        .ok_or_else(|| anyhow::anyhow!("join: lookup file has no column `{right_col}`"))?;
    let output_cols: Vec<usize> = (0..schema.len()).filter(|&c| c != right_key_col).collect();

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for row in 0..merged.row_count() {
        let key = build_key(&merged, row, &[right_key_col]);
        index.entry(key).or_default().push(row);
    }

    Ok(LookupTable {
        batch: merged,
        right_key_col,
        output_cols,
        index,
    })
}

pub struct Join {
    lookup_path: String,
    left_column: String,
    right_column: String,
    kind: JoinKind,
    table: Option<LookupTable>,
}

impl Join {
    pub fn new(lookup_path: String, left_column: String, right_column: String, kind: JoinKind) -> Self {
        Join {
            lookup_path,
            left_column,
            right_column,
            kind,
            table: None,
        }
    }

    fn output_schema(&self, input_schema: &Schema) -> Schema {
        let mut schema = input_schema.clone();
        if let Some(table) = &self.table {
            for &col in &table.output_cols {
                schema.push(table.batch.schema().name(col).clone(), table.batch.schema().type_of(col));
            }
        }
        schema
    }
}

impl Transform for Join {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if self.table.is_none() {
            self.table = Some(load_lookup(&self.lookup_path, &self.right_column).map_err(TabflowError::Other)?);
        }
        let table = self.table.as_ref().unwrap();
        let Some(left_col) = input.schema().index_of(&self.left_column) else {
            return Ok(None);
        };

        let out_schema = self.output_schema(input.schema());
        let n_out_cols = table.output_cols.len();
        let mut out = Batch::with_capacity_for(out_schema, input.row_count().max(1));
        let mut out_row = 0;

        for row in 0..input.row_count() {
            let key = build_key(input, row, &[left_col]);
            match table.index.get(&key) {
                Some(matches) => {
                    for &lookup_row in matches {
                        out.ensure_capacity(out_row + 1);
                        out.copy_row(out_row, input, row);
                        for (i, &col) in table.output_cols.iter().enumerate() {
                            let dst_col = input.n_cols() + i;
                            if table.batch.is_null(lookup_row, col) {
                                out.set_null(out_row, dst_col);
                            } else {
                                out.set_value(out_row, dst_col, &table.batch.get_value(lookup_row, col));
                            }
                        }
                        out_row += 1;
                    }
                }
                None => {
                    if self.kind == JoinKind::Left {
                        out.ensure_capacity(out_row + 1);
                        out.copy_row(out_row, input, row);
                        for i in 0..n_out_cols {
                            out.set_null(out_row, input.n_cols() + i);
                        }
                        out_row += 1;
                    }
                }
            }
        }
        out.set_row_count(out_row);
        Ok(if out_row == 0 { None } else { Some(out) })
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

pub fn schema_fn(args: &ArgTree, input: &Schema) -> Schema {
    let mut schema = input.clone();
    if let (Some(path), Some(right_col)) = (
        args.get("file").and_then(|v| v.as_str()),
        args.get("right_on").and_then(|v| v.as_str()),
    ) {
        if let Ok(bytes) = std::fs::read(path) {
            let mut decoder = CsvDecoder::new(CsvOptions::default());
            if let Ok(mut batches) = decoder.push(&bytes) {
                if let Ok(Some(last)) = decoder.flush() {
                    batches.push(last);
                }
                if let Some(first) = batches.first() {
                    for col in 0..first.schema().len() {
                        if first.schema().name(col).as_str() != right_col {
                            schema.push(first.schema().name(col).clone(), first.schema().type_of(col));
                        }
                    }
                }
            }
        }
    }
    schema
}

pub fn construct_join(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let file = args
        .get("file")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("join requires `file`"))?
        .to_string();
    let left_column = args
        .get("left_on")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("join requires `left_on`"))?
        .to_string();
    let right_column = args
        .get("right_on")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("join requires `right_on`"))?
        .to_string();
    let kind = match args.get("how").and_then(|v| v.as_str()) {
        Some("left") => JoinKind::Left,
        _ => JoinKind::Inner,
    };
    Ok(CompiledOp::Transform(Box::new(Join::new(file, left_column, right_column, kind))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcstr::ArcStr;
    use tabflow_core::value::DataType;

    fn write_lookup(contents: &str) -> tempfile_path::TempCsv {
        tempfile_path::TempCsv::new(contents)
    }

    mod tempfile_path {
        use std::io::Write;

        pub struct TempCsv {
            pub path: String,
        }

        impl TempCsv {
            pub fn new(contents: &str) -> Self {
                let path = format!(
                    "{}/tabflow-join-test-{}-{}.csv",
                    std::env::temp_dir().display(),
                    std::process::id(),
                    contents.len()
                );
                let mut f = std::fs::File::create(&path).unwrap();
                f.write_all(contents.as_bytes()).unwrap();
                TempCsv { path }
            }
        }

        impl Drop for TempCsv {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    fn left_batch() -> Batch {
        let schema = Schema::new(vec![(ArcStr::from("id"), DataType::Int64)], true);
        let mut b = Batch::with_capacity_for(schema, 2);
        b.set_row_count(2);
        b.set_int64(0, 0, 1);
        b.set_int64(1, 0, 2);
        b
    }

    #[test]
    fn inner_join_skips_unmatched_rows() {
        let lookup = write_lookup("id,name\n1,Alice\n");
        let mut join = Join::new(lookup.path.clone(), "id".to_string(), "id".to_string(), JoinKind::Inner);
        let out = join.process(&left_batch()).unwrap().unwrap();
        assert_eq!(out.row_count(), 1);
        assert_eq!(out.get_str(0, 1), "Alice");
    }

    #[test]
    fn left_join_keeps_unmatched_rows_with_null() {
        let lookup = write_lookup("id,name\n1,Alice\n");
        let mut join = Join::new(lookup.path.clone(), "id".to_string(), "id".to_string(), JoinKind::Left);
        let out = join.process(&left_batch()).unwrap().unwrap();
        assert_eq!(out.row_count(), 2);
        assert!(out.is_null(1, 1));
    }
}
