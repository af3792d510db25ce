//! Plain-text, column-aligned table encoder: the DSL's `table`
//! endpoint shortcut (`codec.table.encode`). Encode-only — there is no
//! corresponding decoder, since a rendered table isn't meant to be read
//! back in. No ANSI styling; this is the minimal alignment layer, not
//! the interactive terminal report rendering this crate leaves to an
//! external collaborator.

use tabflow_core::batch::Batch;
use tabflow_core::ir::CompiledOp;
use tabflow_core::{ArgTree, Encoder, Result};

#[derive(Default)]
pub struct TableEncoder {
    header_written: bool,
}

impl TableEncoder {
    pub fn new() -> Self {
        TableEncoder::default()
    }
}

fn pad(cell: &str, width: usize) -> String {
    format!("{cell:<width$}")
}

impl Encoder for TableEncoder {
    fn encode(&mut self, batch: &Batch) -> Result<Vec<u8>> {
        let schema = batch.schema();
        let headers: Vec<String> = schema.names().iter().map(|n| n.as_str().to_string()).collect();
        let rows: Vec<Vec<String>> = (0..batch.row_count())
            .map(|row| {
                (0..batch.n_cols())
                    .map(|col| {
                        if batch.is_null(row, col) {
                            String::new()
                        } else {
                            batch.get_value(row, col).to_string()
                        }
                    })
                    .collect()
            })
            .collect();

        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in &rows {
            for (col, cell) in row.iter().enumerate() {
                widths[col] = widths[col].max(cell.len());
            }
        }

        let mut out = String::new();
        if !self.header_written {
            let line: Vec<String> = headers.iter().zip(&widths).map(|(h, w)| pad(h, *w)).collect();
            out.push_str(line.join("  ").trim_end());
            out.push('\n');
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            out.push_str(rule.join("  ").trim_end());
            out.push('\n');
            self.header_written = true;
        }
        for row in &rows {
            let line: Vec<String> = row.iter().zip(&widths).map(|(c, w)| pad(c, *w)).collect();
            out.push_str(line.join("  ").trim_end());
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

pub fn construct_encoder(_args: &ArgTree) -> anyhow::Result<CompiledOp> {
    Ok(CompiledOp::Encoder(Box::new(TableEncoder::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcstr::ArcStr;
    use tabflow_core::batch::Schema;
    use tabflow_core::value::DataType;

    #[test]
    fn header_and_rows_are_aligned() {
        let schema = Schema::new(
            vec![(ArcStr::from("name"), DataType::String), (ArcStr::from("age"), DataType::Int64)],
            true,
        );
        let mut batch = Batch::with_capacity_for(schema, 2);
        batch.set_row_count(2);
        batch.set_string(0, 0, "Alice");
        batch.set_int64(0, 1, 30);
        batch.set_string(1, 0, "Bob");
        batch.set_int64(1, 1, 9);

        let mut encoder = TableEncoder::new();
        let bytes = encoder.encode(&batch).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name   age");
        assert_eq!(lines[2], "Alice  30");
    }

    #[test]
    fn header_is_written_only_once() {
        let schema = Schema::new(vec![(ArcStr::from("v"), DataType::Int64)], true);
        let mut batch = Batch::with_capacity_for(schema, 1);
        batch.set_row_count(1);
        batch.set_int64(0, 0, 1);

        let mut encoder = TableEncoder::new();
        let first = String::from_utf8(encoder.encode(&batch).unwrap()).unwrap();
        let second = String::from_utf8(encoder.encode(&batch).unwrap()).unwrap();
        assert!(first.contains('-'));
        assert!(!second.contains('-'));
    }
}
