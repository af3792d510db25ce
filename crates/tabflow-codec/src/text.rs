//! Plain-text line decoder/encoder: one `_line` string column, one row
//! per line.

use arcstr::ArcStr;
use tabflow_core::batch::{Batch, Schema};
use tabflow_core::ir::CompiledOp;
use tabflow_core::value::DataType;
use tabflow_core::{ArgTree, Decoder, Encoder, Result};

#[derive(Debug, Clone)]
pub struct TextOptions {
    pub batch_rows: usize,
}

impl Default for TextOptions {
    fn default() -> Self {
        TextOptions { batch_rows: 1024 }
    }
}

impl TextOptions {
    pub fn from_args(args: &ArgTree) -> Self {
        let mut opts = TextOptions::default();
        if let Some(n) = args.get("batch_rows").and_then(|v| v.as_u64()) {
            opts.batch_rows = n as usize;
        }
        opts
    }
}

fn line_schema() -> Schema {
    Schema::new(vec![(ArcStr::from("_line"), DataType::String)], true)
}

pub struct TextDecoder {
    opts: TextOptions,
    buf: tabflow_core::buffer::Buffer,
    current: Option<Batch>,
    current_row: usize,
}

impl TextDecoder {
    pub fn new(opts: TextOptions) -> Self {
        TextDecoder {
            opts,
            buf: tabflow_core::buffer::Buffer::new(),
            current: None,
            current_row: 0,
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let data = self.buf.unread();
        let pos = data.iter().position(|&b| b == b'\n')?;
        let mut end = pos;
        if end > 0 && data[end - 1] == b'\r' {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&data[..end]).into_owned();
        self.buf.consume(pos + 1);
        Some(line)
    }

    fn take_current_batch(&mut self) -> Batch {
        self.current_row = 0;
        self.current.take().expect("take_current_batch called with no pending batch")
    }
}

impl Decoder for TextDecoder {
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<Batch>> {
        self.buf.push(bytes);
        let mut out = Vec::new();
        while let Some(line) = self.next_line() {
            if self.current.is_none() {
                self.current = Some(Batch::with_capacity_for(line_schema(), self.opts.batch_rows));
            }
            let batch = self.current.as_mut().unwrap();
            batch.ensure_capacity(self.current_row + 1);
            batch.set_string(self.current_row, 0, &line);
            self.current_row += 1;
            batch.set_row_count(self.current_row);
            if self.current_row >= self.opts.batch_rows {
                out.push(self.take_current_batch());
            }
        }
        Ok(out)
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.current_row > 0 {
            return Ok(Some(self.take_current_batch()));
        }
        Ok(None)
    }
}

#[derive(Default)]
pub struct TextEncoder;

impl Encoder for TextEncoder {
    fn encode(&mut self, batch: &Batch) -> Result<Vec<u8>> {
        let mut out = String::new();
        let line_col = batch.schema().index_of("_line");
        for row in 0..batch.row_count() {
            match line_col {
                Some(col) if !batch.is_null(row, col) => out.push_str(batch.get_str(row, col)),
                _ => {
                    let cells: Vec<String> = (0..batch.n_cols())
                        .map(|col| batch.get_value(row, col).to_string())
                        .collect();
                    out.push_str(&cells.join("\t"));
                }
            }
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

pub fn construct_decoder(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    Ok(CompiledOp::Decoder(Box::new(TextDecoder::new(TextOptions::from_args(args)))))
}

pub fn construct_encoder(_args: &ArgTree) -> anyhow::Result<CompiledOp> {
    Ok(CompiledOp::Encoder(Box::new(TextEncoder)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_row_per_line() {
        let mut dec = TextDecoder::new(TextOptions::default());
        dec.push(b"one\ntwo\nthree\n").unwrap();
        let batch = dec.flush().unwrap().unwrap();
        assert_eq!(batch.row_count(), 3);
        assert_eq!(batch.get_str(1, 0), "two");
    }

    #[test]
    fn encoder_tab_joins_when_no_line_column() {
        let schema = Schema::new(
            vec![
                (ArcStr::from("a"), DataType::String),
                (ArcStr::from("b"), DataType::String),
            ],
            true,
        );
        let mut batch = Batch::with_capacity_for(schema, 1);
        batch.set_row_count(1);
        batch.set_string(0, 0, "x");
        batch.set_string(0, 1, "y");
        let mut enc = TextEncoder;
        let bytes = enc.encode(&batch).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "x\ty\n");
    }
}
