//! JSONL decoder/encoder. Schema is established from the first parsed
//! object and frozen from then on — type widening is restricted to that
//! first record rather than continuing across the decoder's whole
//! lifetime, the same "first batch decides the shape" simplification
//! the CSV decoder makes for its header/type-detection pass, and one
//! that avoids silently discarding already-written column data when a
//! later row would otherwise force a retype.

use arcstr::ArcStr;
use serde_json::{Map, Value as Json};
use tabflow_core::batch::{Batch, Schema};
use tabflow_core::dates;
use tabflow_core::ir::CompiledOp;
use tabflow_core::value::{DataType, Value};
use tabflow_core::{ArgTree, Decoder, Encoder, Result};

#[derive(Debug, Clone)]
pub struct JsonlOptions {
    pub batch_rows: usize,
}

impl Default for JsonlOptions {
    fn default() -> Self {
        JsonlOptions { batch_rows: 1024 }
    }
}

impl JsonlOptions {
    pub fn from_args(args: &ArgTree) -> Self {
        let mut opts = JsonlOptions::default();
        if let Some(n) = args.get("batch_rows").and_then(|v| v.as_u64()) {
            opts.batch_rows = n as usize;
        }
        opts
    }
}

fn json_type(v: &Json) -> DataType {
    match v {
        Json::Null => DataType::Null,
        Json::Bool(_) => DataType::Bool,
        Json::Number(n) => {
            if n.is_i64() || n.is_u64() {
                DataType::Int64
            } else {
                DataType::Float64
            }
        }
        Json::String(_) => DataType::String,
        Json::Array(_) | Json::Object(_) => DataType::String,
    }
}

fn json_to_cell(v: &Json, ty: DataType) -> Option<Value> {
    match (ty, v) {
        (_, Json::Null) => None,
        (DataType::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
        (DataType::Int64, Json::Number(n)) if n.is_i64() || n.is_u64() => {
            n.as_i64().map(Value::Int64)
        }
        (DataType::Float64, Json::Number(n)) => n.as_f64().map(Value::Float64),
        (DataType::String, Json::String(s)) => Some(Value::String(s.clone())),
        (DataType::String, other) => Some(Value::String(other.to_string())),
        _ => None,
    }
}

fn value_to_json(v: &Value) -> Json {
    match v {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int64(i) => Json::from(*i),
        Value::Float64(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.clone()),
        Value::Date(d) => Json::String(dates::format_date(*d)),
        Value::Timestamp(t) => Json::String(dates::format_timestamp(*t)),
    }
}

pub struct JsonlDecoder {
    opts: JsonlOptions,
    buf: tabflow_core::buffer::Buffer,
    schema: Option<Schema>,
    current: Option<Batch>,
    current_row: usize,
}

impl JsonlDecoder {
    pub fn new(opts: JsonlOptions) -> Self {
        JsonlDecoder {
            opts,
            buf: tabflow_core::buffer::Buffer::new(),
            schema: None,
            current: None,
            current_row: 0,
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let data = self.buf.unread();
        let pos = data.iter().position(|&b| b == b'\n')?;
        let line = String::from_utf8_lossy(&data[..pos]).into_owned();
        self.buf.consume(pos + 1);
        Some(line)
    }

    fn establish_schema(&mut self, obj: &Map<String, Json>) {
        let columns: Vec<(ArcStr, DataType)> = obj
            .iter()
            .map(|(k, v)| (ArcStr::from(k.as_str()), json_type(v)))
            .collect();
        self.schema = Some(Schema::new(columns, true));
    }

    fn append_row(&mut self, obj: &Map<String, Json>) {
        let schema = self.schema.clone().expect("schema established before append");
        if self.current.is_none() {
            self.current = Some(Batch::with_capacity_for(schema.clone(), self.opts.batch_rows));
        }
        let batch = self.current.as_mut().unwrap();
        batch.ensure_capacity(self.current_row + 1);
        for col in 0..schema.len() {
            let name = schema.name(col).to_string();
            let ty = schema.type_of(col);
            match obj.get(&name).and_then(|v| json_to_cell(v, ty)) {
                Some(v) => batch.set_value(self.current_row, col, &v),
                None => batch.set_null(self.current_row, col),
            }
        }
        self.current_row += 1;
        batch.set_row_count(self.current_row);
    }

    fn take_current_batch(&mut self) -> Batch {
        self.current_row = 0;
        self.current.take().expect("take_current_batch called with no pending batch")
    }
}

impl Decoder for JsonlDecoder {
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<Batch>> {
        self.buf.push(bytes);
        let mut out = Vec::new();
        while let Some(line) = self.next_line() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(Json::Object(obj)) = serde_json::from_str::<Json>(trimmed) else {
                continue;
            };
            if self.schema.is_none() {
                self.establish_schema(&obj);
            }
            self.append_row(&obj);
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
pub struct JsonlEncoder;

impl Encoder for JsonlEncoder {
    fn encode(&mut self, batch: &Batch) -> Result<Vec<u8>> {
        let mut out = String::new();
        for row in 0..batch.row_count() {
            let mut obj = Map::new();
            for col in 0..batch.n_cols() {
                let name = batch.schema().name(col).to_string();
                obj.insert(name, value_to_json(&batch.get_value(row, col)));
            }
            out.push_str(&serde_json::to_string(&Json::Object(obj)).unwrap_or_default());
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

pub fn construct_decoder(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    Ok(CompiledOp::Decoder(Box::new(JsonlDecoder::new(JsonlOptions::from_args(args)))))
}

pub fn construct_encoder(_args: &ArgTree) -> anyhow::Result<CompiledOp> {
    Ok(CompiledOp::Encoder(Box::new(JsonlEncoder)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn establishes_schema_from_first_object() {
        let mut dec = JsonlDecoder::new(JsonlOptions::default());
        dec.push(b"{\"a\":1,\"b\":\"x\"}\n{\"a\":2,\"b\":\"y\"}\n").unwrap();
        let batch = dec.flush().unwrap().unwrap();
        assert_eq!(batch.row_count(), 2);
        assert_eq!(batch.get_int64(1, 0), 2);
        assert_eq!(batch.get_str(1, 1), "y");
    }

    #[test]
    fn missing_key_becomes_null() {
        let mut dec = JsonlDecoder::new(JsonlOptions::default());
        dec.push(b"{\"a\":1,\"b\":\"x\"}\n{\"a\":2}\n").unwrap();
        let batch = dec.flush().unwrap().unwrap();
        assert!(batch.is_null(1, 1));
    }

    #[test]
    fn malformed_line_is_skipped_silently() {
        let mut dec = JsonlDecoder::new(JsonlOptions::default());
        dec.push(b"{\"a\":1}\nnot json\n{\"a\":2}\n").unwrap();
        let batch = dec.flush().unwrap().unwrap();
        assert_eq!(batch.row_count(), 2);
    }

    #[test]
    fn round_trips_values() {
        let mut dec = JsonlDecoder::new(JsonlOptions::default());
        dec.push(b"{\"a\":1,\"b\":true,\"c\":null}\n").unwrap();
        let batch = dec.flush().unwrap().unwrap();
        let mut enc = JsonlEncoder;
        let bytes = enc.encode(&batch).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap().trim(),
            "{\"a\":1,\"b\":true,\"c\":null}"
        );
    }
}
