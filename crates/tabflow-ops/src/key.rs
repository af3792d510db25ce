//! Shared key-building helper for unique/group-agg/frequency/join: a
//! lossless textual concatenation of a row's key columns.

use tabflow_core::batch::Batch;

const SEPARATOR: char = '\x01';

/// Concatenate `cols` from `row` into one key string, using each
/// value's lossless `key_repr` (null sentinel `\N`) and `\x01` as the
/// field separator.
pub fn build_key(batch: &Batch, row: usize, cols: &[usize]) -> String {
    let mut key = String::new();
    for (i, &col) in cols.iter().enumerate() {
        if i > 0 {
            key.push(SEPARATOR);
        }
        key.push_str(&batch.get_value(row, col).key_repr());
    }
    key
}
