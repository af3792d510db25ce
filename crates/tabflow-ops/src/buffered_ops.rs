//! Operators that buffer rows and emit on flush, or that pass a prefix/
//! suffix of the whole stream: sort, head, skip, tail, top, sample.

use std::cmp::Ordering;

use tabflow_core::batch::{Batch, Schema};
use tabflow_core::ir::CompiledOp;
use tabflow_core::value::Value;
use tabflow_core::{ArgTree, Result, Transform};

use crate::common::copy_whole_batch;

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

pub struct SortKey {
    pub column: String,
    pub desc: bool,
}

/// Buffers every row across every batch, then stable-sorts on flush.
pub struct Sort {
    keys: Vec<SortKey>,
    rows: Vec<(Batch, usize)>,
}

impl Sort {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Sort { keys, rows: Vec::new() }
    }
}

impl Transform for Sort {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        for row in 0..input.row_count() {
            let mut one = Batch::with_capacity_for(input.schema().clone(), 1);
            one.set_row_count(1);
            one.copy_row(0, input, row);
            self.rows.push((one, 0));
        }
        Ok(None)
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        let schema = self.rows[0].0.schema().clone();
        let col_indices: Vec<Option<usize>> =
            self.keys.iter().map(|k| schema.index_of(&k.column)).collect();

        self.rows.sort_by(|(a, _), (b, _)| {
            for (key, col) in self.keys.iter().zip(&col_indices) {
                let Some(col) = col else { continue };
                let va = a.get_value(0, *col);
                let vb = b.get_value(0, *col);
                let ord = compare_values(&va, &vb);
                let ord = if key.desc { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        let mut out = Batch::with_capacity_for(schema, self.rows.len());
        out.set_row_count(self.rows.len());
        for (i, (row_batch, _)) in self.rows.iter().enumerate() {
            out.copy_row(i, row_batch, 0);
        }
        Ok(Some(out))
    }
}

/// Passes the first `n` rows total across every batch, drops the rest.
pub struct Head {
    remaining: usize,
}

impl Head {
    pub fn new(n: usize) -> Self {
        Head { remaining: n }
    }
}

impl Transform for Head {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if self.remaining == 0 || input.row_count() == 0 {
            return Ok(None);
        }
        let take = self.remaining.min(input.row_count());
        self.remaining -= take;
        let mut out = Batch::with_capacity_for(input.schema().clone(), take);
        out.set_row_count(take);
        for row in 0..take {
            out.copy_row(row, input, row);
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

/// Drops the first `n` rows total across every batch, passes the rest.
pub struct Skip {
    remaining: usize,
}

impl Skip {
    pub fn new(n: usize) -> Self {
        Skip { remaining: n }
    }
}

impl Transform for Skip {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if input.row_count() == 0 {
            return Ok(None);
        }
        let drop = self.remaining.min(input.row_count());
        self.remaining -= drop;
        let keep = input.row_count() - drop;
        if keep == 0 {
            return Ok(None);
        }
        let mut out = Batch::with_capacity_for(input.schema().clone(), keep);
        out.set_row_count(keep);
        for (out_row, src_row) in (drop..input.row_count()).enumerate() {
            out.copy_row(out_row, input, src_row);
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

/// Keeps the last `n` rows seen in a circular buffer, emitted in
/// arrival order on flush.
pub struct Tail {
    n: usize,
    buf: std::collections::VecDeque<(Batch, usize)>,
}

impl Tail {
    pub fn new(n: usize) -> Self {
        Tail {
            n,
            buf: std::collections::VecDeque::new(),
        }
    }
}

impl Transform for Tail {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        for row in 0..input.row_count() {
            let mut one = Batch::with_capacity_for(input.schema().clone(), 1);
            one.set_row_count(1);
            one.copy_row(0, input, row);
            self.buf.push_back((one, 0));
            if self.buf.len() > self.n {
                self.buf.pop_front();
            }
        }
        Ok(None)
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let schema = self.buf[0].0.schema().clone();
        let mut out = Batch::with_capacity_for(schema, self.buf.len());
        out.set_row_count(self.buf.len());
        for (i, (row_batch, _)) in self.buf.iter().enumerate() {
            out.copy_row(i, row_batch, 0);
        }
        Ok(Some(out))
    }
}

/// Maintains at most `n` rows ordered by `column`; replaces the current
/// extreme when a better candidate arrives. Emits sorted on flush.
pub struct Top {
    n: usize,
    column: String,
    desc: bool,
    rows: Vec<(Batch, Value)>,
}

impl Top {
    pub fn new(n: usize, column: String, desc: bool) -> Self {
        Top {
            n,
            column,
            desc,
            rows: Vec::new(),
        }
    }

    fn is_better(&self, candidate: &Value, worst: &Value) -> bool {
        let ord = compare_values(candidate, worst);
        if self.desc {
            ord == Ordering::Greater
        } else {
            ord == Ordering::Less
        }
    }
}

impl Transform for Top {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let Some(col) = input.schema().index_of(&self.column) else {
            return Ok(None);
        };
        for row in 0..input.row_count() {
            let value = input.get_value(row, col);
            if self.rows.len() < self.n {
                let mut one = Batch::with_capacity_for(input.schema().clone(), 1);
                one.set_row_count(1);
                one.copy_row(0, input, row);
                self.rows.push((one, value));
                continue;
            }
            if self.n == 0 {
                continue;
            }
            let worst_idx = self
                .rows
                .iter()
                .enumerate()
                .min_by(|(_, (_, a)), (_, (_, b))| {
                    let ord = compare_values(a, b);
                    if self.desc { ord } else { ord.reverse() }
                })
                .map(|(i, _)| i)
                .unwrap();
            let worst_value = self.rows[worst_idx].1.clone();
            if self.is_better(&value, &worst_value) {
                let mut one = Batch::with_capacity_for(input.schema().clone(), 1);
                one.set_row_count(1);
                one.copy_row(0, input, row);
                self.rows[worst_idx] = (one, value);
            }
        }
        Ok(None)
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        self.rows.sort_by(|(_, a), (_, b)| {
            let ord = compare_values(a, b);
            if self.desc { ord.reverse() } else { ord }
        });
        let schema = self.rows[0].0.schema().clone();
        let mut out = Batch::with_capacity_for(schema, self.rows.len());
        out.set_row_count(self.rows.len());
        for (i, (row_batch, _)) in self.rows.iter().enumerate() {
            out.copy_row(i, row_batch, 0);
        }
        Ok(Some(out))
    }
}

/// Algorithm R reservoir sampling, size `n`. A row with global index
/// `i >= n` replaces a random reservoir slot with probability
/// `n / (i + 1)`.
pub struct Sample {
    n: usize,
    seen: usize,
    reservoir: Vec<(Batch, usize)>,
    rng: crate::stats_algo::Xorshift,
}

impl Sample {
    pub fn new(n: usize, seed: u64) -> Self {
        Sample {
            n,
            seen: 0,
            reservoir: Vec::new(),
            rng: crate::stats_algo::Xorshift::new(seed),
        }
    }
}

impl Transform for Sample {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        for row in 0..input.row_count() {
            let i = self.seen;
            self.seen += 1;
            if self.reservoir.len() < self.n {
                let mut one = Batch::with_capacity_for(input.schema().clone(), 1);
                one.set_row_count(1);
                one.copy_row(0, input, row);
                self.reservoir.push((one, 0));
                continue;
            }
            if self.n == 0 {
                continue;
            }
            let j = self.rng.next_below((i + 1) as u64) as usize;
            if j < self.n {
                let mut one = Batch::with_capacity_for(input.schema().clone(), 1);
                one.set_row_count(1);
                one.copy_row(0, input, row);
                self.reservoir[j] = (one, 0);
            }
        }
        Ok(None)
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.reservoir.is_empty() {
            return Ok(None);
        }
        let schema = self.reservoir[0].0.schema().clone();
        let mut out = Batch::with_capacity_for(schema, self.reservoir.len());
        out.set_row_count(self.reservoir.len());
        for (i, (row_batch, _)) in self.reservoir.iter().enumerate() {
            out.copy_row(i, row_batch, 0);
        }
        Ok(Some(out))
    }
}

pub fn noop_schema(_args: &ArgTree, input: &Schema) -> Schema {
    input.clone()
}

fn parse_n(args: &ArgTree) -> anyhow::Result<usize> {
    args.get("n")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| anyhow::anyhow!("missing required integer argument `n`"))
}

pub fn construct_sort(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let columns = args
        .get("columns")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("sort requires `columns`"))?;
    let keys = columns
        .iter()
        .filter_map(|c| {
            let name = c.get("name")?.as_str()?.to_string();
            let desc = c.get("desc").and_then(|v| v.as_bool()).unwrap_or(false);
            Some(SortKey { column: name, desc })
        })
        .collect();
    Ok(CompiledOp::Transform(Box::new(Sort::new(keys))))
}

pub fn construct_head(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    Ok(CompiledOp::Transform(Box::new(Head::new(parse_n(args)?))))
}

pub fn construct_skip(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    Ok(CompiledOp::Transform(Box::new(Skip::new(parse_n(args)?))))
}

pub fn construct_tail(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    Ok(CompiledOp::Transform(Box::new(Tail::new(parse_n(args)?))))
}

pub fn construct_top(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let n = parse_n(args)?;
    let column = args
        .get("column")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("top requires `column`"))?
        .to_string();
    let desc = args.get("desc").and_then(|v| v.as_bool()).unwrap_or(true);
    Ok(CompiledOp::Transform(Box::new(Top::new(n, column, desc))))
}

pub fn construct_sample(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let n = parse_n(args)?;
    let seed = args.get("seed").and_then(|v| v.as_u64()).unwrap_or(0x2545_F491_4F6C_DD1D);
    Ok(CompiledOp::Transform(Box::new(Sample::new(n, seed))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcstr::ArcStr;
    use tabflow_core::value::DataType;

    fn ints(values: &[i64]) -> Batch {
        let schema = Schema::new(vec![(ArcStr::from("v"), DataType::Int64)], true);
        let mut b = Batch::with_capacity_for(schema, values.len());
        b.set_row_count(values.len());
        for (i, v) in values.iter().enumerate() {
            b.set_int64(i, 0, *v);
        }
        b
    }

    #[test]
    fn sort_is_stable_and_idempotent() {
        let mut sort = Sort::new(vec![SortKey {
            column: "v".to_string(),
            desc: false,
        }]);
        sort.process(&ints(&[3, 1, 2])).unwrap();
        let out = sort.flush().unwrap().unwrap();
        assert_eq!(
            (0..3).map(|r| out.get_int64(r, 0)).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn head_passes_prefix_across_batches() {
        let mut head = Head::new(2);
        let out1 = head.process(&ints(&[1, 2, 3])).unwrap().unwrap();
        assert_eq!(out1.row_count(), 2);
        let out2 = head.process(&ints(&[4, 5])).unwrap();
        assert!(out2.is_none());
    }

    #[test]
    fn tail_keeps_last_n_in_arrival_order() {
        let mut tail = Tail::new(2);
        tail.process(&ints(&[1, 2, 3, 4])).unwrap();
        let out = tail.flush().unwrap().unwrap();
        assert_eq!(
            (0..2).map(|r| out.get_int64(r, 0)).collect::<Vec<_>>(),
            vec![3, 4]
        );
    }

    #[test]
    fn top_keeps_n_largest() {
        let mut top = Top::new(2, "v".to_string(), true);
        top.process(&ints(&[5, 1, 9, 3])).unwrap();
        let out = top.flush().unwrap().unwrap();
        assert_eq!(
            (0..2).map(|r| out.get_int64(r, 0)).collect::<Vec<_>>(),
            vec![9, 5]
        );
    }

    #[test]
    fn sample_reservoir_never_exceeds_n() {
        let mut sample = Sample::new(3, 42);
        sample.process(&ints(&[1, 2, 3, 4, 5, 6, 7])).unwrap();
        let out = sample.flush().unwrap().unwrap();
        assert_eq!(out.row_count(), 3);
    }
}
