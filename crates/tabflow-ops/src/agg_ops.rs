//! Aggregating operators: group-agg, frequency, normalize, stats. All
//! buffer across batches and emit their sole result on flush.

use std::collections::HashMap;

use arcstr::ArcStr;
use tabflow_core::batch::{Batch, Schema};
use tabflow_core::ir::CompiledOp;
use tabflow_core::value::{DataType, Value};
use tabflow_core::{ArgTree, Result, Transform};

use crate::key::build_key;
use crate::stats_algo::{Histogram, HyperLogLog, P2Estimator, Reservoir, Welford};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl AggFunc {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "sum" => Some(AggFunc::Sum),
            "avg" => Some(AggFunc::Avg),
            "count" => Some(AggFunc::Count),
            "min" => Some(AggFunc::Min),
            "max" => Some(AggFunc::Max),
            _ => None,
        }
    }
}

pub struct AggSpec {
    pub column: String,
    pub func: AggFunc,
    pub output_name: String,
}

#[derive(Default)]
struct AggState {
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
}

impl AggState {
    fn new() -> Self {
        AggState {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            ..Default::default()
        }
    }

    fn update(&mut self, x: f64) {
        self.sum += x;
        self.count += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }
}

/// Builds a key from the group columns (same codec as `unique`) and
/// accumulates sum/count/min/max per aggregated column per key.
pub struct GroupAgg {
    group_columns: Vec<String>,
    aggs: Vec<AggSpec>,
    group_col_idx: Option<Vec<usize>>,
    agg_col_idx: Option<Vec<usize>>,
    groups: HashMap<String, (Vec<Value>, Vec<AggState>)>,
    order: Vec<String>,
}

impl GroupAgg {
    pub fn new(group_columns: Vec<String>, aggs: Vec<AggSpec>) -> Self {
        GroupAgg {
            group_columns,
            aggs,
            group_col_idx: None,
            agg_col_idx: None,
            groups: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl Transform for GroupAgg {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if self.group_col_idx.is_none() {
            self.group_col_idx = Some(
                self.group_columns
                    .iter()
                    .filter_map(|c| input.schema().index_of(c))
                    .collect(),
            );
            self.agg_col_idx = Some(
                self.aggs
                    .iter()
                    .map(|a| input.schema().index_of(&a.column))
                    .collect(),
            );
        }
        let group_idx = self.group_col_idx.clone().unwrap();
        let agg_idx = self.agg_col_idx.clone().unwrap();

        for row in 0..input.row_count() {
            let key = build_key(input, row, &group_idx);
            let entry = self.groups.entry(key.clone()).or_insert_with(|| {
                self.order.push(key.clone());
                let group_vals = group_idx.iter().map(|&c| input.get_value(row, c)).collect();
                let states = (0..self.aggs.len()).map(|_| AggState::new()).collect();
                (group_vals, states)
            });
            for (i, col) in agg_idx.iter().enumerate() {
                if let Some(col) = col {
                    if !input.is_null(row, *col) {
                        if let Some(x) = input.get_value(row, *col).as_f64() {
                            entry.1[i].update(x);
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.order.is_empty() {
            return Ok(None);
        }
        let mut schema = Schema::empty();
        for name in &self.group_columns {
            schema.push(ArcStr::from(name.as_str()), DataType::String);
        }
        for agg in &self.aggs {
            let ty = match agg.func {
                AggFunc::Count => DataType::Int64,
                _ => DataType::Float64,
            };
            schema.push(ArcStr::from(agg.output_name.as_str()), ty);
        }

        let n_groups = self.order.len();
        let mut out = Batch::with_capacity_for(schema, n_groups);
        out.set_row_count(n_groups);
        for (row, key) in self.order.iter().enumerate() {
            let (group_vals, states) = &self.groups[key];
            for (col, v) in group_vals.iter().enumerate() {
                out.set_string(row, col, &v.key_repr());
            }
            for (i, agg) in self.aggs.iter().enumerate() {
                let state = &states[i];
                let out_col = self.group_columns.len() + i;
                match agg.func {
                    AggFunc::Sum => out.set_float64(row, out_col, state.sum),
                    AggFunc::Avg => {
                        let avg = if state.count == 0 { 0.0 } else { state.sum / state.count as f64 };
                        out.set_float64(row, out_col, avg);
                    }
                    AggFunc::Count => out.set_int64(row, out_col, state.count as i64),
                    AggFunc::Min => out.set_float64(row, out_col, if state.count == 0 { 0.0 } else { state.min }),
                    AggFunc::Max => out.set_float64(row, out_col, if state.count == 0 { 0.0 } else { state.max }),
                }
            }
        }
        Ok(Some(out))
    }
}

/// Counts occurrences of a key built from `columns`; sorts by count
/// descending on flush, emitting `(value, count)` pairs.
pub struct Frequency {
    columns: Vec<String>,
    col_idx: Option<Vec<usize>>,
    counts: HashMap<String, (String, u64)>,
}

impl Frequency {
    pub fn new(columns: Vec<String>) -> Self {
        Frequency {
            columns,
            col_idx: None,
            counts: HashMap::new(),
        }
    }
}

impl Transform for Frequency {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if self.col_idx.is_none() {
            self.col_idx = Some(
                self.columns
                    .iter()
                    .filter_map(|c| input.schema().index_of(c))
                    .collect(),
            );
        }
        let cols = self.col_idx.clone().unwrap();
        for row in 0..input.row_count() {
            let key = build_key(input, row, &cols);
            let display = cols
                .iter()
                .map(|&c| input.get_value(row, c).key_repr())
                .collect::<Vec<_>>()
                .join(",");
            let entry = self.counts.entry(key).or_insert((display, 0));
            entry.1 += 1;
        }
        Ok(None)
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.counts.is_empty() {
            return Ok(None);
        }
        let mut rows: Vec<(String, u64)> = self.counts.values().cloned().collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));

        let schema = Schema::new(
            vec![
                (ArcStr::from("value"), DataType::String),
                (ArcStr::from("count"), DataType::Int64),
            ],
            true,
        );
        let mut out = Batch::with_capacity_for(schema, rows.len());
        out.set_row_count(rows.len());
        for (row, (value, count)) in rows.iter().enumerate() {
            out.set_string(row, 0, value);
            out.set_int64(row, 1, *count as i64);
        }
        Ok(Some(out))
    }
}

pub enum NormalizeMethod {
    MinMax,
    ZScore,
}

/// Buffers all rows, accumulates Welford mean/variance and min/max per
/// target column, then rewrites those columns on flush.
pub struct Normalize {
    columns: Vec<String>,
    method: NormalizeMethod,
    batches: Vec<Batch>,
    stats: HashMap<String, Welford>,
}

impl Normalize {
    pub fn new(columns: Vec<String>, method: NormalizeMethod) -> Self {
        Normalize {
            columns,
            method,
            batches: Vec::new(),
            stats: HashMap::new(),
        }
    }
}

impl Transform for Normalize {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if input.row_count() == 0 {
            return Ok(None);
        }
        for name in &self.columns {
            let Some(col) = input.schema().index_of(name) else { continue };
            let w = self.stats.entry(name.clone()).or_insert_with(Welford::new);
            for row in 0..input.row_count() {
                if !input.is_null(row, col) {
                    if let Some(x) = input.get_value(row, col).as_f64() {
                        w.update(x);
                    }
                }
            }
        }
        let mut copy = Batch::with_capacity_for(input.schema().clone(), input.row_count());
        copy.set_row_count(input.row_count());
        for row in 0..input.row_count() {
            copy.copy_row(row, input, row);
        }
        self.batches.push(copy);
        Ok(None)
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.batches.is_empty() {
            return Ok(None);
        }
        let total_rows: usize = self.batches.iter().map(|b| b.row_count()).sum();
        let schema = self.batches[0].schema().clone();
        let col_idx: Vec<(usize, &Welford)> = self
            .columns
            .iter()
            .filter_map(|name| Some((schema.index_of(name)?, self.stats.get(name)?)))
            .collect();

        let mut out = Batch::with_capacity_for(schema, total_rows);
        out.set_row_count(total_rows);
        let mut out_row = 0;
        for batch in &self.batches {
            for row in 0..batch.row_count() {
                out.copy_row(out_row, batch, row);
                for (col, w) in &col_idx {
                    if out.is_null(out_row, *col) {
                        continue;
                    }
                    let Some(x) = out.get_value(out_row, *col).as_f64() else { continue };
                    let normalized = match self.method {
                        NormalizeMethod::MinMax => {
                            let range = w.max - w.min;
                            if range == 0.0 { 0.0 } else { (x - w.min) / range }
                        }
                        NormalizeMethod::ZScore => {
                            let sd = w.stddev();
                            if sd == 0.0 { 0.0 } else { (x - w.mean) / sd }
                        }
                    };
                    out.set_float64(out_row, *col, normalized);
                }
                out_row += 1;
            }
        }
        Ok(Some(out))
    }
}

struct ColumnStats {
    welford: Welford,
    p2: [P2Estimator; 3],
    hll: HyperLogLog,
    histogram: Histogram,
    reservoir: Reservoir<f64>,
}

impl ColumnStats {
    fn new() -> Self {
        ColumnStats {
            welford: Welford::new(),
            p2: [P2Estimator::new(0.25), P2Estimator::new(0.5), P2Estimator::new(0.75)],
            hll: HyperLogLog::new(),
            histogram: Histogram::new(32),
            reservoir: Reservoir::new(10, 0x2545_F491_4F6C_DD1D),
        }
    }

    fn update(&mut self, v: &Value) {
        self.hll.add(&v.key_repr());
        if let Some(x) = v.as_f64() {
            self.welford.update(x);
            for p2 in &mut self.p2 {
                p2.update(x);
            }
            self.histogram.update(x);
            self.reservoir.update(x);
        }
    }
}

/// Per input column, maintains count/mean/variance/moments, three P²
/// quantile estimators, a HyperLogLog distinct-count sketch, an
/// adaptive histogram, and a size-10 reservoir sample. Emits one row
/// per input column with one value per requested statistic.
pub struct Stats {
    requested: Vec<String>,
    columns: Option<Vec<String>>,
    per_column: Vec<(String, ColumnStats)>,
}

impl Stats {
    pub fn new(requested: Vec<String>, columns: Option<Vec<String>>) -> Self {
        Stats {
            requested,
            columns,
            per_column: Vec::new(),
        }
    }

    fn stat_value(name: &str, stats: &ColumnStats) -> Value {
        match name {
            "count" => Value::Int64(stats.welford.count as i64),
            "sum" => Value::Float64(stats.welford.sum),
            "avg" => Value::Float64(stats.welford.avg()),
            "min" => Value::Float64(if stats.welford.count == 0 { 0.0 } else { stats.welford.min }),
            "max" => Value::Float64(if stats.welford.count == 0 { 0.0 } else { stats.welford.max }),
            "var" => Value::Float64(stats.welford.variance()),
            "stddev" => Value::Float64(stats.welford.stddev()),
            "skewness" => Value::Float64(stats.welford.skewness()),
            "kurtosis" => Value::Float64(stats.welford.kurtosis()),
            "p25" => Value::Float64(stats.p2[0].quantile().unwrap_or(0.0)),
            "median" | "p50" => Value::Float64(stats.p2[1].quantile().unwrap_or(0.0)),
            "p75" => Value::Float64(stats.p2[2].quantile().unwrap_or(0.0)),
            "distinct" => Value::Float64(stats.hll.estimate()),
            _ => Value::Null,
        }
    }
}

impl Transform for Stats {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        if self.per_column.is_empty() {
            let names: Vec<String> = match &self.columns {
                Some(cols) => cols.clone(),
                None => input.schema().names().iter().map(|n| n.to_string()).collect(),
            };
            self.per_column = names.into_iter().map(|n| (n, ColumnStats::new())).collect();
        }
        for (name, stats) in &mut self.per_column {
            let Some(col) = input.schema().index_of(name) else { continue };
            for row in 0..input.row_count() {
                if !input.is_null(row, col) {
                    stats.update(&input.get_value(row, col));
                }
            }
        }
        Ok(None)
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.per_column.is_empty() {
            return Ok(None);
        }
        let mut schema = Schema::new(vec![(ArcStr::from("column"), DataType::String)], true);
        for stat in &self.requested {
            let ty = if stat == "count" { DataType::Int64 } else { DataType::Float64 };
            schema.push(ArcStr::from(stat.as_str()), ty);
        }
        let mut out = Batch::with_capacity_for(schema, self.per_column.len());
        out.set_row_count(self.per_column.len());
        for (row, (name, stats)) in self.per_column.iter().enumerate() {
            out.set_string(row, 0, name);
            for (i, stat_name) in self.requested.iter().enumerate() {
                let v = Self::stat_value(stat_name, stats);
                out.set_value(row, 1 + i, &v);
            }
        }
        Ok(Some(out))
    }
}

fn split_csv_list(s: &str) -> Vec<String> {
    s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
}

pub fn construct_group_agg(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let group_columns = args
        .get("group_by")
        .and_then(|v| v.as_str())
        .map(split_csv_list)
        .ok_or_else(|| anyhow::anyhow!("group-agg requires `group_by`"))?;
    let agg_specs = args
        .get("aggs")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("group-agg requires `aggs`"))?;
    let mut aggs = Vec::new();
    for spec in agg_specs {
        let column = spec.get("column").and_then(|v| v.as_str()).ok_or_else(|| anyhow::anyhow!("agg missing `column`"))?;
        let func_name = spec.get("func").and_then(|v| v.as_str()).ok_or_else(|| anyhow::anyhow!("agg missing `func`"))?;
        let func = AggFunc::parse(func_name).ok_or_else(|| anyhow::anyhow!("unknown agg function `{func_name}`"))?;
        let output_name = spec
            .get("as")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{func_name}_{column}"));
        aggs.push(AggSpec {
            column: column.to_string(),
            func,
            output_name,
        });
    }
    Ok(CompiledOp::Transform(Box::new(GroupAgg::new(group_columns, aggs))))
}

pub fn construct_frequency(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let columns = args
        .get("columns")
        .and_then(|v| v.as_str())
        .map(split_csv_list)
        .ok_or_else(|| anyhow::anyhow!("frequency requires `columns`"))?;
    Ok(CompiledOp::Transform(Box::new(Frequency::new(columns))))
}

pub fn construct_normalize(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let columns = args
        .get("columns")
        .and_then(|v| v.as_str())
        .map(split_csv_list)
        .ok_or_else(|| anyhow::anyhow!("normalize requires `columns`"))?;
    let method = match args.get("method").and_then(|v| v.as_str()) {
        Some("zscore") => NormalizeMethod::ZScore,
        _ => NormalizeMethod::MinMax,
    };
    Ok(CompiledOp::Transform(Box::new(Normalize::new(columns, method))))
}

pub fn construct_stats(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let requested = args
        .get("stats")
        .and_then(|v| v.as_str())
        .map(split_csv_list)
        .unwrap_or_else(|| {
            vec!["count", "sum", "avg", "min", "max", "var", "stddev", "median"]
                .into_iter()
                .map(String::from)
                .collect()
        });
    let columns = args.get("columns").and_then(|v| v.as_str()).map(split_csv_list);
    Ok(CompiledOp::Transform(Box::new(Stats::new(requested, columns))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabflow_core::value::DataType;

    fn sample_batch() -> Batch {
        let schema = Schema::new(
            vec![
                (ArcStr::from("category"), DataType::String),
                (ArcStr::from("amount"), DataType::Float64),
            ],
            true,
        );
        let mut b = Batch::with_capacity_for(schema, 4);
        b.set_row_count(4);
        b.set_string(0, 0, "A");
        b.set_float64(0, 1, 10.0);
        b.set_string(1, 0, "B");
        b.set_float64(1, 1, 20.0);
        b.set_string(2, 0, "A");
        b.set_float64(2, 1, 5.0);
        b.set_string(3, 0, "B");
        b.set_float64(3, 1, 8.0);
        b
    }

    #[test]
    fn group_agg_sums_per_key() {
        let mut agg = GroupAgg::new(
            vec!["category".to_string()],
            vec![AggSpec {
                column: "amount".to_string(),
                func: AggFunc::Sum,
                output_name: "total".to_string(),
            }],
        );
        agg.process(&sample_batch()).unwrap();
        let out = agg.flush().unwrap().unwrap();
        assert_eq!(out.row_count(), 2);
        let a_idx = (0..out.row_count()).find(|&r| out.get_str(r, 0) == "A").unwrap();
        assert_eq!(out.get_float64(a_idx, 1), 15.0);
    }

    #[test]
    fn frequency_sorts_by_count_descending() {
        let mut freq = Frequency::new(vec!["category".to_string()]);
        freq.process(&sample_batch()).unwrap();
        let out = freq.flush().unwrap().unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.get_int64(0, 1), 2);
    }

    #[test]
    fn stats_emits_one_row_per_column() {
        let mut stats = Stats::new(vec!["count".to_string(), "avg".to_string()], None);
        stats.process(&sample_batch()).unwrap();
        let out = stats.flush().unwrap().unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.schema().type_of(1), DataType::Int64);
        let amount_row = (0..out.row_count()).find(|&r| out.get_str(r, 0) == "amount").unwrap();
        assert_eq!(out.get_int64(amount_row, 1), 4);
    }
}
