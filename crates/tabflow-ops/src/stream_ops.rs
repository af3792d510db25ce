//! Streaming, row-order-preserving operators driven off one numeric
//! column: window, step, lead, interpolate, diff, ewma.

use std::collections::VecDeque;

use arcstr::ArcStr;
use tabflow_core::batch::{Batch, Schema};
use tabflow_core::ir::CompiledOp;
use tabflow_core::value::DataType;
use tabflow_core::{ArgTree, Result, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunc {
    Avg,
    Sum,
    Min,
    Max,
    Count,
}

impl WindowFunc {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "avg" => Some(WindowFunc::Avg),
            "sum" => Some(WindowFunc::Sum),
            "min" => Some(WindowFunc::Min),
            "max" => Some(WindowFunc::Max),
            "count" => Some(WindowFunc::Count),
            _ => None,
        }
    }

    fn aggregate(self, values: &VecDeque<f64>) -> f64 {
        match self {
            WindowFunc::Avg => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            WindowFunc::Sum => values.iter().sum(),
            WindowFunc::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            WindowFunc::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            WindowFunc::Count => values.len() as f64,
        }
    }
}

/// Fixed-size sliding window of the last K values of one column. Null
/// input rows pass through with a null result and don't advance the
/// window (per spec's pinned choice over the "treat null as zero"
/// alternative).
pub struct Window {
    column: String,
    k: usize,
    func: WindowFunc,
    output_name: String,
    buf: VecDeque<f64>,
}

impl Window {
    pub fn new(column: String, k: usize, func: WindowFunc, output_name: String) -> Self {
        Window {
            column,
            k,
            func,
            output_name,
            buf: VecDeque::with_capacity(k),
        }
    }
}

impl Transform for Window {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let Some(col) = input.schema().index_of(&self.column) else {
            return Ok(None);
        };
        let mut schema = input.schema().clone();
        schema.push(ArcStr::from(self.output_name.as_str()), DataType::Float64);
        let out_col = schema.len() - 1;
        let mut out = Batch::with_capacity_for(schema, input.row_count());
        out.set_row_count(input.row_count());
        for row in 0..input.row_count() {
            out.copy_row(row, input, row);
            if input.is_null(row, col) {
                out.set_null(row, out_col);
                continue;
            }
            let Some(x) = input.get_value(row, col).as_f64() else {
                out.set_null(row, out_col);
                continue;
            };
            self.buf.push_back(x);
            if self.buf.len() > self.k {
                self.buf.pop_front();
            }
            out.set_float64(row, out_col, self.func.aggregate(&self.buf));
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFunc {
    RunningSum,
    RunningAvg,
    RunningMin,
    RunningMax,
    RunningCount,
    Delta,
    Lag,
    Ratio,
}

impl StepFunc {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "running-sum" => Some(StepFunc::RunningSum),
            "running-avg" => Some(StepFunc::RunningAvg),
            "running-min" => Some(StepFunc::RunningMin),
            "running-max" => Some(StepFunc::RunningMax),
            "running-count" => Some(StepFunc::RunningCount),
            "delta" => Some(StepFunc::Delta),
            "lag" => Some(StepFunc::Lag),
            "ratio" => Some(StepFunc::Ratio),
            _ => None,
        }
    }
}

/// Running, constant-memory aggregation on one column.
pub struct Step {
    column: String,
    func: StepFunc,
    output_name: String,
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
    prev: Option<f64>,
}

impl Step {
    pub fn new(column: String, func: StepFunc, output_name: String) -> Self {
        Step {
            column,
            func,
            output_name,
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            prev: None,
        }
    }

    fn advance(&mut self, x: f64) -> f64 {
        let result = match self.func {
            StepFunc::RunningSum => {
                self.sum += x;
                self.sum
            }
            StepFunc::RunningAvg => {
                self.sum += x;
                self.count += 1;
                self.sum / self.count as f64
            }
            StepFunc::RunningMin => {
                self.min = self.min.min(x);
                self.min
            }
            StepFunc::RunningMax => {
                self.max = self.max.max(x);
                self.max
            }
            StepFunc::RunningCount => {
                self.count += 1;
                self.count as f64
            }
            StepFunc::Delta => self.prev.map(|p| x - p).unwrap_or(0.0),
            StepFunc::Lag => self.prev.unwrap_or(0.0),
            StepFunc::Ratio => self.prev.filter(|p| *p != 0.0).map(|p| x / p).unwrap_or(0.0),
        };
        self.prev = Some(x);
        result
    }
}

impl Transform for Step {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let Some(col) = input.schema().index_of(&self.column) else {
            return Ok(None);
        };
        let mut schema = input.schema().clone();
        schema.push(ArcStr::from(self.output_name.as_str()), DataType::Float64);
        let out_col = schema.len() - 1;
        let mut out = Batch::with_capacity_for(schema, input.row_count());
        out.set_row_count(input.row_count());
        for row in 0..input.row_count() {
            out.copy_row(row, input, row);
            if input.is_null(row, col) {
                out.set_null(row, out_col);
                continue;
            }
            let Some(x) = input.get_value(row, col).as_f64() else {
                out.set_null(row, out_col);
                continue;
            };
            let first_observation = self.func == StepFunc::Delta && self.prev.is_none();
            let value = self.advance(x);
            if first_observation {
                out.set_null(row, out_col);
            } else {
                out.set_float64(row, out_col, value);
            }
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

struct BufferedRow {
    batch: Batch,
}

/// Looks N rows ahead on `column`, buffering up to N rows across batch
/// boundaries. On flush, any still-buffered rows emit with null
/// lookahead.
pub struct Lead {
    column: String,
    n: usize,
    output_name: String,
    pending: VecDeque<BufferedRow>,
}

impl Lead {
    pub fn new(column: String, n: usize, output_name: String) -> Self {
        Lead {
            column,
            n,
            output_name,
            pending: VecDeque::new(),
        }
    }

    fn build_output(&self, schema: &Schema) -> Schema {
        let mut out = schema.clone();
        out.push(ArcStr::from(self.output_name.as_str()), DataType::Float64);
        out
    }

    fn emit_with_lookahead(&self, out: &mut Batch, out_row: usize, source: &Batch, source_row: usize, lookahead: Option<f64>) {
        out.copy_row(out_row, source, source_row);
        let out_col = out.n_cols() - 1;
        match lookahead {
            Some(v) => out.set_float64(out_row, out_col, v),
            None => out.set_null(out_row, out_col),
        }
    }
}

impl Transform for Lead {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let Some(col) = input.schema().index_of(&self.column) else {
            return Ok(None);
        };
        for row in 0..input.row_count() {
            let mut one = Batch::with_capacity_for(input.schema().clone(), 1);
            one.set_row_count(1);
            one.copy_row(0, input, row);
            self.pending.push_back(BufferedRow { batch: one });
        }

        let mut ready_rows = Vec::new();
        while self.pending.len() > self.n {
            let lookahead_source = &self.pending[self.n];
            let lookahead = if lookahead_source.batch.is_null(0, col) {
                None
            } else {
                lookahead_source.batch.get_value(0, col).as_f64()
            };
            let front = self.pending.pop_front().unwrap();
            ready_rows.push((front.batch, lookahead));
        }

        if ready_rows.is_empty() {
            return Ok(None);
        }
        let schema = self.build_output(ready_rows[0].0.schema());
        let mut out = Batch::with_capacity_for(schema, ready_rows.len());
        out.set_row_count(ready_rows.len());
        for (i, (row_batch, lookahead)) in ready_rows.iter().enumerate() {
            self.emit_with_lookahead(&mut out, i, row_batch, 0, *lookahead);
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let schema = self.build_output(self.pending[0].batch.schema());
        let mut out = Batch::with_capacity_for(schema, self.pending.len());
        out.set_row_count(self.pending.len());
        for (i, row) in self.pending.drain(..).enumerate() {
            self.emit_with_lookahead(&mut out, i, &row.batch, 0, None);
        }
        Ok(Some(out))
    }
}

enum InterpolateMode {
    Forward,
    Backward,
    Linear,
}

/// Fills nulls in one numeric column. Forward uses the last seen
/// non-null; backward/linear buffer consecutive null rows until the
/// next non-null (the "right anchor") arrives.
pub struct Interpolate {
    column: String,
    mode: InterpolateMode,
    last_value: Option<f64>,
    buffered_nulls: Vec<Batch>,
}

impl Interpolate {
    pub fn new(column: String, mode: InterpolateMode) -> Self {
        Interpolate {
            column,
            mode,
            last_value: None,
            buffered_nulls: Vec::new(),
        }
    }

    fn resolve_buffered(&mut self, right: Option<f64>, col: usize) -> Vec<Batch> {
        let n = self.buffered_nulls.len();
        let mut resolved = Vec::with_capacity(n);
        for (i, mut row) in self.buffered_nulls.drain(..).enumerate() {
            let value = match self.mode {
                InterpolateMode::Forward => unreachable!("forward never buffers"),
                InterpolateMode::Backward => right,
                InterpolateMode::Linear => match (self.last_value, right) {
                    (Some(last), Some(r)) => Some(last + (i as f64 + 1.0) / (n as f64 + 1.0) * (r - last)),
                    (None, Some(r)) => Some(r),
                    (Some(last), None) => Some(last),
                    (None, None) => None,
                },
            };
            match value {
                Some(v) => row.set_float64(0, col, v),
                None => row.set_null(0, col),
            }
            resolved.push(row);
        }
        resolved
    }
}

impl Transform for Interpolate {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let Some(col) = input.schema().index_of(&self.column) else {
            return Ok(None);
        };
        let mut output_rows: Vec<Batch> = Vec::new();

        for row in 0..input.row_count() {
            let mut one = Batch::with_capacity_for(input.schema().clone(), 1);
            one.set_row_count(1);
            one.copy_row(0, input, row);

            if !input.is_null(row, col) {
                let x = input.get_value(row, col).as_f64();
                if !self.buffered_nulls.is_empty() {
                    output_rows.extend(self.resolve_buffered(x, col));
                }
                self.last_value = x;
                output_rows.push(one);
                continue;
            }

            match self.mode {
                InterpolateMode::Forward => {
                    match self.last_value {
                        Some(v) => one.set_float64(0, col, v),
                        None => one.set_null(0, col),
                    }
                    output_rows.push(one);
                }
                InterpolateMode::Backward | InterpolateMode::Linear => {
                    self.buffered_nulls.push(one);
                }
            }
        }

        if output_rows.is_empty() {
            return Ok(None);
        }
        let schema = output_rows[0].schema().clone();
        let mut out = Batch::with_capacity_for(schema, output_rows.len());
        out.set_row_count(output_rows.len());
        for (i, row) in output_rows.iter().enumerate() {
            out.copy_row(i, row, 0);
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        if self.buffered_nulls.is_empty() {
            return Ok(None);
        }
        let col = self.buffered_nulls[0].schema().index_of(&self.column).unwrap();
        let resolved = self.resolve_buffered(None, col);
        let schema = resolved[0].schema().clone();
        let mut out = Batch::with_capacity_for(schema, resolved.len());
        out.set_row_count(resolved.len());
        for (i, row) in resolved.iter().enumerate() {
            out.copy_row(i, row, 0);
        }
        Ok(Some(out))
    }
}

fn binomial(n: u32, k: u32) -> f64 {
    let mut result = 1.0f64;
    for i in 0..k {
        result = result * (n - i) as f64 / (i + 1) as f64;
    }
    result
}

/// k-th order difference: `sum_{j=0..k} (-1)^j * C(k,j) * x_{n-j}`, null
/// for the first k rows.
pub struct Diff {
    column: String,
    k: usize,
    output_name: String,
    history: VecDeque<f64>,
}

impl Diff {
    pub fn new(column: String, k: usize, output_name: String) -> Self {
        Diff {
            column,
            k,
            output_name,
            history: VecDeque::with_capacity(k + 1),
        }
    }
}

impl Transform for Diff {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let Some(col) = input.schema().index_of(&self.column) else {
            return Ok(None);
        };
        let mut schema = input.schema().clone();
        schema.push(ArcStr::from(self.output_name.as_str()), DataType::Float64);
        let out_col = schema.len() - 1;
        let mut out = Batch::with_capacity_for(schema, input.row_count());
        out.set_row_count(input.row_count());
        for row in 0..input.row_count() {
            out.copy_row(row, input, row);
            if input.is_null(row, col) {
                out.set_null(row, out_col);
                continue;
            }
            let Some(x) = input.get_value(row, col).as_f64() else {
                out.set_null(row, out_col);
                continue;
            };
            self.history.push_back(x);
            if self.history.len() > self.k + 1 {
                self.history.pop_front();
            }
            if self.history.len() <= self.k {
                out.set_null(row, out_col);
                continue;
            }
            let k = self.k as u32;
            let mut acc = 0.0;
            for j in 0..=self.k {
                let x_nj = self.history[self.history.len() - 1 - j];
                let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                acc += sign * binomial(k, j as u32) * x_nj;
            }
            out.set_float64(row, out_col, acc);
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

/// Exponentially weighted moving average with parameter alpha.
pub struct Ewma {
    column: String,
    alpha: f64,
    output_name: String,
    current: Option<f64>,
}

impl Ewma {
    pub fn new(column: String, alpha: f64, output_name: String) -> Self {
        Ewma {
            column,
            alpha,
            output_name,
            current: None,
        }
    }
}

impl Transform for Ewma {
    fn process(&mut self, input: &Batch) -> Result<Option<Batch>> {
        let Some(col) = input.schema().index_of(&self.column) else {
            return Ok(None);
        };
        let mut schema = input.schema().clone();
        schema.push(ArcStr::from(self.output_name.as_str()), DataType::Float64);
        let out_col = schema.len() - 1;
        let mut out = Batch::with_capacity_for(schema, input.row_count());
        out.set_row_count(input.row_count());
        for row in 0..input.row_count() {
            out.copy_row(row, input, row);
            if input.is_null(row, col) {
                out.set_null(row, out_col);
                continue;
            }
            let Some(x) = input.get_value(row, col).as_f64() else {
                out.set_null(row, out_col);
                continue;
            };
            let updated = match self.current {
                Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
                None => x,
            };
            self.current = Some(updated);
            out.set_float64(row, out_col, updated);
        }
        Ok(Some(out))
    }

    fn flush(&mut self) -> Result<Option<Batch>> {
        Ok(None)
    }
}

pub fn noop_schema(_args: &ArgTree, input: &Schema) -> Schema {
    input.clone()
}

fn arg_str(args: &ArgTree, name: &str) -> anyhow::Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("missing required argument `{name}`"))
}

fn output_name(args: &ArgTree, default: &str) -> String {
    args.get("as").and_then(|v| v.as_str()).unwrap_or(default).to_string()
}

pub fn construct_window(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let column = arg_str(args, "column")?;
    let k = args.get("k").and_then(|v| v.as_u64()).ok_or_else(|| anyhow::anyhow!("window requires `k`"))? as usize;
    let func_name = arg_str(args, "func")?;
    let func = WindowFunc::parse(&func_name).ok_or_else(|| anyhow::anyhow!("unknown window function `{func_name}`"))?;
    let out_name = output_name(args, &format!("{func_name}_{column}"));
    Ok(CompiledOp::Transform(Box::new(Window::new(column, k, func, out_name))))
}

pub fn construct_step(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let column = arg_str(args, "column")?;
    let func_name = arg_str(args, "func")?;
    let func = StepFunc::parse(&func_name).ok_or_else(|| anyhow::anyhow!("unknown step function `{func_name}`"))?;
    let out_name = output_name(args, &format!("{func_name}_{column}"));
    Ok(CompiledOp::Transform(Box::new(Step::new(column, func, out_name))))
}

pub fn construct_lead(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let column = arg_str(args, "column")?;
    let n = args.get("n").and_then(|v| v.as_u64()).ok_or_else(|| anyhow::anyhow!("lead requires `n`"))? as usize;
    let out_name = output_name(args, &format!("lead_{column}"));
    Ok(CompiledOp::Transform(Box::new(Lead::new(column, n, out_name))))
}

pub fn construct_interpolate(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let column = arg_str(args, "column")?;
    let mode = match args.get("mode").and_then(|v| v.as_str()) {
        Some("backward") => InterpolateMode::Backward,
        Some("linear") => InterpolateMode::Linear,
        _ => InterpolateMode::Forward,
    };
    Ok(CompiledOp::Transform(Box::new(Interpolate::new(column, mode))))
}

pub fn construct_diff(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let column = arg_str(args, "column")?;
    let k = args.get("k").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
    let out_name = output_name(args, &format!("diff_{column}"));
    Ok(CompiledOp::Transform(Box::new(Diff::new(column, k, out_name))))
}

pub fn construct_ewma(args: &ArgTree) -> anyhow::Result<CompiledOp> {
    let column = arg_str(args, "column")?;
    let alpha = args.get("alpha").and_then(|v| v.as_f64()).ok_or_else(|| anyhow::anyhow!("ewma requires `alpha`"))?;
    let out_name = output_name(args, &format!("ewma_{column}"));
    Ok(CompiledOp::Transform(Box::new(Ewma::new(column, alpha, out_name))))
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn window_avg_over_last_k() {
        let mut window = Window::new("v".to_string(), 2, WindowFunc::Avg, "avg_v".to_string());
        let out = window.process(&ints(&[1, 2, 3, 4])).unwrap().unwrap();
        assert_eq!(out.get_float64(0, 1), 1.0);
        assert_eq!(out.get_float64(1, 1), 1.5);
        assert_eq!(out.get_float64(2, 1), 2.5);
        assert_eq!(out.get_float64(3, 1), 3.5);
    }

    #[test]
    fn window_null_row_passes_through_without_advancing() {
        let schema = Schema::new(vec![(ArcStr::from("v"), DataType::Int64)], true);
        let mut input = Batch::with_capacity_for(schema, 4);
        input.set_row_count(4);
        input.set_int64(0, 0, 1);
        input.set_null(1, 0);
        input.set_int64(2, 0, 3);
        input.set_int64(3, 0, 5);

        let mut window = Window::new("v".to_string(), 2, WindowFunc::Avg, "avg_v".to_string());
        let out = window.process(&input).unwrap().unwrap();
        assert_eq!(out.get_float64(0, 1), 1.0);
        assert!(out.is_null(1, 1));
        // the null row at index 1 did not enter the window: row 2's
        // average is still over {1, 3}, not {null, 3}.
        assert_eq!(out.get_float64(2, 1), 2.0);
        assert_eq!(out.get_float64(3, 1), 4.0);
    }

    #[test]
    fn lead_emits_lookahead_then_flushes_remainder_as_null() {
        let mut lead = Lead::new("v".to_string(), 1, "lead_v".to_string());
        let out = lead.process(&ints(&[10, 20, 30])).unwrap().unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.get_float64(0, 1), 20.0);
        assert_eq!(out.get_float64(1, 1), 30.0);
        let flushed = lead.flush().unwrap().unwrap();
        assert_eq!(flushed.row_count(), 1);
        assert!(flushed.is_null(0, 1));
    }

    #[test]
    fn diff_first_k_rows_null() {
        let mut diff = Diff::new("v".to_string(), 1, "diff_v".to_string());
        let out = diff.process(&ints(&[5, 8, 12])).unwrap().unwrap();
        assert!(out.is_null(0, 1));
        assert_eq!(out.get_float64(1, 1), 3.0);
        assert_eq!(out.get_float64(2, 1), 4.0);
    }

    #[test]
    fn ewma_first_value_passes_through() {
        let mut ewma = Ewma::new("v".to_string(), 0.5, "ewma_v".to_string());
        let out = ewma.process(&ints(&[10, 20])).unwrap().unwrap();
        assert_eq!(out.get_float64(0, 1), 10.0);
        assert_eq!(out.get_float64(1, 1), 15.0);
    }
}
