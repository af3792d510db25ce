//! The pipeline orchestrator: owns the compiled decoder/steps/encoder
//! triple plus the four output channels (`main`, `errors`, `stats`,
//! `samples`) and drives bytes → batches → transforms → encoded bytes.
//!
//! Single-threaded, synchronous, no suspension points: `push` runs
//! decoding and every downstream step before returning (spec.md §5). A
//! host achieves pipelining by interleaving `push`/`pull` at its own
//! rate; concurrent pipelines are independent and may run on separate
//! threads.

use serde_json::json;
use tabflow_core::batch::Batch;
use tabflow_core::buffer::Buffer;
use tabflow_core::capabilities::Capabilities;
use tabflow_core::ir::{compile, Plan};
use tracing::{info, warn};

use crate::dsl::{parse_dsl, parse_json_plan};
use crate::registry::registry;

/// One of the four byte streams a pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Main,
    Errors,
    Stats,
    Samples,
}

/// Where a plan's source text came from, driving which parser `Pipeline::create` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    /// The pipe-separated surface DSL (`csv | filter … | csv`).
    Dsl,
    /// The on-disk `.tfp` JSON form (`{"steps": [...]}`).
    Json,
}

/// Running counters the spec asks every pipeline to expose.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub rows_in: u64,
    pub rows_out: u64,
}

pub struct Pipeline {
    compiled: tabflow_core::ir::CompiledPipeline,
    capabilities: Capabilities,
    main: Buffer,
    errors: Buffer,
    stats: Buffer,
    samples: Buffer,
    counters: Counters,
    error: Option<String>,
    finished: bool,
}

impl Pipeline {
    /// Parse, validate, and compile a plan in one step — the spec's
    /// `create(plan_json) → pipeline | error` entry point, generalized
    /// to accept either surface form.
    pub fn create(source: &str, kind: PlanSource) -> anyhow::Result<Self> {
        let mut plan = match kind {
            PlanSource::Dsl => parse_dsl(source)?,
            PlanSource::Json => parse_json_plan(source)?,
        };
        Self::from_plan(&mut plan)
    }

    /// Validate an already-built `Plan` against the static registry and
    /// compile it into a running pipeline.
    pub fn from_plan(plan: &mut Plan) -> anyhow::Result<Self> {
        let reg = registry();
        if !plan.validate(reg) {
            anyhow::bail!(plan.error.clone().unwrap_or_else(|| "plan is not valid".to_string()));
        }
        let capabilities = plan.capabilities;
        let compiled = compile(plan, reg)?;
        info!(steps = compiled.steps.len(), capabilities = ?capabilities, "pipeline compiled");
        Ok(Pipeline {
            compiled,
            capabilities,
            main: Buffer::new(),
            errors: Buffer::new(),
            stats: Buffer::new(),
            samples: Buffer::new(),
            counters: Counters::default(),
            error: None,
            finished: false,
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Append bytes to the decoder; every full batch it completes is
    /// run through the step chain. Decoder or step errors are fatal:
    /// the pipeline records the error and every subsequent call
    /// returns it without doing further work (spec.md §4.7, §7).
    pub fn push(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        if let Some(err) = &self.error {
            anyhow::bail!(err.clone());
        }
        self.counters.bytes_in += bytes.len() as u64;
        let batches = match self.compiled.decoder.push(bytes) {
            Ok(batches) => batches,
            Err(e) => return Err(self.fatal(e.to_string())),
        };
        for batch in batches {
            self.counters.rows_in += batch.row_count() as u64;
            self.drive_batch(batch, 0)?;
        }
        Ok(())
    }

    /// Flush the decoder (running its trailing batch through the
    /// chain), then flush each step in order so a late-emitting
    /// aggregator's output still traverses every *subsequent* step
    /// before reaching the encoder, then flush the encoder and append
    /// the stats-channel summary. Idempotent.
    pub fn finish(&mut self) -> anyhow::Result<()> {
        if self.finished {
            return Ok(());
        }
        if let Some(err) = &self.error {
            anyhow::bail!(err.clone());
        }
        match self.compiled.decoder.flush() {
            Ok(Some(batch)) => {
                self.counters.rows_in += batch.row_count() as u64;
                self.drive_batch(batch, 0)?;
            }
            Ok(None) => {}
            Err(e) => return Err(self.fatal(e.to_string())),
        }

        for i in 0..self.compiled.steps.len() {
            let flushed = match self.compiled.steps[i].flush() {
                Ok(b) => b,
                Err(e) => return Err(self.fatal(e.to_string())),
            };
            if let Some(batch) = flushed {
                self.drive_batch(batch, i + 1)?;
            }
        }

        match self.compiled.encoder.flush() {
            Ok(bytes) => {
                self.counters.bytes_out += bytes.len() as u64;
                self.main.push(&bytes);
            }
            Err(e) => return Err(self.fatal(e.to_string())),
        }

        let summary = json!({
            "rows_in": self.counters.rows_in,
            "rows_out": self.counters.rows_out,
            "bytes_in": self.counters.bytes_in,
            "bytes_out": self.counters.bytes_out,
        });
        self.stats.push(summary.to_string().as_bytes());
        self.stats.push(b"\n");
        self.finished = true;
        Ok(())
    }

    /// Drain every unread byte from a channel, leaving it empty.
    pub fn pull(&mut self, channel: Channel) -> Vec<u8> {
        self.channel_buffer(channel).drain_all()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn channel_buffer(&mut self, channel: Channel) -> &mut Buffer {
        match channel {
            Channel::Main => &mut self.main,
            Channel::Errors => &mut self.errors,
            Channel::Stats => &mut self.stats,
            Channel::Samples => &mut self.samples,
        }
    }

    fn fatal(&mut self, message: String) -> anyhow::Error {
        warn!(error = %message, "pipeline step failed, aborting run");
        self.push_error_line(&message);
        self.error = Some(message.clone());
        anyhow::anyhow!(message)
    }

    fn push_error_line(&mut self, message: &str) {
        let line = json!({ "error": message });
        self.errors.push(line.to_string().as_bytes());
        self.errors.push(b"\n");
    }

    /// Walk `steps[start..]`; a step emitting `None` short-circuits the
    /// remainder of the chain for this batch. Whatever survives is
    /// encoded to the main channel. `start` lets `finish` re-enter the
    /// chain partway through, since a step's flush output must still
    /// traverse steps after it.
    fn drive_batch(&mut self, batch: Batch, start: usize) -> anyhow::Result<()> {
        let mut current = Some(batch);
        for step in self.compiled.steps.iter_mut().skip(start) {
            let Some(b) = current.take() else { break };
            match step.process(&b) {
                Ok(next) => current = next,
                Err(e) => return Err(self.fatal(e.to_string())),
            }
        }
        if let Some(final_batch) = current {
            self.counters.rows_out += final_batch.row_count() as u64;
            match self.compiled.encoder.encode(&final_batch) {
                Ok(bytes) => {
                    self.counters.bytes_out += bytes.len() as u64;
                    self.main.push(&bytes);
                }
                Err(e) => return Err(self.fatal(e.to_string())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_and_select_end_to_end() {
        let mut p = Pipeline::create(r#"csv | filter col(age) > 25 | select name,age | csv"#, PlanSource::Dsl).unwrap();
        p.push(b"name,age\nAlice,30\nBob,20\nCarol,40\n").unwrap();
        p.finish().unwrap();
        let out = String::from_utf8(p.pull(Channel::Main)).unwrap();
        assert_eq!(out, "name,age\nAlice,30\nCarol,40\n");
    }

    #[test]
    fn derive_multiplies_columns() {
        let mut p = Pipeline::create("csv | derive total=price*qty | csv", PlanSource::Dsl).unwrap();
        p.push(b"price,qty\n2,3\n5,4\n").unwrap();
        p.finish().unwrap();
        let out = String::from_utf8(p.pull(Channel::Main)).unwrap();
        assert_eq!(out, "price,qty,total\n2,3,6\n5,4,20\n");
    }

    #[test]
    fn empty_input_yields_header_only() {
        let mut p = Pipeline::create("csv | csv", PlanSource::Dsl).unwrap();
        p.push(b"name,age\n").unwrap();
        p.finish().unwrap();
        let out = String::from_utf8(p.pull(Channel::Main)).unwrap();
        assert_eq!(out, "name,age\n");
    }

    #[test]
    fn group_agg_sums_per_key() {
        let mut p = Pipeline::create("csv | group-agg city sales:sum:total | csv", PlanSource::Dsl).unwrap();
        p.push(b"city,sales\nA,10\nB,5\nA,3\n").unwrap();
        p.finish().unwrap();
        let out = String::from_utf8(p.pull(Channel::Main)).unwrap();
        let mut lines: Vec<&str> = out.lines().collect();
        let header = lines.remove(0);
        assert_eq!(header, "city,total");
        lines.sort_unstable();
        assert_eq!(lines, vec!["A,13", "B,5"]);
    }

    #[test]
    fn unique_drops_duplicate_rows() {
        let mut p = Pipeline::create("csv | unique | csv", PlanSource::Dsl).unwrap();
        p.push(b"a,b\n1,2\n1,2\n3,4\n").unwrap();
        p.finish().unwrap();
        let out = String::from_utf8(p.pull(Channel::Main)).unwrap();
        assert_eq!(out, "a,b\n1,2\n3,4\n");
    }

    #[test]
    fn window_average_over_sliding_3() {
        let mut p = Pipeline::create("csv | window col=x size=3 func=avg result=w | csv", PlanSource::Dsl).unwrap();
        p.push(b"x\n1\n2\n3\n4\n").unwrap();
        p.finish().unwrap();
        let out = String::from_utf8(p.pull(Channel::Main)).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next().unwrap(), "x,w");
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows, vec!["1,1", "2,1.5", "3,2", "4,3"]);
    }

    #[test]
    fn stats_on_single_column() {
        let mut p = Pipeline::create("csv | stats stats=count,avg,median | csv", PlanSource::Dsl).unwrap();
        p.push(b"v\n1\n2\n3\n").unwrap();
        p.finish().unwrap();
        let out = String::from_utf8(p.pull(Channel::Main)).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next().unwrap(), "column,count,avg,median");
        assert_eq!(lines.next().unwrap(), "v,3,2,2");
    }

    #[test]
    fn invalid_plan_is_reported_as_error() {
        let err = Pipeline::create("filter col(a)>1 | csv", PlanSource::Dsl).unwrap_err();
        assert!(err.to_string().contains("decoder"));
    }

    #[test]
    fn decoder_error_is_fatal_for_later_pushes() {
        let mut p = Pipeline::create("csv | csv", PlanSource::Dsl).unwrap();
        assert!(p.push(b"a,b\n1,2\n").is_ok());
        // A later push after a manufactured fatal error should be refused.
        p.error = Some("synthetic failure".to_string());
        assert!(p.push(b"3,4\n").is_err());
    }

    #[test]
    fn stats_channel_reports_row_and_byte_counts() {
        let mut p = Pipeline::create("csv | csv", PlanSource::Dsl).unwrap();
        p.push(b"a,b\n1,2\n3,4\n").unwrap();
        p.finish().unwrap();
        let stats = String::from_utf8(p.pull(Channel::Stats)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(stats.trim()).unwrap();
        assert_eq!(parsed["rows_in"], 2);
        assert_eq!(parsed["rows_out"], 2);
    }
}
