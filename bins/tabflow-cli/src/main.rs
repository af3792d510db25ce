//! # tabflow CLI
//!
//! The command-line runner for tabflow pipelines. A pipeline is either
//! a pipe-separated DSL string (`csv | filter col(age) > 25 | csv`) or
//! an on-disk `.tfp` JSON plan (`{"steps": [...]}`); either form reads
//! its input from a file or stdin and writes the main channel's output
//! to stdout. The errors/stats side channels are printed to stderr
//! once the run finishes so a shell pipeline's stdout stays clean.
//!
//! ## Usage
//!
//! ```bash
//! # Run a pipe DSL pipeline over a file
//! tabflow --dsl "csv | filter col(age) > 25 | csv" --input data.csv
//!
//! # Run a .tfp JSON plan, reading from stdin
//! cat data.csv | tabflow --plan pipeline.tfp
//!
//! RUST_LOG=debug tabflow --dsl "csv | stats | csv" --input data.csv
//! ```

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tabflow_plan::{Channel, Pipeline, PlanSource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for the tabflow pipeline runner.
#[derive(Parser, Debug)]
#[command(name = "tabflow")]
#[command(about = "Streaming, batch-columnar data-transformation engine")]
#[command(long_about = "
tabflow compiles a pipe-separated DSL string or an on-disk `.tfp` JSON
plan into a chain of streaming operators and runs it over an input
file or stdin, writing the encoded result to stdout.

Examples:
  tabflow --dsl \"csv | filter col(age) > 25 | csv\" --input data.csv
  cat data.csv | tabflow --plan pipeline.tfp
  RUST_LOG=debug tabflow --dsl \"csv | stats | csv\" --input data.csv
")]
struct Args {
    /// Pipe-separated surface DSL, e.g. "csv | filter col(a) > 1 | csv".
    ///
    /// Mutually exclusive with `--plan`; exactly one of the two is
    /// required.
    #[arg(long)]
    #[arg(help = "Pipe-separated DSL pipeline string")]
    dsl: Option<String>,

    /// Path to a `.tfp` JSON plan file (`{"steps": [...]}`).
    #[arg(long)]
    #[arg(help = "Path to a .tfp JSON plan file")]
    plan: Option<PathBuf>,

    /// Input file; omit to read from stdin.
    #[arg(short, long)]
    #[arg(help = "Input file (defaults to stdin)")]
    input: Option<PathBuf>,

    /// Bytes fed to the decoder per `push` call; tunes how finely the
    /// orchestrator interleaves decode/transform work against read
    /// syscalls. Does not affect output.
    #[arg(long, default_value_t = 64 * 1024)]
    #[arg(help = "Byte chunk size read from input per push")]
    chunk_size: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let (source, kind) = match (&args.dsl, &args.plan) {
        (Some(dsl), None) => (dsl.clone(), PlanSource::Dsl),
        (None, Some(path)) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading plan file {}", path.display()))?;
            (text, PlanSource::Json)
        }
        (Some(_), Some(_)) => anyhow::bail!("pass exactly one of --dsl or --plan, not both"),
        (None, None) => anyhow::bail!("pass one of --dsl or --plan"),
    };

    let mut pipeline = Pipeline::create(&source, kind).context("compiling pipeline")?;
    tracing::info!(capabilities = ?pipeline.capabilities(), "pipeline compiled");

    let mut input: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(fs::File::open(path).with_context(|| format!("opening input {}", path.display()))?),
        None => Box::new(io::stdin()),
    };

    let mut chunk = vec![0u8; args.chunk_size.max(1)];
    loop {
        let n = input.read(&mut chunk).context("reading input")?;
        if n == 0 {
            break;
        }
        pipeline.push(&chunk[..n]).context("pushing input bytes")?;
    }
    pipeline.finish().context("finishing pipeline")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(&pipeline.pull(Channel::Main))?;
    out.flush()?;

    let errors = pipeline.pull(Channel::Errors);
    if !errors.is_empty() {
        io::stderr().write_all(&errors)?;
    }
    let stats = pipeline.pull(Channel::Stats);
    if !stats.is_empty() {
        tracing::info!(stats = %String::from_utf8_lossy(&stats).trim(), "pipeline finished");
    }

    if let Some(err) = pipeline.last_error() {
        anyhow::bail!("pipeline error: {err}");
    }
    Ok(())
}
