//! Streaming anonymization and risk assessment tool.
//!
//! Reads NDJSON records, processes them block by block and writes the
//! result as NDJSON. In anonymize mode every record comes out on the main
//! output with quasi-identifier cells suppressed where needed. In assess
//! mode records come out unmodified, on the main output if their block
//! satisfies the risk thresholds and on the error output otherwise.
//!
//! # Guarantees
//! - Records never leave the process except through the given outputs
//! - Every anonymized block keeps its row count, even when infeasible

mod input;
mod output;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, ValueEnum};
use deidstream_core::logging::init_logging;
use deidstream_core::{Mode, Processor, ProcessorConfig, RunReport};
use tracing::info;

use crate::input::JsonLines;
use crate::output::ChannelWriter;

#[derive(Parser)]
#[command(name = "deidstream")]
#[command(about = "Anonymize or assess NDJSON record streams")]
#[command(version)]
#[command(long_about = "
deidstream - statistical disclosure control for record streams

Records are collected into blocks. Each block is either anonymized until it
meets the configured re-identification risk thresholds, or assessed and
routed without modification.

CONFIGURATION:
  A JSON file with optional `risk`, `runtime` and `schema` sections.
  Missing values fall back to their defaults.

EXAMPLES:
  deidstream --config risk.json --input records.ndjson --output anonymized.ndjson
  deidstream --config risk.json --mode assess --error-output rejected.ndjson < records.ndjson
  deidstream --config risk.json --block-size 1000 --report report.json -i records.ndjson.zst
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Configuration file
    #[arg(short, long, env = "DEIDSTREAM_CONFIG", help = "Processor configuration (JSON)")]
    config: Option<PathBuf>,

    /// Input file
    #[arg(
        short,
        long,
        default_value = "-",
        help = "NDJSON input, '-' for stdin (.zst with --features compression)"
    )]
    input: PathBuf,

    /// Main output file
    #[arg(
        short,
        long,
        default_value = "-",
        help = "Output for anonymized or compliant records, '-' for stdout"
    )]
    output: PathBuf,

    /// Error output file
    #[arg(long, help = "Output for non-compliant records in assess mode")]
    error_output: Option<PathBuf>,

    /// Mode override
    #[arg(short, long, value_enum, help = "Override the configured mode")]
    mode: Option<ModeArg>,

    /// Block size override
    #[arg(long, help = "Override the configured block size (0 = whole stream)")]
    block_size: Option<usize>,

    /// Report file
    #[arg(long, help = "Write the run report as JSON")]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all logging except errors")]
    quiet: bool,
}

/// Processing mode as given on the command line.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    /// Transform blocks until they satisfy the thresholds
    Anonymize,
    /// Route blocks by their measured risk
    Assess,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Anonymize => Self::Anonymize,
            ModeArg::Assess => Self::Assess,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    run(&cli)?;
    Ok(())
}

/// Builds the effective configuration from the file and the overrides.
fn load_config(cli: &Cli) -> anyhow::Result<ProcessorConfig> {
    let mut config = match &cli.config {
        Some(path) => ProcessorConfig::from_json_file(path)
            .with_context(|| format!("Loading configuration from {}", path.display()))?,
        None => ProcessorConfig::default(),
    };

    if let Some(mode) = cli.mode {
        config.runtime.mode = mode.into();
    }
    if let Some(block_size) = cli.block_size {
        config.runtime.block_size = block_size;
    }
    Ok(config)
}

/// Processes the whole input and writes the outputs.
fn run(cli: &Cli) -> anyhow::Result<RunReport> {
    let config = load_config(cli)?;
    info!(
        "Processing {} in {} mode",
        describe(&cli.input),
        config.runtime.mode
    );

    let mut processor =
        Processor::with_reference_engines(&config).context("Invalid processor configuration")?;
    let reader = input::open(&cli.input)?;
    let mut sink = ChannelWriter::create(&cli.output, cli.error_output.as_deref())?;

    for item in JsonLines::new(reader) {
        let (line, value) = item?;
        processor
            .process_json(&value, &mut sink)
            .with_context(|| format!("Processing record on input line {}", line))?;
    }

    let report = processor
        .finish(&mut sink)
        .context("Processing the final block")?;
    info!(
        "Wrote {} records to {} and {} to the error output",
        sink.written(),
        describe(&cli.output),
        sink.rejected()
    );
    sink.finish()?;

    if let Some(path) = &cli.report {
        output::write_report(&report, path)?;
        info!("Run report written to {}", path.display());
    }
    Ok(report)
}

fn describe(path: &Path) -> String {
    if path.as_os_str() == input::STDIO {
        "standard stream".to_string()
    } else {
        path.display().to_string()
    }
}
