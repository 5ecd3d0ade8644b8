//! Pore Segmenter CLI
//!
//! Segments a current trace into padded events written as JSON Lines.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pore_segmenter::{
    Config, EventSegmenter, JsonLinesWriter, TextSource, WorkerPool, VERSION,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pore-segment")]
#[command(version = VERSION)]
#[command(about = "Streaming event segmentation for ionic current recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a trace into events
    Segment {
        /// Text file with one current sample (pA) per line
        #[arg(long, short)]
        input: PathBuf,

        /// Sampling rate of the trace in Hz
        #[arg(long)]
        sample_rate: f64,

        /// Configuration file (defaults to the per-user config)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override a setting, e.g. --set eventPad=250
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        /// Output file for event records (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Number of event processing workers
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show the effective configuration as JSON
    Config {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },

    /// Show the segmentation settings summary
    Settings {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Segment {
            input,
            sample_rate,
            config,
            overrides,
            output,
            workers,
        } => {
            let mut config = load_config(config.as_deref(), &overrides)?;
            if let Some(workers) = workers {
                config.dispatch.workers = workers;
            }
            config.validate()?;
            cmd_segment(&input, sample_rate, &config, output.as_deref())
        }
        Commands::Config { config, overrides } => {
            let config = load_config(config.as_deref(), &overrides)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Settings { config, overrides } => {
            let config = load_config(config.as_deref(), &overrides)?;
            println!("{}", config.segment.summary());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>, overrides: &[String]) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Could not load configuration from {path:?}"))?,
        None => Config::load().context("Could not load configuration")?,
    };

    for entry in overrides {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("Expected KEY=VALUE, got '{entry}'");
        };
        config.segment.apply_setting(key.trim(), value.trim())?;
    }
    config.segment.validate()?;

    Ok(config)
}

fn cmd_segment(
    input: &Path,
    sample_rate: f64,
    config: &Config,
    output: Option<&Path>,
) -> Result<()> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        bail!("Sample rate must be a positive number of Hz, got {sample_rate}");
    }

    let source = TextSource::open(input, sample_rate)
        .with_context(|| format!("Could not open {input:?}"))?;

    let sink: Box<dyn Write + Send> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Could not create {path:?}"))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let writer = Arc::new(JsonLinesWriter::new(sink));

    let pool = WorkerPool::spawn(
        writer.clone(),
        config.dispatch.workers,
        config.dispatch.queue_capacity,
    )
    .context("Could not start event workers")?;

    let mut segmenter = EventSegmenter::new(config, source, pool)?;

    let cancel = segmenter.cancel_handle();
    ctrlc::set_handler(move || cancel.cancel()).context("Error setting Ctrl+C handler")?;

    eprintln!("Pore Segmenter v{VERSION}");
    eprintln!("{}", config.segment.summary());
    eprintln!();

    let mut summary = segmenter.run()?;

    // Workers may still be draining the queue when the run loop returns.
    let dispatch = segmenter.into_dispatcher().shutdown();
    writer.flush()?;
    summary.stats.processed = dispatch.processed;
    if dispatch.failed > 0 {
        tracing::warn!("{} events failed downstream processing", dispatch.failed);
    }

    eprintln!("{}", summary.report());
    Ok(())
}
