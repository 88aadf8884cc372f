//! hktables CLI
//!
//! Converts a health `export.xml` into per-type JSON and CSV tables.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hktables::{convert_file, export, memory, ConvertConfig, Result};

#[derive(Parser)]
#[command(name = "hktables")]
#[command(about = "Convert a health export into per-type JSON and CSV tables")]
#[command(version)]
struct Cli {
    /// Path to export.xml
    #[arg(env = "HKTABLES_INPUT")]
    input: PathBuf,

    /// Output directory (CSV goes to its csv/ subdirectory)
    #[arg(short, long, env = "HKTABLES_OUTPUT")]
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "HKTABLES_CONFIG")]
    config: Option<PathBuf>,

    /// Skip CSV output
    #[arg(long)]
    no_csv: bool,

    /// Indent JSON output
    #[arg(long)]
    pretty: bool,

    /// Bytes read per step
    #[arg(long, env = "HKTABLES_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// File configuration with flags applied on top
    fn resolve_config(&self) -> Result<ConvertConfig> {
        let mut config = match &self.config {
            Some(path) => ConvertConfig::load(path)?,
            None => ConvertConfig::default(),
        };
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if self.no_csv {
            config.csv = false;
        }
        if self.pretty {
            config.pretty = true;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "hktables=debug" } else { "hktables=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.resolve_config()?;
    let started = Instant::now();

    let conversion = convert_file(&cli.input, config.chunk_size)?;
    let health = &conversion.health;
    info!(
        bytes = conversion.bytes_read,
        records = health.records.len(),
        workouts = health.workouts.len(),
        types = health.seen_types(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "export read"
    );
    if !health.diagnostics.is_empty() {
        warn!(
            unknown_extensions = health.diagnostics.unknown_extensions,
            missing_attributes = health.diagnostics.missing_attributes,
            malformed_values = health.diagnostics.malformed_values,
            "conversion finished with skipped content"
        );
    }

    let written = export::write_all(health, &config)?;
    info!(
        files = written.len(),
        output = %config.output_dir.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "done"
    );
    if let Some(peak) = memory::peak_bytes() {
        info!(peak_mib = peak / (1024 * 1024), "peak heap");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
