//! CLI for the shardline sensor reading store.
//!
//! Provides commands for ingesting readings into a shard tree, previewing
//! shard routing, and inspecting individual shard files.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use shardline::codec::read_readings;
use shardline::{CsvCodec, Precision, Reading, Storage, StorageConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// shardline — Sharded flat-file storage for time-stamped sensor readings.
#[derive(Parser)]
#[command(name = "shardline", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Merge readings from CSV files into the shard tree.
    Ingest {
        /// Root directory of the shard tree.
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,

        /// Decimal places for stored values (negative for shortest).
        #[arg(long, allow_negative_numbers = true)]
        dp: Option<i32>,

        /// Multiply every value by this factor before storing.
        #[arg(long, default_value = "1.0", allow_negative_numbers = true)]
        scale: f64,

        /// Add this offset to every value after scaling.
        #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
        offset: f64,

        /// Input files of `timestamp,source,value` rows ("-" for stdin).
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Show which shard each reading would be stored in, without writing.
    Route {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Input files of `timestamp,source,value` rows ("-" for stdin).
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Summarize the contents of a single shard file.
    Info {
        /// Path to the shard file.
        file: PathBuf,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Options that pick the shard layout.
#[derive(clap::Args)]
struct LayoutArgs {
    /// JSON storage configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Shard path template, overriding the configuration file.
    #[arg(long)]
    template: Option<String>,
}

/// Output format for shard summaries.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text.
    Text,
    /// JSON object.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ingest {
            dir,
            layout,
            dp,
            scale,
            offset,
            files,
        } => cmd_ingest(&dir, &layout, dp, scale, offset, &files),
        Commands::Route { layout, files } => cmd_route(&layout, &files),
        Commands::Info { file, format } => cmd_info(&file, &format),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Builds the storage configuration from an optional file plus flag overrides.
fn build_config(
    layout: &LayoutArgs,
    dp: Option<i32>,
) -> Result<StorageConfig, Box<dyn std::error::Error>> {
    let mut config = match &layout.config {
        Some(path) => StorageConfig::load(path)?,
        None => StorageConfig::default(),
    };
    if let Some(template) = &layout.template {
        config.template.clone_from(template);
    }
    if let Some(places) = dp {
        config.decimal_places = Precision::from(places);
    }
    config.validate()?;
    Ok(config)
}

/// Decodes every input, in order, into one collection.
fn read_inputs(files: &[String]) -> Result<Vec<Reading>, Box<dyn std::error::Error>> {
    let codec = CsvCodec::default();
    let mut readings = Vec::new();
    for file in files {
        info!("reading: {file}");
        let batch = if file == "-" {
            read_readings(io::stdin().lock(), &codec)?
        } else {
            let handle = std::fs::File::open(file)
                .map_err(|e| format!("unable to open '{file}': {e}"))?;
            read_readings(io::BufReader::new(handle), &codec)
                .map_err(|e| format!("{file}: {e}"))?
        };
        readings.extend(batch);
    }
    Ok(readings)
}

/// Implements `shardline ingest`.
fn cmd_ingest(
    dir: &Path,
    layout: &LayoutArgs,
    dp: Option<i32>,
    scale: f64,
    offset: f64,
    files: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(layout, dp)?;
    let storage = Storage::from_config(&config)?;

    let readings: Vec<Reading> = read_inputs(files)?
        .iter()
        .map(|r| r.calibrated(scale, offset))
        .collect();

    info!("storing {} readings: {}", readings.len(), dir.display());
    let summary = storage.store(dir, readings)?;
    info!(
        shards = summary.shards(),
        created = summary.created,
        updated = summary.updated,
        unchanged = summary.unchanged,
        "store complete"
    );

    Ok(())
}

/// Implements `shardline route`.
fn cmd_route(layout: &LayoutArgs, files: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let router = build_config(layout, None)?.router()?;
    let shards = router.partition(read_inputs(files)?);

    for (path, readings) in &shards {
        println!("{path}\t{}", readings.len());
    }
    Ok(())
}

/// Aggregate view of one shard file.
#[derive(Debug, PartialEq)]
struct ShardSummary {
    count: usize,
    sources: Vec<String>,
    first: Option<String>,
    last: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
}

impl ShardSummary {
    fn from_readings(readings: &[Reading]) -> Self {
        let sources: BTreeSet<&str> = readings.iter().map(|r| r.source.as_str()).collect();
        let first = readings.iter().map(|r| r.epoch).min();
        let last = readings.iter().map(|r| r.epoch).max();
        let min = readings.iter().map(|r| r.value).reduce(f64::min);
        let max = readings.iter().map(|r| r.value).reduce(f64::max);

        Self {
            count: readings.len(),
            sources: sources.into_iter().map(str::to_string).collect(),
            first: first.as_ref().map(shardline::reading::format_timestamp),
            last: last.as_ref().map(shardline::reading::format_timestamp),
            min,
            max,
        }
    }
}

/// Implements `shardline info <file>`.
fn cmd_info(file: &Path, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    if !file.is_file() {
        return Err(format!("No shard file at '{}'", file.display()).into());
    }

    let storage = Storage::from_config(&StorageConfig::default())?;
    let summary = ShardSummary::from_readings(&storage.read_file(file)?);

    match format {
        OutputFormat::Text => {
            println!("Shard: {}", file.display());
            println!("  Readings: {}", summary.count);
            println!("  Sources: {}", summary.sources.join(", "));
            if let (Some(first), Some(last)) = (&summary.first, &summary.last) {
                println!("  First: {first}");
                println!("  Last: {last}");
            }
            if let (Some(min), Some(max)) = (summary.min, summary.max) {
                println!("  Min: {min}");
                println!("  Max: {max}");
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": file.display().to_string(),
                "count": summary.count,
                "sources": summary.sources,
                "first": summary.first,
                "last": summary.last,
                "min": summary.min,
                "max": summary.max,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
