//! playlist-melt: Turn extracted playlist documents into warehouse-ready tables
//!
//! Usage:
//!   # One document from stdin, all three tables to stdout as tagged JSON Lines
//!   cat playlist.json | playlist-melt
//!
//!   # Every *.json in a directory, CSV files per table plus a run summary
//!   playlist-melt raw_data/to_processed --output-dir transformed_data
//!
//!   # Loader expects the NULL literal and pipe-delimited rows
//!   playlist-melt playlist.json -o out --null-token NULL --delimiter '|'

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use playlist_melt::{
    DirectoryWriter, MeltConfig, MeltOutput, NullToken, OutputFormat, PlaylistMelter,
    TableWriter,
};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Jsonl,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => OutputFormat::Csv,
            Format::Jsonl => OutputFormat::JsonLines,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "playlist-melt")]
#[command(about = "Flatten playlist documents into album, artist and song tables", long_about = None)]
struct Args {
    /// Input documents or directories of *.json files (stdin if omitted)
    #[arg(value_name = "PATH")]
    inputs: Vec<PathBuf>,

    /// Output directory for per-table files and run summaries.
    /// If omitted, writes tagged JSON Lines to stdout
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Table file format when writing to a directory
    #[arg(long, value_enum, default_value = "csv")]
    format: Format,

    /// Token written for absent values in CSV output (default: empty field)
    #[arg(long)]
    null_token: Option<String>,

    /// CSV delimiter (default: ",")
    #[arg(long)]
    delimiter: Option<char>,

    /// Omit the CSV header row
    #[arg(long)]
    no_header: bool,

    /// Fail a document that has no usable extracted_at instead of using the current time
    #[arg(long)]
    strict_extracted_at: bool,

    /// Log per-row drop reasons
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // Build config
    let mut config = MeltConfig::default();
    if let Some(token) = &args.null_token {
        config.null_token = token.parse::<NullToken>()?;
    }
    if let Some(delimiter) = args.delimiter {
        config.delimiter = parse_delimiter(delimiter)?;
    }
    config.include_header = !args.no_header;
    config.fallback_to_now_when_unextracted = !args.strict_extracted_at;

    let melter = PlaylistMelter::new(config.clone());

    if args.inputs.is_empty() {
        let document = read_document(Box::new(std::io::stdin()))?;
        let output = melter.transform(&document)?;
        return emit(&output, args.output_dir.as_deref(), config, args.format, 0);
    }

    let paths = collect_inputs(&args.inputs)?;
    if paths.is_empty() {
        info!("No documents to process");
        return Ok(());
    }

    let mut processed = 0;
    for (index, path) in paths.iter().enumerate() {
        info!(path = %path.display(), "processing document {}/{}", index + 1, paths.len());

        let result = File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))
            .and_then(|file| read_document(Box::new(BufReader::new(file))))
            .and_then(|document| melter.transform(&document).map_err(anyhow::Error::from))
            .and_then(|output| {
                emit(&output, args.output_dir.as_deref(), config.clone(), args.format, index)
            });

        match result {
            Ok(()) => processed += 1,
            Err(err) => error!(path = %path.display(), "skipping document: {:#}", err),
        }
    }

    info!("Processed {}/{} documents", processed, paths.len());
    if processed == 0 {
        bail!("No document could be transformed");
    }
    Ok(())
}

/// A delimiter must be one ASCII byte that cannot collide with quoting or
/// record separators
fn parse_delimiter(delimiter: char) -> Result<u8> {
    if !delimiter.is_ascii() {
        bail!("Delimiter must be a single ASCII character, got {:?}", delimiter);
    }
    if matches!(delimiter, '"' | '\n' | '\r') {
        bail!("Delimiter cannot be a quote or line break, got {:?}", delimiter);
    }
    Ok(delimiter as u8)
}

/// Install a stderr subscriber; `RUST_LOG` wins over `--verbose`
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Expand directories into their *.json files, sorted for a stable order
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            found.sort();
            if found.is_empty() {
                warn!(dir = %input.display(), "no .json files found");
            }
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}

/// Read a whole document using SIMD-accelerated parsing
fn read_document(reader: Box<dyn Read>) -> Result<Value> {
    let mut content = Vec::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader
        .read_to_end(&mut content)
        .context("Failed to read document")?;

    let value: Value =
        simd_json::serde::from_slice(&mut content).context("Failed to parse JSON")?;
    Ok(value)
}

/// Write one transform result to a directory, or to stdout when no directory is given
fn emit(
    output: &MeltOutput,
    output_dir: Option<&Path>,
    mut config: MeltConfig,
    format: Format,
    index: usize,
) -> Result<()> {
    let summary = &output.summary;
    for violation in &summary.violations {
        warn!(
            entity = %violation.entity,
            kind = ?violation.kind,
            count = violation.count,
            "{}",
            violation.rule
        );
    }

    match output_dir {
        Some(dir) => {
            config.output_format = format.into();
            let writer = DirectoryWriter::new(dir, config)?;
            let stamp = format!("{}_{}", summary.transformed_at.format("%Y%m%d_%H%M%S"), index);

            for table in [&output.albums, &output.artists, &output.songs] {
                let path = writer.write_table(table, &stamp)?;
                info!(rows = table.len(), path = %path.display(), "saved {} table", table.kind);
            }
            let path = writer.write_summary(summary, &stamp)?;
            info!(path = %path.display(), "saved run summary");
        }
        None => {
            config.output_format = OutputFormat::JsonLines;
            let stdout = std::io::stdout();
            let mut writer = TableWriter::new(stdout.lock(), config).with_table_tags();
            for table in [&output.albums, &output.artists, &output.songs] {
                writer.write_table(table)?;
            }
            writer.flush()?;
            eprintln!("{}", serde_json::to_string_pretty(summary)?);
        }
    }

    Ok(())
}
