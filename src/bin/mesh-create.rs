//! Build a store from a directory of CSV shards, optionally composing
//! it over an existing historical store.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use meshdb::config::{IngestOptions, StoreOptions, DEFAULT_EPOCH};
use meshdb::csv::CsvReader;
use meshdb::errinput;
use meshdb::error::Result;
use meshdb::ingest::{self, IngestStats};
use meshdb::Store;

#[derive(Parser)]
#[command(
    name = "mesh-create",
    about = "Create a meshdb store from a directory of population CSV shards"
)]
struct Args {
    /// Output store file path
    #[arg(short, long)]
    output: PathBuf,

    /// Directory containing CSV shards (searched recursively)
    #[arg(short, long)]
    directory: PathBuf,

    /// Shard filename pattern
    #[arg(short, long, default_value = "*.csv")]
    pattern: String,

    /// Epoch attribute for a fresh store (YYYY-MM-DD HH:MM:SS)
    #[arg(long, default_value = DEFAULT_EPOCH)]
    epoch: String,

    /// Universe file, one decimal mesh key per line. Required unless
    /// --history-file supplies one.
    #[arg(short, long)]
    universe: Option<PathBuf>,

    /// CSV reader thread count
    #[arg(long, default_value_t = 8)]
    producers: usize,

    /// Progress reporting interval in rows
    #[arg(short, long, default_value_t = 10_000)]
    batch: usize,

    /// Assemble one calendar year in memory and write it once
    #[arg(long)]
    bulk_write: bool,

    /// Historical store to compose under the new data
    #[arg(long, requires = "history_year")]
    history_file: Option<PathBuf>,

    /// Cutoff year: only shards with data from this year onward are
    /// ingested into the new slab
    #[arg(long, requires = "history_file")]
    history_year: Option<i32>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut shards = Vec::new();
    find_csv_shards(&args.directory, &args.pattern, &mut shards)?;
    shards.sort();
    if shards.is_empty() {
        return errinput!(
            "no shards matching {:?} under {}",
            args.pattern,
            args.directory.display()
        );
    }
    tracing::info!(count = shards.len(), "Found csv shards");

    let ingest_options = IngestOptions::default()
        .producers(args.producers)
        .batch_size(args.batch)
        .bulk_write(args.bulk_write);

    let stats = match &args.history_file {
        Some(history) => {
            create_composed(&args, history, shards, ingest_options)?
        }
        None => {
            let Some(universe_path) = &args.universe else {
                return errinput!("--universe is required without --history-file");
            };
            let universe = load_universe_file(universe_path)?;
            let store = Store::create(
                &args.output,
                StoreOptions::new(args.epoch.clone()),
                universe,
            )?;
            let stats = ingest::run(&store, &shards, &ingest_options)?;
            store.close();
            stats
        }
    };

    println!("Conversion completed successfully!");
    println!("Output file: {}", args.output.display());
    println!("Total rows processed: {}", stats.rows_processed);
    println!("Unique timestamps: {}", stats.unique_timestamps);
    println!("Errors: {}", stats.errors);
    Ok(())
}

fn create_composed(
    args: &Args,
    history: &Path,
    shards: Vec<PathBuf>,
    ingest_options: IngestOptions,
) -> Result<IngestStats> {
    let cutoff_year = args.history_year.expect("clap enforces --history-year");
    let history_meta = Store::inspect(history)?;

    let shards = filter_shards_by_year(&shards, cutoff_year);
    tracing::info!(
        count = shards.len(),
        cutoff_year,
        "Shards with data at or after the cutoff year"
    );
    if shards.is_empty() {
        return errinput!("no shards carry data at or after {cutoff_year}");
    }

    // The new slab lives in the composed store's own grid; its rows
    // are relative to the historical extent, and the epoch comes from
    // the historical store so the seam is continuous.
    let universe = match &args.universe {
        Some(path) => load_universe_file(path)?,
        None => Store::load_universe(history)?,
    };
    let store = Store::create(
        &args.output,
        StoreOptions::new(history_meta.epoch.clone()),
        universe,
    )?;

    let stats = ingest::run(
        &store,
        &shards,
        &ingest_options.row_base(history_meta.time_rows),
    )?;
    store.declare_composition(history)?;
    store.close();
    Ok(stats)
}

/// Recursively collect files whose name matches the pattern.
fn find_csv_shards(dir: &Path, pattern: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| {
        meshdb::Error::IO(format!("cannot read directory {}: {e}", dir.display()))
    })?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            find_csv_shards(&path, pattern, out)?;
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if wildcard_match(pattern.as_bytes(), name.as_bytes()) {
                out.push(path);
            }
        }
    }
    Ok(())
}

/// Glob-lite matcher supporting `*` and `?`.
fn wildcard_match(pattern: &[u8], name: &[u8]) -> bool {
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((star_p, star_n)) = star {
            // Let the last star swallow one more byte and retry.
            star = Some((star_p, star_n + 1));
            p = star_p + 1;
            n = star_n + 1;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

/// Keep shards whose leading records carry data at or after the cutoff
/// year. Only the first few records are examined.
fn filter_shards_by_year(shards: &[PathBuf], cutoff_year: i32) -> Vec<PathBuf> {
    shards
        .iter()
        .filter(|path| {
            let Ok(mut reader) = CsvReader::open(path) else {
                return false;
            };
            for _ in 0..10 {
                match reader.next_record() {
                    Ok(Some(record)) => {
                        if (record.date / 10_000) as i32 >= cutoff_year {
                            return true;
                        }
                    }
                    Ok(None) => break,
                    Err(_) if reader.is_fatal() => break,
                    Err(_) => continue,
                }
            }
            false
        })
        .cloned()
        .collect()
}

/// Parse a universe file: one decimal mesh key per line, `#` comments.
fn load_universe_file(path: &Path) -> Result<Vec<u32>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| meshdb::Error::IO(format!("cannot read {}: {e}", path.display())))?;
    let mut keys = Vec::new();
    for (line_number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let key: u32 = line.parse().map_err(|_| {
            meshdb::Error::InvalidInput(format!(
                "bad mesh key {line:?} at {}:{}",
                path.display(),
                line_number + 1
            ))
        })?;
        keys.push(key);
    }
    if keys.is_empty() {
        return errinput!("universe file {} is empty", path.display());
    }
    Ok(keys)
}
