//! Point and range reads against a store, for humans and for pipes.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use meshdb::env::{env_value, STORE_PATH_VAR};
use meshdb::errinput;
use meshdb::error::Result;
use meshdb::Store;

#[derive(Parser)]
#[command(
    name = "mesh-reader",
    about = "Read population cells and time series from a meshdb store"
)]
struct Args {
    /// Store file path (defaults to $MESHDB_FILE_PATH, also read from .env)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Mesh key
    #[arg(short, long)]
    mesh: u32,

    /// Single datetime (YYYY-MM-DD HH:MM:SS)
    #[arg(short, long)]
    time: Option<String>,

    /// Start datetime for a range query
    #[arg(short, long)]
    start: Option<String>,

    /// End datetime for a range query
    #[arg(short, long)]
    end: Option<String>,

    /// Emit raw little-endian u32 values on stdout (one per hour)
    #[arg(short, long)]
    raw: bool,
}

fn main() -> ExitCode {
    // Diagnostics go to stderr so raw mode leaves stdout clean.
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
    if args.time.is_some() && (args.start.is_some() || args.end.is_some()) {
        return errinput!("cannot combine --time with --start/--end");
    }
    if args.start.is_some() != args.end.is_some() {
        return errinput!("range queries need both --start and --end");
    }
    if args.time.is_none() && args.start.is_none() {
        return errinput!("specify either --time or --start/--end");
    }

    let file = args.file.unwrap_or_else(|| {
        PathBuf::from(env_value(STORE_PATH_VAR, "population.mdb"))
    });
    let store = Store::open(&file)?;

    if let Some(datetime) = &args.time {
        let value = store.read_population_at(args.mesh, datetime)?;
        if args.raw {
            write_raw(&[value])?;
        } else {
            print_table(args.mesh, &[(datetime.clone(), value)], false);
        }
        return Ok(());
    }

    let (Some(start), Some(end)) = (args.start.as_deref(), args.end.as_deref()) else {
        return errinput!("range queries need both --start and --end");
    };
    let series = store.read_time_series_between(args.mesh, start, end)?;

    if args.raw {
        write_raw(&series)?;
    } else {
        let start_index = store.calendar().to_index(start)?;
        let rows: Vec<(String, i32)> = series
            .iter()
            .enumerate()
            .map(|(i, &value)| (store.calendar().from_index(start_index + i as u64), value))
            .collect();
        print_table(args.mesh, &rows, true);
    }
    Ok(())
}

fn write_raw(values: &[i32]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for &value in values {
        stdout.write_all(&(value as u32).to_le_bytes())?;
    }
    stdout.flush()?;
    Ok(())
}

fn print_table(mesh: u32, rows: &[(String, i32)], with_total: bool) {
    println!();
    println!("+------------+---------------------+------------+");
    println!("| Mesh ID    | Datetime            | Population |");
    println!("+------------+---------------------+------------+");
    for (datetime, value) in rows {
        println!("| {mesh:<10} | {datetime:<19} | {value:>10} |");
    }
    println!("+------------+---------------------+------------+");
    if with_total {
        println!("| Total records: {:<30} |", rows.len());
        println!("+------------+---------------------+------------+");
    }
}
