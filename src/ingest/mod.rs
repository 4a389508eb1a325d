//! Parallel CSV-to-matrix ingestion pipeline.
//!
//! Up to [`MAX_PRODUCERS`] reader threads are statically partitioned
//! over the shard list (shard i belongs to producer i mod P) and feed
//! one matrix-writer consumer through a bounded queue; the queue's
//! backpressure throttles CSV reading to the write rate. Shutdown is
//! cooperative: once every producer has joined, the coordinator pushes
//! a `None` sentinel and the consumer exits when it sees it.
//!
//! Two operating modes:
//!
//! - **Streaming** (default): producers resolve each record to a
//!   `(hour, mesh, value)` work item and enqueue it; the consumer
//!   grows the time axis as needed and writes cell by cell.
//! - **Bulk-year**: producers bypass the queue and scatter records
//!   into one dense zeroed year buffer; after they join, the matrix is
//!   extended once and the whole year is written in one call. All
//!   records must belong to the calendar year captured from the first
//!   record. If the buffer cannot be allocated the run falls back to
//!   streaming.
//!
//! Per-record failures (unknown mesh, unparseable timestamp,
//! out-of-year rows in bulk mode) are counted and dropped; unreadable
//! shards are skipped; a matrix I/O failure stops the run and
//! propagates.

pub mod bulk;
pub mod queue;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use crossbeam_skiplist::SkipSet;
use itertools::Itertools;

use crate::calendar::{self, Calendar};
use crate::config::{IngestOptions, MAX_PRODUCERS};
use crate::csv::{CsvReader, Record};
use crate::error::Result;
use crate::errinput;
use crate::matrix::Matrix;
use crate::mesh::MeshResolver;
use crate::store::Store;
use crate::Error;

use bulk::BulkBuffer;
use queue::WorkQueue;

/// Aggregated report of one ingestion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub rows_processed: u64,
    pub unique_timestamps: u64,
    pub errors: u64,
}

struct WorkItem {
    /// Logical hour index (relative to the store epoch).
    time_idx: u64,
    mesh_idx: u64,
    value: i32,
}

struct RunState {
    stats: Mutex<IngestStats>,
    timestamps: SkipSet<u64>,
    should_stop: AtomicBool,
}

impl RunState {
    fn new() -> Self {
        Self {
            stats: Mutex::new(IngestStats::default()),
            timestamps: SkipSet::new(),
            should_stop: AtomicBool::new(false),
        }
    }

    fn record_error(&self) {
        self.stats.lock().unwrap().errors += 1;
    }

    fn record_row(&self) {
        self.stats.lock().unwrap().rows_processed += 1;
    }

    fn stopping(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    fn finish(&self) -> IngestStats {
        let mut stats = *self.stats.lock().unwrap();
        stats.unique_timestamps = self.timestamps.len() as u64;
        stats
    }
}

/// Run one ingestion over the given shards into a writable store.
pub fn run(store: &Store, files: &[PathBuf], options: &IngestOptions) -> Result<IngestStats> {
    if !store.is_writable() {
        return Err(Error::ReadOnly);
    }
    if matches!(store.matrix(), Matrix::Composed(_)) {
        return Err(Error::ReadOnly);
    }
    if files.is_empty() {
        return errinput!("no csv shards to ingest");
    }

    if options.bulk_write {
        if let Some(stats) = bulk_run(store, files, options)? {
            return Ok(stats);
        }
        tracing::warn!("Bulk year buffer allocation failed; falling back to streaming mode");
    }
    streaming_run(store, files, options)
}

fn streaming_run(
    store: &Store,
    files: &[PathBuf],
    options: &IngestOptions,
) -> Result<IngestStats> {
    let producers = producer_count(options, files.len());
    let partitions = partition_files(files, producers);
    let work_queue: WorkQueue<Option<WorkItem>> = WorkQueue::new(options.queue_capacity);
    let state = RunState::new();

    tracing::info!(
        shards = files.len(),
        producers,
        "Starting streaming ingestion"
    );

    let consumer_result = thread::scope(|scope| {
        let consumer = {
            let work_queue = &work_queue;
            let state = &state;
            scope.spawn(move || consume(store, work_queue, state, options.row_base))
        };

        let mut handles = Vec::new();
        for (producer_id, shard_files) in partitions.iter().enumerate() {
            let work_queue = &work_queue;
            let state = &state;
            handles.push(scope.spawn(move || {
                produce_streaming(
                    producer_id,
                    shard_files,
                    store,
                    work_queue,
                    state,
                    options,
                )
            }));
        }
        for handle in handles {
            let _ = handle.join();
        }

        work_queue.push(None);
        consumer.join().expect("consumer thread panicked")
    });
    consumer_result?;

    store.flush()?;
    let stats = state.finish();
    tracing::info!(
        rows = stats.rows_processed,
        timestamps = stats.unique_timestamps,
        errors = stats.errors,
        "Streaming ingestion finished"
    );
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
fn produce_streaming(
    producer_id: usize,
    files: &[&PathBuf],
    store: &Store,
    work_queue: &WorkQueue<Option<WorkItem>>,
    state: &RunState,
    options: &IngestOptions,
) {
    let resolver = store.resolver();
    let calendar = store.calendar();

    for path in files {
        if state.stopping() {
            break;
        }
        let mut reader = match CsvReader::open(path) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(
                    producer = producer_id,
                    path = %path.display(),
                    error = %e,
                    "Skipping unreadable shard"
                );
                continue;
            }
        };

        let mut rows_read = 0u64;
        loop {
            if state.stopping() {
                break;
            }
            match reader.next_record() {
                Ok(None) => break,
                Ok(Some(record)) => {
                    rows_read += 1;
                    if rows_read % options.batch_size.max(1) as u64 == 0 {
                        tracing::debug!(
                            producer = producer_id,
                            path = %path.display(),
                            rows = rows_read,
                            "Shard progress"
                        );
                    }
                    match convert(&record, resolver, calendar, options.row_base) {
                        Ok(item) => {
                            state.timestamps.insert(item.time_idx);
                            work_queue.push(Some(item));
                        }
                        Err(e) => {
                            tracing::debug!(
                                producer = producer_id,
                                line = reader.line_number(),
                                error = %e,
                                "Dropping record"
                            );
                            state.record_error();
                        }
                    }
                }
                Err(e) => {
                    state.record_error();
                    if reader.is_fatal() {
                        tracing::warn!(
                            producer = producer_id,
                            path = %path.display(),
                            error = %e,
                            "Abandoning shard"
                        );
                        break;
                    }
                }
            }
        }
        tracing::debug!(
            producer = producer_id,
            path = %path.display(),
            rows = rows_read,
            "Finished shard"
        );
    }
}

fn consume(
    store: &Store,
    work_queue: &WorkQueue<Option<WorkItem>>,
    state: &RunState,
    row_base: u64,
) -> Result<()> {
    let matrix = store.matrix();
    let mut failure = None;

    loop {
        match work_queue.pop() {
            None => break,
            Some(item) => {
                if failure.is_some() {
                    continue; // drain so producers can unblock
                }
                let row = item.time_idx - row_base;
                if let Err(e) = write_item(matrix, row, item.mesh_idx, item.value) {
                    tracing::error!(error = %e, "Matrix write failed; stopping ingestion");
                    state.should_stop.store(true, Ordering::SeqCst);
                    failure = Some(e);
                    continue;
                }
                state.record_row();
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn write_item(matrix: &Matrix, row: u64, mesh_idx: u64, value: i32) -> Result<()> {
    let rows = matrix.rows();
    if row >= rows {
        // Amortized growth, and always far enough to cover this row.
        let grown = (rows + rows.div_ceil(2)).max(row + 100);
        matrix.extend_time(grown)?;
    }
    matrix.write_cell(row, mesh_idx, value)
}

fn bulk_run(
    store: &Store,
    files: &[PathBuf],
    options: &IngestOptions,
) -> Result<Option<IngestStats>> {
    let calendar = store.calendar();
    let Some(first) = peek_first_record(files) else {
        return errinput!("no readable records in any shard");
    };
    let (year, _) = calendar::year_row(first.date, first.time)?;
    let year_rows = calendar::hours_in_year(year) as usize;
    let cols = store.matrix().cols() as usize;

    let start_logical = calendar.year_start_index(year)?;
    if start_logical < options.row_base {
        return errinput!("year {year} starts before the composition split");
    }
    let start_row = start_logical - options.row_base;

    let Some(mut buffer) = BulkBuffer::zeroed(year_rows, cols) else {
        return Ok(None);
    };

    let producers = producer_count(options, files.len());
    let partitions = partition_files(files, producers);
    let work_queue: WorkQueue<Option<WorkItem>> = WorkQueue::new(options.queue_capacity);
    let state = RunState::new();

    tracing::info!(
        year,
        rows = year_rows,
        meshes = cols,
        producers,
        "Starting bulk-year ingestion"
    );

    thread::scope(|scope| {
        // The consumer is idle in bulk mode; it only observes the
        // shutdown sentinel.
        let consumer = {
            let work_queue = &work_queue;
            scope.spawn(move || while work_queue.pop().is_some() {})
        };

        let mut handles = Vec::new();
        for (producer_id, shard_files) in partitions.iter().enumerate() {
            let buffer = &buffer;
            let state = &state;
            handles.push(scope.spawn(move || {
                produce_bulk(
                    producer_id,
                    shard_files,
                    store,
                    buffer,
                    state,
                    year,
                    start_logical,
                )
            }));
        }
        for handle in handles {
            let _ = handle.join();
        }

        work_queue.push(None);
        consumer.join().expect("consumer thread panicked");
    });

    let end_row = start_row + year_rows as u64;
    let matrix = store.matrix();
    if end_row > matrix.rows() {
        matrix.extend_time(end_row)?;
    }
    matrix.write_bulk(buffer.as_slice(), start_row, year_rows as u64, cols as u64)?;
    store.flush()?;

    let stats = state.finish();
    tracing::info!(
        rows = stats.rows_processed,
        timestamps = stats.unique_timestamps,
        errors = stats.errors,
        "Bulk-year ingestion finished"
    );
    Ok(Some(stats))
}

fn produce_bulk(
    producer_id: usize,
    files: &[&PathBuf],
    store: &Store,
    buffer: &BulkBuffer,
    state: &RunState,
    year: i32,
    start_logical: u64,
) {
    let resolver = store.resolver();

    for path in files {
        if state.stopping() {
            break;
        }
        let mut reader = match CsvReader::open(path) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(
                    producer = producer_id,
                    path = %path.display(),
                    error = %e,
                    "Skipping unreadable shard"
                );
                continue;
            }
        };

        loop {
            match reader.next_record() {
                Ok(None) => break,
                Ok(Some(record)) => {
                    let Some(mesh_idx) = resolve_mesh(&record, resolver) else {
                        state.record_error();
                        continue;
                    };
                    let (record_year, row) = match calendar::year_row(record.date, record.time)
                    {
                        Ok(pair) => pair,
                        Err(_) => {
                            state.record_error();
                            continue;
                        }
                    };
                    if record_year != year {
                        tracing::debug!(
                            producer = producer_id,
                            record_year,
                            expected = year,
                            "Out-of-year record in bulk run"
                        );
                        state.record_error();
                        continue;
                    }
                    buffer.store(row as usize, mesh_idx as usize, record.population);
                    state.timestamps.insert(start_logical + u64::from(row));
                    state.record_row();
                }
                Err(e) => {
                    state.record_error();
                    if reader.is_fatal() {
                        tracing::warn!(
                            producer = producer_id,
                            path = %path.display(),
                            error = %e,
                            "Abandoning shard"
                        );
                        break;
                    }
                }
            }
        }
    }
}

fn convert(
    record: &Record,
    resolver: &MeshResolver,
    calendar: &Calendar,
    row_base: u64,
) -> Result<WorkItem> {
    let Some(mesh_idx) = resolve_mesh(record, resolver) else {
        return errinput!("unknown mesh key {}", record.area);
    };
    let time_idx = calendar.index_for(record.date, record.time)?;
    if time_idx < row_base {
        return errinput!("record at hour {time_idx} predates the composition split {row_base}");
    }
    Ok(WorkItem {
        time_idx,
        mesh_idx: u64::from(mesh_idx),
        value: record.population,
    })
}

fn resolve_mesh(record: &Record, resolver: &MeshResolver) -> Option<u32> {
    let key = u32::try_from(record.area).ok()?;
    resolver.resolve(key)
}

fn peek_first_record(files: &[PathBuf]) -> Option<Record> {
    for path in files {
        let Ok(mut reader) = CsvReader::open(path) else {
            continue;
        };
        loop {
            match reader.next_record() {
                Ok(Some(record)) => return Some(record),
                Ok(None) => break,
                Err(_) if reader.is_fatal() => break,
                Err(_) => continue,
            }
        }
    }
    None
}

fn producer_count(options: &IngestOptions, shard_count: usize) -> usize {
    options
        .producers
        .clamp(1, MAX_PRODUCERS)
        .min(shard_count.max(1))
}

/// Shard i belongs to producer i mod P.
fn partition_files(files: &[PathBuf], producers: usize) -> Vec<Vec<&PathBuf>> {
    let mut groups = files
        .iter()
        .enumerate()
        .map(|(i, file)| (i % producers, file))
        .into_group_map();
    (0..producers)
        .map(|p| groups.remove(&p).unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::tmpfs::TempDir;
    use std::fs;
    use std::path::Path;

    const HEADER: &str = "date,time,area,residence,age,gender,population\n";

    fn universe() -> Vec<u32> {
        vec![362257341, 362257342, 362257343, 533946395, 684827214]
    }

    fn store_at(path: &Path) -> Store {
        Store::create(
            path,
            StoreOptions::default().chunk_geometry(8, 2),
            universe(),
        )
        .expect("Failed to create store")
    }

    fn write_shard(dir: &TempDir, name: &str, rows: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("{HEADER}{rows}")).expect("Failed to write shard");
        path
    }

    #[test]
    fn test_single_shard_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir.path().join("pop.mdb"));
        let shard = write_shard(
            &dir,
            "a.csv",
            "20160101,0100,362257341,-1,-1,-1,100\n\
             20160101,0100,362257342,-1,-1,-1,200\n\
             20160101,0200,362257341,-1,-1,-1,150\n",
        );

        let stats = run(&store, &[shard], &IngestOptions::default()).unwrap();
        assert_eq!(stats.rows_processed, 3);
        assert_eq!(stats.unique_timestamps, 2);
        assert_eq!(stats.errors, 0);

        assert_eq!(store.read_population(362257341, 1).unwrap(), 100);
        assert_eq!(store.read_population(362257342, 1).unwrap(), 200);
        assert_eq!(store.read_population(362257341, 2).unwrap(), 150);
        assert_eq!(store.read_population(362257341, 10).unwrap(), 0);

        // Range read from the epoch: the unwritten hour 0 reads zero.
        let series = store.read_time_series(362257341, 0, 2).unwrap();
        assert_eq!(series, vec![0, 100, 150]);
    }

    #[test]
    fn test_multi_producer_interleaving() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir.path().join("pop.mdb"));
        let shards = vec![
            write_shard(&dir, "a.csv", "20160101,0100,362257341,-1,-1,-1,100\n"),
            write_shard(&dir, "b.csv", "20160101,0300,362257341,-1,-1,-1,300\n"),
            write_shard(&dir, "c.csv", "20160101,0200,362257341,-1,-1,-1,150\n"),
        ];

        let options = IngestOptions::default().producers(3);
        let stats = run(&store, &shards, &options).unwrap();
        assert_eq!(stats.rows_processed, 3);
        assert_eq!(stats.unique_timestamps, 3);

        let series = store.read_time_series(362257341, 1, 3).unwrap();
        assert_eq!(series, vec![100, 150, 300]);
        // Hour 0 was never written.
        assert_eq!(store.read_population(362257341, 0).unwrap(), 0);
    }

    #[test]
    fn test_interleaving_commutes() {
        let dir = TempDir::new().unwrap();

        let rows = [
            "20160101,0100,362257341,-1,-1,-1,1\n",
            "20160102,0500,362257342,-1,-1,-1,2\n",
            "20160103,0900,362257343,-1,-1,-1,3\n",
            "20160104,1300,533946395,-1,-1,-1,4\n",
        ];

        // Same records, two different shard partitions.
        let store_a = store_at(&dir.path().join("a.mdb"));
        let shards_a = vec![
            write_shard(&dir, "a1.csv", &format!("{}{}", rows[0], rows[1])),
            write_shard(&dir, "a2.csv", &format!("{}{}", rows[2], rows[3])),
        ];
        run(&store_a, &shards_a, &IngestOptions::default().producers(2)).unwrap();

        let store_b = store_at(&dir.path().join("b.mdb"));
        let shards_b = vec![
            write_shard(&dir, "b1.csv", &format!("{}{}", rows[3], rows[0])),
            write_shard(&dir, "b2.csv", &format!("{}{}", rows[1], rows[2])),
        ];
        run(&store_b, &shards_b, &IngestOptions::default().producers(2)).unwrap();

        for key in universe() {
            for hour in 0..100 {
                assert_eq!(
                    store_a.read_population(key, hour).unwrap(),
                    store_b.read_population(key, hour).unwrap(),
                    "mesh {key} hour {hour}"
                );
            }
        }
    }

    #[test]
    fn test_per_record_errors_counted() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir.path().join("pop.mdb"));
        let shard = write_shard(
            &dir,
            "a.csv",
            "20160101,0100,362257341,-1,-1,-1,100\n\
             20160101,0100,111111111,-1,-1,-1,200\n\
             garbage line\n\
             20150101,0100,362257341,-1,-1,-1,300\n\
             20160101,0400,362257342,-1,-1,-1,400\n",
        );

        let stats = run(&store, &[shard], &IngestOptions::default()).unwrap();
        // Unknown mesh, malformed line, pre-epoch datetime.
        assert_eq!(stats.errors, 3);
        assert_eq!(stats.rows_processed, 2);
        assert_eq!(store.read_population(362257341, 1).unwrap(), 100);
        assert_eq!(store.read_population(362257342, 4).unwrap(), 400);
    }

    #[test]
    fn test_unreadable_shard_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir.path().join("pop.mdb"));
        let good = write_shard(&dir, "good.csv", "20160101,0100,362257341,-1,-1,-1,7\n");
        let missing = dir.path().join("missing.csv");

        let stats = run(&store, &[missing, good], &IngestOptions::default()).unwrap();
        assert_eq!(stats.rows_processed, 1);
        assert_eq!(store.read_population(362257341, 1).unwrap(), 7);
    }

    #[test]
    fn test_read_only_store_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pop.mdb");
        {
            let store = store_at(&path);
            store.flush().unwrap();
        }
        let store = Store::open(&path).unwrap();
        let shard = write_shard(&dir, "a.csv", "20160101,0100,362257341,-1,-1,-1,1\n");
        assert_eq!(
            run(&store, &[shard], &IngestOptions::default()),
            Err(Error::ReadOnly)
        );
    }

    #[test]
    fn test_bulk_year_run() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir.path().join("pop.mdb"));

        // 2017 is not a leap year: 8760 rows starting at hour 8784.
        let shard = write_shard(
            &dir,
            "y2017.csv",
            "20170101,0000,362257341,-1,-1,-1,10\n\
             20170101,0100,362257342,-1,-1,-1,20\n\
             20170630,1200,362257341,-1,-1,-1,30\n\
             20171231,2300,533946395,-1,-1,-1,40\n",
        );

        let options = IngestOptions::default().bulk_write(true);
        let stats = run(&store, &[shard], &options).unwrap();
        assert_eq!(stats.rows_processed, 4);
        assert_eq!(stats.unique_timestamps, 4);
        assert_eq!(stats.errors, 0);

        let (rows, _) = store.dimensions();
        assert_eq!(rows, 8784 + 8760);

        assert_eq!(store.read_population(362257341, 8784).unwrap(), 10);
        assert_eq!(store.read_population(362257342, 8785).unwrap(), 20);
        let mid = store
            .read_population_at(362257341, "2017-06-30 12:00:00")
            .unwrap();
        assert_eq!(mid, 30);
        assert_eq!(
            store
                .read_population_at(533946395, "2017-12-31 23:00:00")
                .unwrap(),
            40
        );

        // Unwritten cells inside the year window are zero.
        assert_eq!(store.read_population(362257343, 9000).unwrap(), 0);
    }

    #[test]
    fn test_bulk_rejects_out_of_year_records() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir.path().join("pop.mdb"));

        let shard = write_shard(
            &dir,
            "mixed.csv",
            "20160101,0000,362257341,-1,-1,-1,10\n\
             20170101,0000,362257342,-1,-1,-1,20\n\
             20160201,0000,362257343,-1,-1,-1,30\n",
        );

        let options = IngestOptions::default().bulk_write(true);
        let stats = run(&store, &[shard], &options).unwrap();
        // Year captured from the first record is 2016; the 2017 row drops.
        assert_eq!(stats.rows_processed, 2);
        assert_eq!(stats.errors, 1);

        assert_eq!(store.read_population(362257341, 0).unwrap(), 10);
        assert_eq!(store.read_population(362257343, 31 * 24).unwrap(), 30);
        assert_eq!(store.read_population(362257342, 8784).unwrap(), 0);
    }

    #[test]
    fn test_bulk_leap_year_extent() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir.path().join("pop.mdb"));

        // 2016 is a leap year: 8784 rows starting at hour 0.
        let shard = write_shard(
            &dir,
            "y2016.csv",
            "20160101,0000,362257341,-1,-1,-1,1\n\
             20161231,2300,362257341,-1,-1,-1,2\n",
        );

        let options = IngestOptions::default().bulk_write(true);
        run(&store, &[shard], &options).unwrap();

        let (rows, _) = store.dimensions();
        assert_eq!(rows, 8784);
        assert_eq!(store.read_population(362257341, 0).unwrap(), 1);
        assert_eq!(store.read_population(362257341, 8783).unwrap(), 2);
    }

    #[test]
    fn test_row_base_offsets_ingestion() {
        let dir = TempDir::new().unwrap();
        let hist_path = dir.path().join("history.mdb");
        let new_path = dir.path().join("combined.mdb");
        let split = 24u64;

        {
            let hist = store_at(&hist_path);
            hist.extend_time(split).unwrap();
            hist.write_population(362257341, split - 1, 42).unwrap();
            hist.flush().unwrap();
        }

        {
            let new = store_at(&new_path);
            let shard = write_shard(
                &dir,
                "new.csv",
                // Logical hours 24 and 25.
                "20160102,0000,362257341,-1,-1,-1,99\n\
                 20160102,0100,362257342,-1,-1,-1,77\n\
                 20160101,0500,362257341,-1,-1,-1,13\n",
            );
            let options = IngestOptions::default().row_base(split);
            let stats = run(&new, &[shard], &options).unwrap();
            // The hour-5 record predates the split and is dropped.
            assert_eq!(stats.rows_processed, 2);
            assert_eq!(stats.errors, 1);
            new.declare_composition(&hist_path).unwrap();
        }

        let store = Store::open(&new_path).unwrap();
        assert_eq!(store.read_population(362257341, split - 1).unwrap(), 42);
        assert_eq!(store.read_population(362257341, split).unwrap(), 99);
        assert_eq!(store.read_population(362257342, split + 1).unwrap(), 77);
    }

    #[test]
    fn test_partitioning_is_static() {
        let files: Vec<PathBuf> = (0..7).map(|i| PathBuf::from(format!("{i}.csv"))).collect();
        let parts = partition_files(&files, 3);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 3); // 0, 3, 6
        assert_eq!(parts[1].len(), 2); // 1, 4
        assert_eq!(parts[2].len(), 2); // 2, 5
        assert_eq!(parts[0][1], &files[3]);
        assert_eq!(parts[2][0], &files[2]);
    }
}
