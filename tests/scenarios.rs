//! End-to-end scenarios through the public API: ingestion runs,
//! point/range/selection reads, bulk-year assembly, and composed
//! stores.

use std::fs;
use std::path::{Path, PathBuf};

use meshdb::config::{IngestOptions, StoreOptions};
use meshdb::ingest;
use meshdb::matrix::{plan_row_selection, ReadPlan};
use meshdb::tmpfs::TempDir;
use meshdb::Store;

const HEADER: &str = "date,time,area,residence,age,gender,population\n";

fn universe() -> Vec<u32> {
    vec![362257341, 362257342, 362257343, 533946395, 684827214]
}

fn small_chunk_options() -> StoreOptions {
    StoreOptions::default().chunk_geometry(8, 2)
}

fn write_shard(dir: &TempDir, name: &str, rows: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("{HEADER}{rows}")).expect("Failed to write shard");
    path
}

fn create_store(path: &Path, universe: Vec<u32>) -> Store {
    Store::create(path, small_chunk_options(), universe).expect("Failed to create store")
}

#[test]
fn single_file_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = create_store(&dir.path().join("pop.mdb"), universe());
    let shard = write_shard(
        &dir,
        "day1.csv",
        "20160101,0100,362257341,-1,-1,-1,100\n\
         20160101,0100,362257342,-1,-1,-1,200\n\
         20160101,0200,362257341,-1,-1,-1,150\n",
    );

    let stats = ingest::run(&store, &[shard], &IngestOptions::default()).unwrap();
    assert_eq!(stats.rows_processed, 3);
    assert_eq!(stats.unique_timestamps, 2);
    assert_eq!(stats.errors, 0);

    assert_eq!(store.read_population(362257341, 1).unwrap(), 100);
    assert_eq!(store.read_population(362257342, 1).unwrap(), 200);
    assert_eq!(store.read_population(362257341, 2).unwrap(), 150);
    assert_eq!(store.read_population(362257341, 10).unwrap(), 0);

    // The datetime flavor answers through the store epoch.
    assert_eq!(
        store
            .read_population_at(362257341, "2016-01-01 01:00:00")
            .unwrap(),
        100
    );
}

#[test]
fn multi_producer_ingestion_in_hour_order() {
    let dir = TempDir::new().unwrap();
    let store = create_store(&dir.path().join("pop.mdb"), universe());
    let shards = vec![
        write_shard(&dir, "a.csv", "20160101,0100,362257341,-1,-1,-1,100\n"),
        write_shard(&dir, "b.csv", "20160101,0300,362257341,-1,-1,-1,300\n"),
        write_shard(&dir, "c.csv", "20160101,0200,362257341,-1,-1,-1,150\n"),
    ];

    ingest::run(&store, &shards, &IngestOptions::default().producers(3)).unwrap();

    assert_eq!(
        store.read_time_series(362257341, 1, 3).unwrap(),
        vec![100, 150, 300]
    );
}

#[test]
fn time_series_range_includes_unwritten_hours() {
    let dir = TempDir::new().unwrap();
    let store = create_store(&dir.path().join("pop.mdb"), universe());
    let shard = write_shard(
        &dir,
        "day1.csv",
        "20160101,0100,362257341,-1,-1,-1,100\n\
         20160101,0200,362257341,-1,-1,-1,150\n",
    );
    ingest::run(&store, &[shard], &IngestOptions::default()).unwrap();

    assert_eq!(
        store.read_time_series(362257341, 0, 2).unwrap(),
        vec![0, 100, 150]
    );
    assert_eq!(
        store
            .read_time_series_between(362257341, "2016-01-01 00:00:00", "2016-01-01 02:00:00")
            .unwrap(),
        vec![0, 100, 150]
    );
}

#[test]
fn composed_store_spans_the_seam() {
    let dir = TempDir::new().unwrap();
    let hist_path = dir.path().join("history.mdb");
    let new_path = dir.path().join("combined.mdb");
    let split = 24u64;

    // Historical slab: one cell at the last hour before the split.
    {
        let hist = create_store(&hist_path, universe());
        hist.extend_time(split).unwrap();
        hist.write_population(362257341, split - 1, 42).unwrap();
        hist.flush().unwrap();
    }

    // New slab: ingested from CSV with rows relative to the split.
    {
        let new = create_store(&new_path, universe());
        let shard = write_shard(
            &dir,
            "new.csv",
            "20160102,0000,362257341,-1,-1,-1,99\n",
        );
        ingest::run(
            &new,
            &[shard],
            &IngestOptions::default().row_base(split),
        )
        .unwrap();
        new.declare_composition(&hist_path).unwrap();
    }

    let store = Store::open(&new_path).unwrap();
    assert_eq!(store.read_population(362257341, split - 1).unwrap(), 42);
    assert_eq!(store.read_population(362257341, split).unwrap(), 99);
    assert_eq!(store.read_population(362257341, split + 1).unwrap(), 0);

    let status = store.status();
    assert!(status.composed);
}

#[test]
fn selection_strategies_agree_with_cellwise_oracle() {
    let dir = TempDir::new().unwrap();

    // A 400-mesh universe of consecutive keys: resolver index i is key
    // 500000000 + i, so index runs can be built from key runs.
    let keys: Vec<u32> = (0..400).map(|i| 500_000_000 + i).collect();
    let store = create_store(&dir.path().join("pop.mdb"), keys.clone());
    store.extend_time(10).unwrap();
    for (i, &key) in keys.iter().enumerate() {
        store.write_population(key, 5, i as i32 + 1).unwrap();
    }
    store.flush().unwrap();

    // 200 single-element runs: past the threshold, element-list.
    let fragmented: Vec<u32> = (0..200).map(|i| 500_000_000 + i * 2).collect();
    let indices: Vec<u64> = fragmented
        .iter()
        .map(|&k| u64::from(store.resolver().resolve(k).unwrap()))
        .collect();
    assert!(matches!(
        plan_row_selection(&indices),
        ReadPlan::ElementList { .. }
    ));

    let got = store.read_population_multi(&fragmented, 5).unwrap();
    let oracle: Vec<i32> = fragmented
        .iter()
        .map(|&k| store.read_population(k, 5).unwrap())
        .collect();
    assert_eq!(got, oracle);

    // 4 wide runs: block-union.
    let mut blocky: Vec<u32> = Vec::new();
    for run in 0..4u32 {
        let base = 500_000_000 + run * 100;
        blocky.extend(base..base + 50);
    }
    let indices: Vec<u64> = blocky
        .iter()
        .map(|&k| u64::from(store.resolver().resolve(k).unwrap()))
        .collect();
    assert!(matches!(
        plan_row_selection(&indices),
        ReadPlan::BlockUnion { .. }
    ));

    let got = store.read_population_multi(&blocky, 5).unwrap();
    let oracle: Vec<i32> = blocky
        .iter()
        .map(|&k| store.read_population(k, 5).unwrap())
        .collect();
    assert_eq!(got, oracle);
}

#[test]
fn bulk_year_matches_streaming() {
    let dir = TempDir::new().unwrap();

    let rows = "20170101,0000,362257341,-1,-1,-1,10\n\
                20170315,0600,362257342,-1,-1,-1,20\n\
                20170801,1800,362257343,-1,-1,-1,30\n\
                20171231,2300,533946395,-1,-1,-1,40\n";
    let shard = write_shard(&dir, "y2017.csv", rows);

    let streaming = create_store(&dir.path().join("streaming.mdb"), universe());
    let streaming_stats =
        ingest::run(&streaming, &[shard.clone()], &IngestOptions::default()).unwrap();

    let bulk = create_store(&dir.path().join("bulk.mdb"), universe());
    let bulk_stats = ingest::run(
        &bulk,
        &[shard],
        &IngestOptions::default().bulk_write(true),
    )
    .unwrap();

    assert_eq!(streaming_stats.rows_processed, bulk_stats.rows_processed);
    assert_eq!(
        streaming_stats.unique_timestamps,
        bulk_stats.unique_timestamps
    );

    // Every cell of 2017 agrees between the two modes. 2016 is a leap
    // year, so 2017 spans hours [8784, 8784 + 8760).
    for &key in &universe() {
        for hour in [8784u64, 8784 + 73 * 24 + 6, 8784 + 212 * 24 + 18, 8784 + 8759] {
            assert_eq!(
                streaming.read_population(key, hour).unwrap(),
                bulk.read_population(key, hour).unwrap(),
                "mesh {key} hour {hour}"
            );
        }
    }

    assert_eq!(bulk.read_population(362257341, 8784).unwrap(), 10);
    assert_eq!(
        bulk.read_population_at(533946395, "2017-12-31 23:00:00")
            .unwrap(),
        40
    );
}

#[test]
fn ingest_report_counts_errors() {
    let dir = TempDir::new().unwrap();
    let store = create_store(&dir.path().join("pop.mdb"), universe());
    let shard = write_shard(
        &dir,
        "dirty.csv",
        "20160101,0100,362257341,-1,-1,-1,100\n\
         20160101,0100,999999998,-1,-1,-1,200\n\
         totally,broken\n\
         20160101,0200,362257342,-1,-1,-1,300\n",
    );

    let stats = ingest::run(&store, &[shard], &IngestOptions::default()).unwrap();
    assert_eq!(stats.rows_processed, 2);
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.unique_timestamps, 2);
}

#[test]
fn reopened_store_serves_identical_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pop.mdb");
    let shard = write_shard(
        &dir,
        "day1.csv",
        "20160101,0500,362257341,-1,-1,-1,55\n\
         20160103,0000,684827214,-1,-1,-1,77\n",
    );

    {
        let store = create_store(&path, universe());
        ingest::run(&store, &[shard], &IngestOptions::default()).unwrap();
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(store.read_population(362257341, 5).unwrap(), 55);
    // The exception key resolves to the trailing universe slot.
    assert_eq!(store.read_population(684827214, 48).unwrap(), 77);
    assert_eq!(store.epoch(), "2016-01-01 00:00:00");
}
