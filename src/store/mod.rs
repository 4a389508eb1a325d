//! Store façade.
//!
//! A [`Store`] owns one open store file: its metadata, chunk grid (or
//! virtual composition), the mesh resolver, and the calendar derived
//! from the epoch attribute. Reads and writes come in two flavors,
//! hour-index and datetime-string, and the datetime flavor always
//! goes through the calendar with this store's epoch.
//!
//! One read-write handle exists per store (enforced with a file lock);
//! read-only handles may be opened freely and shared across threads.

pub mod meta;
pub mod metrics;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::calendar::Calendar;
use crate::config::StoreOptions;
use crate::error::Result;
use crate::{errdata, errinput};
use crate::flock::FileLock;
use crate::matrix::{ChunkedMatrix, Matrix, VirtualMatrix};
use crate::mesh::MeshResolver;
use crate::Error;

use meta::{ComposeRecord, StoreMeta, SUPERBLOCK_SIZE};
use metrics::StoreMetrics;

pub struct Store {
    path: PathBuf,
    file: Arc<File>,
    meta: Mutex<StoreMeta>,
    matrix: Matrix,
    resolver: MeshResolver,
    calendar: Calendar,
    cache_bytes: usize,
    writable: bool,
    _lock: Option<FileLock>,
}

impl Store {
    /// Create a new store over the given universe. The universe list
    /// and the perfect hash built over it are embedded in the file;
    /// the time extent starts at zero and grows on ingestion.
    pub fn create(
        path: impl AsRef<Path>,
        options: StoreOptions,
        universe: Vec<u32>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if universe.is_empty() {
            return errinput!("cannot create a store over an empty mesh universe");
        }
        let calendar = Calendar::new(&options.epoch)?;
        let resolver = MeshResolver::build(universe)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let lock = FileLock::lock(lock_path(&path))?;

        let universe_off = SUPERBLOCK_SIZE as u64;
        let universe_payload = meta::encode_universe(resolver.universe());
        let universe_len = meta::write_section(&file, universe_off, &universe_payload)?;

        let mph_off = universe_off + universe_len;
        let mph_blob = resolver.mph_bytes();
        let mph_len = meta::write_section(&file, mph_off, &mph_blob)?;

        let data_off = meta::align_up(mph_off + mph_len);

        let store_meta = StoreMeta {
            time_rows: 0,
            mesh_cols: resolver.len() as u64,
            chunk_rows: options.chunk_rows,
            chunk_cols: options.chunk_cols,
            epoch: options.epoch.clone(),
            universe_off,
            universe_len,
            mph_off,
            mph_len,
            data_off,
            compose: None,
        };
        store_meta.write_to(&file)?;

        let file = Arc::new(file);
        let matrix = Matrix::Plain(ChunkedMatrix::new(
            Arc::clone(&file),
            data_off,
            0,
            store_meta.mesh_cols,
            store_meta.chunk_rows,
            store_meta.chunk_cols,
            true,
            options.cache_bytes,
        ));

        tracing::info!(
            path = %path.display(),
            meshes = store_meta.mesh_cols,
            epoch = %store_meta.epoch,
            "Created store"
        );

        Ok(Self {
            path,
            file,
            meta: Mutex::new(store_meta),
            matrix,
            resolver,
            calendar,
            cache_bytes: options.cache_bytes,
            writable: true,
            _lock: Some(lock),
        })
    }

    /// Open a store read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), false, crate::config::DEFAULT_CACHE_BYTES)
    }

    /// Open a store for reading and writing. Composed stores are a
    /// read surface and cannot be opened writable.
    pub fn open_readwrite(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), true, crate::config::DEFAULT_CACHE_BYTES)
    }

    /// Open with an explicit chunk cache budget.
    pub fn open_with_cache(
        path: impl AsRef<Path>,
        writable: bool,
        cache_bytes: usize,
    ) -> Result<Self> {
        Self::open_with(path.as_ref(), writable, cache_bytes)
    }

    fn open_with(path: &Path, writable: bool, cache_bytes: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        let lock = if writable {
            Some(FileLock::lock(lock_path(path))?)
        } else {
            None
        };

        let store_meta = StoreMeta::read_from(&file)?;
        if writable && store_meta.is_composed() {
            return errinput!("composed store {} is read-only", path.display());
        }

        let universe_payload =
            meta::read_section(&file, store_meta.universe_off, store_meta.universe_len)?;
        let universe = meta::decode_universe(&universe_payload)?;
        let mph_blob = meta::read_section(&file, store_meta.mph_off, store_meta.mph_len)?;
        let resolver = MeshResolver::from_sections(universe, &mph_blob)?;
        let calendar = Calendar::new(&store_meta.epoch)?;

        let file = Arc::new(file);
        let own = ChunkedMatrix::new(
            Arc::clone(&file),
            store_meta.data_off,
            store_meta.time_rows,
            store_meta.mesh_cols,
            store_meta.chunk_rows,
            store_meta.chunk_cols,
            writable,
            cache_bytes,
        );

        let matrix = match &store_meta.compose {
            None => Matrix::Plain(own),
            Some(record) => {
                let hist = open_historical_slab(record, cache_bytes)?;
                Matrix::Composed(VirtualMatrix::new(hist, own, record.split_rows)?)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            meta: Mutex::new(store_meta),
            matrix,
            resolver,
            calendar,
            cache_bytes,
            writable,
            _lock: lock,
        })
    }

    /// Read the superblock of a store file without opening it.
    pub fn inspect(path: impl AsRef<Path>) -> Result<StoreMeta> {
        let file = File::open(path.as_ref())?;
        StoreMeta::read_from(&file)
    }

    /// Read the mesh universe of a store file without opening it.
    pub fn load_universe(path: impl AsRef<Path>) -> Result<Vec<u32>> {
        let file = File::open(path.as_ref())?;
        let store_meta = StoreMeta::read_from(&file)?;
        let payload = meta::read_section(&file, store_meta.universe_off, store_meta.universe_len)?;
        meta::decode_universe(&payload)
    }

    /// Close the handle. Unflushed dirty chunks are discarded; callers
    /// that want durability flush first.
    pub fn close(self) {}

    /// Read one cell at an hour index.
    pub fn read_population(&self, mesh_key: u32, hour: u64) -> Result<i32> {
        let index = self.mesh_index(mesh_key)?;
        self.matrix.read_cell(hour, index)
    }

    /// Read one cell at a datetime.
    pub fn read_population_at(&self, mesh_key: u32, datetime: &str) -> Result<i32> {
        let hour = self.calendar.to_index(datetime)?;
        self.read_population(mesh_key, hour)
    }

    /// Read several meshes at one hour index, in argument order.
    pub fn read_population_multi(&self, mesh_keys: &[u32], hour: u64) -> Result<Vec<i32>> {
        let cols = self.mesh_indices(mesh_keys)?;
        self.matrix.read_row_selection(hour, &cols)
    }

    /// Read several meshes at one datetime.
    pub fn read_population_multi_at(
        &self,
        mesh_keys: &[u32],
        datetime: &str,
    ) -> Result<Vec<i32>> {
        let hour = self.calendar.to_index(datetime)?;
        self.read_population_multi(mesh_keys, hour)
    }

    /// Read one mesh over an inclusive hour-index window.
    pub fn read_time_series(&self, mesh_key: u32, start: u64, end: u64) -> Result<Vec<i32>> {
        let index = self.mesh_index(mesh_key)?;
        self.matrix.read_column_range(start, end, index)
    }

    /// Read several meshes over an inclusive hour-index window into one
    /// dense hour-major buffer: element `(h, i)` sits at
    /// `h * mesh_keys.len() + i`.
    pub fn read_time_series_multi(
        &self,
        mesh_keys: &[u32],
        start: u64,
        end: u64,
    ) -> Result<Vec<i32>> {
        let cols = self.mesh_indices(mesh_keys)?;
        self.matrix.read_rect(start, end, &cols)
    }

    /// Read several meshes between two datetimes, inclusive, into one
    /// dense hour-major buffer.
    pub fn read_time_series_multi_between(
        &self,
        mesh_keys: &[u32],
        start_datetime: &str,
        end_datetime: &str,
    ) -> Result<Vec<i32>> {
        let start = self.calendar.to_index(start_datetime)?;
        let end = self.calendar.to_index(end_datetime)?;
        self.read_time_series_multi(mesh_keys, start, end)
    }

    /// Sum the population over every third-level mesh of one
    /// first-level mesh cell at the given hour. Meshes absent from the
    /// universe contribute zero.
    pub fn read_population_first_mesh(&self, first_mesh: u32, hour: u64) -> Result<i64> {
        let cols: Vec<u64> = crate::mesh::meshes_in_first_mesh(first_mesh)
            .into_iter()
            .filter_map(|key| self.resolver.resolve(key))
            .map(u64::from)
            .filter(|&index| index < self.matrix.cols())
            .collect();
        let values = self.matrix.read_row_selection(hour, &cols)?;
        Ok(values.into_iter().map(i64::from).sum())
    }

    /// Read one mesh between two datetimes, inclusive.
    pub fn read_time_series_between(
        &self,
        mesh_key: u32,
        start_datetime: &str,
        end_datetime: &str,
    ) -> Result<Vec<i32>> {
        let start = self.calendar.to_index(start_datetime)?;
        let end = self.calendar.to_index(end_datetime)?;
        self.read_time_series(mesh_key, start, end)
    }

    /// Write one cell at an hour index.
    pub fn write_population(&self, mesh_key: u32, hour: u64, value: i32) -> Result<()> {
        let index = self.mesh_index(mesh_key)?;
        self.matrix.write_cell(hour, index, value)
    }

    /// Write one cell at a datetime.
    pub fn write_population_at(&self, mesh_key: u32, datetime: &str, value: i32) -> Result<()> {
        let hour = self.calendar.to_index(datetime)?;
        self.write_population(mesh_key, hour, value)
    }

    /// Write several meshes at one hour index.
    pub fn write_population_multi(
        &self,
        mesh_keys: &[u32],
        hour: u64,
        values: &[i32],
    ) -> Result<()> {
        let cols = self.mesh_indices(mesh_keys)?;
        self.matrix.write_row_selection(hour, &cols, values)
    }

    /// Grow the time axis.
    pub fn extend_time(&self, new_rows: u64) -> Result<()> {
        self.matrix.extend_time(new_rows)
    }

    /// Persist dirty chunks and the superblock.
    pub fn flush(&self) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        self.matrix.flush()?;
        let mut store_meta = self.meta.lock()?;
        store_meta.time_rows = self.matrix.rows();
        store_meta.write_to(&self.file)
    }

    /// Declare this store to be the new slab of a composition over the
    /// given historical store. The epoch attribute is inherited from
    /// the source; the split sits at the source's current extent. The
    /// mapping takes effect when the store is reopened.
    pub fn declare_composition(&self, source_path: &Path) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        if self.meta.lock()?.is_composed() {
            return errinput!("store is already composed");
        }

        let source_file = File::open(source_path)
            .map_err(|e| Error::IO(format!("cannot open {}: {e}", source_path.display())))?;
        let source_meta = StoreMeta::read_from(&source_file)?;
        if source_meta.is_composed() {
            return errinput!("nested composition is not supported");
        }

        self.flush()?;

        let mut store_meta = self.meta.lock()?;
        if store_meta.epoch != source_meta.epoch {
            tracing::warn!(
                ours = %store_meta.epoch,
                theirs = %source_meta.epoch,
                "Epoch mismatch; composed store inherits the historical epoch"
            );
        }
        store_meta.epoch = source_meta.epoch;
        store_meta.compose = Some(ComposeRecord {
            source_path: source_path.display().to_string(),
            split_rows: source_meta.time_rows,
        });
        store_meta.write_to(&self.file)?;

        tracing::info!(
            path = %self.path.display(),
            source = %source_path.display(),
            split = source_meta.time_rows,
            "Declared composition"
        );
        Ok(())
    }

    /// (time extent, mesh width).
    pub fn dimensions(&self) -> (u64, u64) {
        (self.matrix.rows(), self.matrix.cols())
    }

    /// Snapshot of the handle's health counters.
    pub fn status(&self) -> StoreMetrics {
        let (cache_hits, cache_misses) = self.matrix.cache_stats();
        let snapshot = StoreMetrics {
            time_rows: self.matrix.rows(),
            mesh_cols: self.matrix.cols(),
            cache_hits,
            cache_misses,
            cached_chunks: self.matrix.cached_chunks(),
            dirty_chunks: self.matrix.dirty_chunks(),
            composed: matches!(self.matrix, Matrix::Composed(_)),
        };
        tracing::debug!(
            time_rows = snapshot.time_rows,
            mesh_cols = snapshot.mesh_cols,
            cache_hits = snapshot.cache_hits,
            cache_misses = snapshot.cache_misses,
            cached_chunks = snapshot.cached_chunks,
            dirty_chunks = snapshot.dirty_chunks,
            composed = snapshot.composed,
            "Store status"
        );
        snapshot
    }

    pub fn epoch(&self) -> String {
        self.calendar.epoch_str().to_string()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn resolver(&self) -> &MeshResolver {
        &self.resolver
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    pub fn cache_bytes(&self) -> usize {
        self.cache_bytes
    }

    fn mesh_index(&self, key: u32) -> Result<u64> {
        let index = self
            .resolver
            .resolve(key)
            .ok_or_else(|| Error::InvalidInput(format!("unknown mesh key {key}")))?;
        // Reject anything past the opened store's width; the resolver
        // and matrix can disagree only on corrupt or mixed files.
        if u64::from(index) >= self.matrix.cols() {
            return errinput!(
                "mesh index {index} outside matrix width {}",
                self.matrix.cols()
            );
        }
        Ok(u64::from(index))
    }

    fn mesh_indices(&self, keys: &[u32]) -> Result<Vec<u64>> {
        keys.iter().map(|&key| self.mesh_index(key)).collect()
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

fn open_historical_slab(record: &ComposeRecord, cache_bytes: usize) -> Result<ChunkedMatrix> {
    let path = Path::new(&record.source_path);
    let file = File::open(path)
        .map_err(|e| Error::IO(format!("cannot open historical slab {}: {e}", path.display())))?;
    let slab_meta = StoreMeta::read_from(&file)?;
    if slab_meta.is_composed() {
        return errdata!("nested composition is not supported");
    }
    if slab_meta.time_rows < record.split_rows {
        return errdata!(
            "historical slab {} has {} rows, split needs {}",
            path.display(),
            slab_meta.time_rows,
            record.split_rows
        );
    }
    Ok(ChunkedMatrix::new(
        Arc::new(file),
        slab_meta.data_off,
        record.split_rows,
        slab_meta.mesh_cols,
        slab_meta.chunk_rows,
        slab_meta.chunk_cols,
        false,
        cache_bytes,
    ))
}
