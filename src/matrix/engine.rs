//! Chunked two-dimensional `i32` matrix over one file region.
//!
//! ## Grid layout
//!
//! ```text
//! +----------+----------+----------+
//! | chunk 0  | chunk 1  | chunk 2  |   chunk row 0
//! +----------+----------+----------+
//! | chunk 3  | chunk 4  | chunk 5  |   chunk row 1
//! +----------+----------+----------+
//! | ...                            |
//! ```
//!
//! Chunks sit at fixed, computed offsets, so the file is sparse: a
//! chunk nobody has written occupies no disk blocks and reads as
//! zeros, which is the matrix fill value. Growing the time axis is a
//! metadata change; the new rows materialize on first write.
//!
//! Reads go through the chunk cache, first-hit then miss-filled from
//! disk. Writes land in a dirty map; `flush` persists dirty chunks in
//! id order, drops the read copies of the chunks it touched, and syncs
//! the file. Dropping the handle without a flush discards the dirty
//! chunks.
//!
//! A read-write handle must not be shared by multiple writer threads;
//! read-only handles may be shared freely.

use std::collections::BTreeMap;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::errinput;
use crate::Error;

use super::cache::ChunkCache;
use super::chunk;
use super::layout::ChunkLayout;
use super::plan::{plan_row_selection, BlockSpan, ReadPlan};

pub struct ChunkedMatrix {
    file: Arc<File>,
    data_off: u64,
    rows: AtomicU64,
    layout: ChunkLayout,
    writable: bool,
    cache: Mutex<ChunkCache>,
    dirty: Mutex<BTreeMap<u64, Vec<i32>>>,
}

impl ChunkedMatrix {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file: Arc<File>,
        data_off: u64,
        rows: u64,
        cols: u64,
        chunk_rows: u32,
        chunk_cols: u32,
        writable: bool,
        cache_bytes: usize,
    ) -> Self {
        let layout = ChunkLayout::new(chunk_rows, chunk_cols, cols);
        let cache = ChunkCache::new(cache_bytes, layout.chunk_bytes());
        Self {
            file,
            data_off,
            rows: AtomicU64::new(rows),
            layout,
            writable,
            cache: Mutex::new(cache),
            dirty: Mutex::new(BTreeMap::new()),
        }
    }

    /// Current time extent T.
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::SeqCst)
    }

    /// Mesh width N.
    pub fn cols(&self) -> u64 {
        self.layout.cols
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Read one cell.
    pub fn read_cell(&self, t: u64, m: u64) -> Result<i32> {
        self.check_cell(t, m)?;
        let location = self.layout.locate(t, m);
        self.with_chunk(location.chunk_id, |cells| cells[location.index])
    }

    /// Read a row selection. The columns may be unsorted and may
    /// repeat; the result is in selection order. An empty selection
    /// yields an empty result.
    pub fn read_row_selection(&self, t: u64, cols: &[u64]) -> Result<Vec<i32>> {
        if cols.is_empty() {
            return Ok(Vec::new());
        }
        for &m in cols {
            self.check_cell(t, m)?;
        }

        match plan_row_selection(cols) {
            ReadPlan::Empty => Ok(Vec::new()),
            ReadPlan::SingleCell { col } => {
                let location = self.layout.locate(t, col);
                Ok(vec![
                    self.with_chunk(location.chunk_id, |cells| cells[location.index])?
                ])
            }
            ReadPlan::Contiguous { start, len } => self.read_row_span(t, start, len),
            ReadPlan::ElementList { cols } => {
                let mut out = vec![0i32; cols.len()];
                for (slot, &m) in cols.iter().enumerate() {
                    let location = self.layout.locate(t, m);
                    out[slot] =
                        self.with_chunk(location.chunk_id, |cells| cells[location.index])?;
                }
                Ok(out)
            }
            ReadPlan::BlockUnion { blocks } => {
                self.read_block_union(t, 1, &blocks, cols.len())
            }
        }
    }

    /// Read one mesh column over the inclusive time window `[t0, t1]`.
    pub fn read_column_range(&self, t0: u64, t1: u64, m: u64) -> Result<Vec<i32>> {
        if t1 < t0 {
            return errinput!("time range {t0}..={t1} is inverted");
        }
        self.check_cell(t1, m)?;

        let chunk_rows = u64::from(self.layout.chunk_rows);
        let chunk_cols = self.layout.chunk_cols as usize;
        let chunk_col = m / u64::from(self.layout.chunk_cols);
        let local_col = (m % u64::from(self.layout.chunk_cols)) as usize;

        let mut out = vec![0i32; (t1 - t0 + 1) as usize];
        for chunk_row in self.layout.chunk_rows_covering(t0, t1 + 1) {
            let row0 = self.layout.chunk_row_start(chunk_row);
            let lo = t0.max(row0);
            let hi = (t1 + 1).min(row0 + chunk_rows);
            let id = self.layout.chunk_id(chunk_row, chunk_col);
            self.with_chunk(id, |cells| {
                for t in lo..hi {
                    let local_row = (t - row0) as usize;
                    out[(t - t0) as usize] = cells[local_row * chunk_cols + local_col];
                }
            })?;
        }
        Ok(out)
    }

    /// Read a union of column runs sharing the row window
    /// `[t0, t0+nrows)` into a dense row-major buffer with the given
    /// row stride. Each requested cell is visited exactly once.
    pub fn read_block_union(
        &self,
        t0: u64,
        nrows: u64,
        blocks: &[BlockSpan],
        stride: usize,
    ) -> Result<Vec<i32>> {
        if t0 + nrows > self.rows() {
            return errinput!(
                "row window {t0}..{} exceeds time extent {}",
                t0 + nrows,
                self.rows()
            );
        }
        for block in blocks {
            if block.ncols == 0 {
                return errinput!("empty block span at file column {}", block.dcol0);
            }
            if block.dcol0 + block.ncols as u64 > self.cols() {
                return errinput!(
                    "block span {}..{} exceeds mesh width {}",
                    block.dcol0,
                    block.dcol0 + block.ncols as u64,
                    self.cols()
                );
            }
            if block.mcol0 + block.ncols > stride {
                return errinput!(
                    "block span at memory column {} overflows stride {stride}",
                    block.mcol0
                );
            }
        }

        let mut out = vec![0i32; nrows as usize * stride];
        for block in blocks {
            self.copy_block(t0, nrows, block, stride, &mut out)?;
        }
        Ok(out)
    }

    /// Write one cell.
    pub fn write_cell(&self, t: u64, m: u64, value: i32) -> Result<()> {
        self.check_writable()?;
        self.check_cell(t, m)?;
        let location = self.layout.locate(t, m);
        self.with_chunk_mut(location.chunk_id, |cells| cells[location.index] = value)
    }

    /// Write a row selection, value i to column i.
    pub fn write_row_selection(&self, t: u64, cols: &[u64], values: &[i32]) -> Result<()> {
        self.check_writable()?;
        if cols.len() != values.len() {
            return errinput!(
                "selection has {} columns but {} values",
                cols.len(),
                values.len()
            );
        }
        for &m in cols {
            self.check_cell(t, m)?;
        }
        for (&m, &value) in cols.iter().zip(values) {
            let location = self.layout.locate(t, m);
            self.with_chunk_mut(location.chunk_id, |cells| cells[location.index] = value)?;
        }
        Ok(())
    }

    /// Write a dense row-major `nrows × ncols` buffer at time offset
    /// `t0`, mesh columns `[0, ncols)`. Any dirty chunks are flushed
    /// first; the buffer then goes straight to disk.
    pub fn write_bulk(&self, buffer: &[i32], t0: u64, nrows: u64, ncols: u64) -> Result<()> {
        self.check_writable()?;
        if ncols > self.cols() {
            return errinput!("bulk width {ncols} exceeds mesh width {}", self.cols());
        }
        if t0 + nrows > self.rows() {
            return errinput!(
                "bulk window {t0}..{} exceeds time extent {}",
                t0 + nrows,
                self.rows()
            );
        }
        if buffer.len() as u64 != nrows * ncols {
            return errinput!(
                "bulk buffer holds {} cells, window needs {}",
                buffer.len(),
                nrows * ncols
            );
        }
        if nrows == 0 || ncols == 0 {
            return Ok(());
        }

        self.flush()?;

        let chunk_rows = u64::from(self.layout.chunk_rows);
        let chunk_cols = u64::from(self.layout.chunk_cols);
        let file_len = self.file.metadata()?.len();
        let mut scratch = vec![0i32; self.layout.chunk_elems()];
        let mut encoded = vec![0u8; self.layout.chunk_bytes()];
        let t_end = t0 + nrows;

        for chunk_row in self.layout.chunk_rows_covering(t0, t_end) {
            let row0 = self.layout.chunk_row_start(chunk_row);
            let row1 = row0 + chunk_rows;
            let row_lo = t0.max(row0);
            let row_hi = t_end.min(row1);

            for chunk_col in self.layout.chunk_cols_covering(0, ncols) {
                let col0 = self.layout.chunk_col_start(chunk_col);
                let col1 = (col0 + chunk_cols).min(self.cols());
                let col_hi = ncols.min(col1);
                if col0 >= col_hi {
                    continue;
                }

                let id = self.layout.chunk_id(chunk_row, chunk_col);
                let offset = self.layout.chunk_offset(self.data_off, id);

                // A chunk whose every live cell lies inside the window
                // needs no read-modify-write.
                let covered = row_lo == row0 && row_hi == row1 && col_hi == col1;
                if !covered && offset < file_len {
                    let available = ((file_len - offset) as usize).min(encoded.len());
                    self.file.read_exact_at(&mut encoded[..available], offset)?;
                    chunk::decode(&encoded[..available], &mut scratch);
                } else {
                    scratch.fill(0);
                }

                let width = (col_hi - col0) as usize;
                for t in row_lo..row_hi {
                    let src = ((t - t0) * ncols + col0) as usize;
                    let dst = (t - row0) as usize * chunk_cols as usize;
                    scratch[dst..dst + width].copy_from_slice(&buffer[src..src + width]);
                }

                // An all-zero chunk past the end of the file stays a hole.
                if offset >= file_len && chunk::is_all_zero(&scratch) {
                    continue;
                }
                chunk::encode(&scratch, &mut encoded);
                self.file.write_all_at(&encoded, offset)?;
            }
        }

        self.cache.lock()?.clear();
        self.file.sync_all()?;
        Ok(())
    }

    /// Grow the time axis. Equal extent is a no-op; shrinking fails.
    /// New rows read as zero with no data I/O.
    pub fn extend_time(&self, new_rows: u64) -> Result<()> {
        self.check_writable()?;
        let current = self.rows();
        if new_rows == current {
            return Ok(());
        }
        if new_rows < current {
            return errinput!("cannot shrink time axis from {current} to {new_rows}");
        }
        self.rows.store(new_rows, Ordering::SeqCst);
        Ok(())
    }

    /// Persist dirty chunks in id order and sync the file. Read copies
    /// of the chunks written are dropped from the cache. On failure
    /// every unwritten dirty chunk stays in memory for a later flush.
    pub fn flush(&self) -> Result<()> {
        self.check_writable()?;

        let mut dirty = self.dirty.lock()?;
        if dirty.is_empty() {
            return Ok(());
        }

        let file_len = self.file.metadata()?.len();
        let mut encoded = vec![0u8; self.layout.chunk_bytes()];
        let mut written = Vec::with_capacity(dirty.len());

        for (&id, cells) in dirty.iter() {
            let offset = self.layout.chunk_offset(self.data_off, id);
            // All-zero chunks past the end of the file stay holes.
            if offset >= file_len && chunk::is_all_zero(cells) {
                written.push(id);
                continue;
            }
            chunk::encode(cells, &mut encoded);
            self.file.write_all_at(&encoded, offset)?;
            written.push(id);
        }

        for id in &written {
            dirty.remove(id);
        }
        drop(dirty);

        let mut cache = self.cache.lock()?;
        for id in &written {
            cache.remove(*id);
        }
        drop(cache);

        self.file.sync_all()?;
        Ok(())
    }

    /// Count of chunks modified since the last flush.
    pub fn dirty_chunks(&self) -> usize {
        self.dirty.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// (hits, misses) of the chunk cache.
    pub fn cache_stats(&self) -> (usize, usize) {
        self.cache.lock().map(|c| c.stats()).unwrap_or((0, 0))
    }

    /// Chunks currently held by the cache.
    pub fn cached_chunks(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn copy_block(
        &self,
        t0: u64,
        nrows: u64,
        block: &BlockSpan,
        stride: usize,
        out: &mut [i32],
    ) -> Result<()> {
        let chunk_rows = u64::from(self.layout.chunk_rows);
        let chunk_cols = u64::from(self.layout.chunk_cols);
        let t_end = t0 + nrows;
        let col_end = block.dcol0 + block.ncols as u64;

        for chunk_row in self.layout.chunk_rows_covering(t0, t_end) {
            let row0 = self.layout.chunk_row_start(chunk_row);
            let row_lo = t0.max(row0);
            let row_hi = t_end.min(row0 + chunk_rows);

            for chunk_col in self.layout.chunk_cols_covering(block.dcol0, col_end) {
                let col0 = self.layout.chunk_col_start(chunk_col);
                let lo = block.dcol0.max(col0);
                let hi = col_end.min(col0 + chunk_cols);
                if lo >= hi {
                    continue;
                }

                let id = self.layout.chunk_id(chunk_row, chunk_col);
                let width = (hi - lo) as usize;
                self.with_chunk(id, |cells| {
                    for t in row_lo..row_hi {
                        let src =
                            (t - row0) as usize * chunk_cols as usize + (lo - col0) as usize;
                        let dst = (t - t0) as usize * stride
                            + block.mcol0
                            + (lo - block.dcol0) as usize;
                        out[dst..dst + width].copy_from_slice(&cells[src..src + width]);
                    }
                })?;
            }
        }
        Ok(())
    }

    fn read_row_span(&self, t: u64, start: u64, len: usize) -> Result<Vec<i32>> {
        let block = BlockSpan {
            dcol0: start,
            mcol0: 0,
            ncols: len,
        };
        let mut out = vec![0i32; len];
        self.copy_block(t, 1, &block, len, &mut out)?;
        Ok(out)
    }

    fn with_chunk<R>(&self, id: u64, f: impl FnOnce(&[i32]) -> R) -> Result<R> {
        {
            let dirty = self.dirty.lock()?;
            if let Some(cells) = dirty.get(&id) {
                return Ok(f(cells));
            }
        }
        if let Some(cells) = self.cache.lock()?.get(id) {
            return Ok(f(&cells));
        }

        let cells: Arc<[i32]> = self.read_chunk(id)?.into();
        let result = f(&cells);
        self.cache.lock()?.insert(id, cells);
        Ok(result)
    }

    fn with_chunk_mut(&self, id: u64, f: impl FnOnce(&mut [i32])) -> Result<()> {
        {
            let mut dirty = self.dirty.lock()?;
            if let Some(cells) = dirty.get_mut(&id) {
                f(cells);
                return Ok(());
            }
        }

        // Seed the dirty copy from the read cache or from disk. The
        // read copy is dropped: the dirty copy supersedes it.
        let cached = {
            let mut cache = self.cache.lock()?;
            let cells = cache.get(id);
            if cells.is_some() {
                cache.remove(id);
            }
            cells
        };
        let base = match cached {
            Some(cells) => cells.to_vec(),
            None => self.read_chunk(id)?,
        };

        let mut dirty = self.dirty.lock()?;
        let cells = dirty.entry(id).or_insert(base);
        f(cells);
        Ok(())
    }

    fn read_chunk(&self, id: u64) -> Result<Vec<i32>> {
        let mut cells = vec![0i32; self.layout.chunk_elems()];
        let offset = self.layout.chunk_offset(self.data_off, id);
        let file_len = self.file.metadata()?.len();
        if offset < file_len {
            let available = ((file_len - offset) as usize).min(self.layout.chunk_bytes());
            let mut bytes = vec![0u8; available];
            self.file.read_exact_at(&mut bytes, offset)?;
            chunk::decode(&bytes, &mut cells);
        }
        Ok(cells)
    }

    fn check_cell(&self, t: u64, m: u64) -> Result<()> {
        if t >= self.rows() {
            return errinput!("time index {t} out of range 0..{}", self.rows());
        }
        if m >= self.cols() {
            return errinput!("mesh index {m} out of range 0..{}", self.cols());
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }
}
