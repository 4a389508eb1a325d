//! Virtual composition of two backing matrices along the time axis.
//!
//! A composed matrix `V[t, m]` serves rows `[0, split)` from a
//! historical slab and rows `[split, split + T_new)` from a new slab,
//! zero-filling wherever a slab is narrower than the composed width
//! `max(N_hist, N_new)`. The mapping is declared once at composition
//! time and is read-only thereafter; readers never need to know which
//! slab a cell lives in.

use std::cmp::max;

use crate::error::Result;
use crate::{errdata, errinput};
use crate::Error;

use super::engine::ChunkedMatrix;
use super::plan::BlockSpan;

/// Two physical slabs joined at a split row.
pub struct VirtualMatrix {
    hist: ChunkedMatrix,
    new: ChunkedMatrix,
    split: u64,
}

impl VirtualMatrix {
    /// Join `hist` rows `[0, split)` with `new` rows appended after.
    /// The historical engine must expose exactly `split` rows.
    pub fn new(hist: ChunkedMatrix, new: ChunkedMatrix, split: u64) -> Result<Self> {
        if hist.rows() != split {
            return errdata!(
                "historical slab exposes {} rows but the split is {split}",
                hist.rows()
            );
        }
        Ok(Self { hist, new, split })
    }

    /// Logical time extent: split plus the new slab's extent.
    pub fn rows(&self) -> u64 {
        self.split + self.new.rows()
    }

    /// Logical mesh width: the wider of the two slabs.
    pub fn cols(&self) -> u64 {
        max(self.hist.cols(), self.new.cols())
    }

    pub fn split(&self) -> u64 {
        self.split
    }

    pub fn read_cell(&self, t: u64, m: u64) -> Result<i32> {
        self.check_cell(t, m)?;
        let (slab, local_t) = self.slab_for(t);
        if m >= slab.cols() {
            return Ok(0);
        }
        slab.read_cell(local_t, m)
    }

    pub fn read_row_selection(&self, t: u64, cols: &[u64]) -> Result<Vec<i32>> {
        if cols.is_empty() {
            return Ok(Vec::new());
        }
        for &m in cols {
            self.check_cell(t, m)?;
        }

        let (slab, local_t) = self.slab_for(t);

        // Columns beyond the slab's width read zero; the rest pass
        // through in selection order.
        let mut in_range = Vec::with_capacity(cols.len());
        let mut narrow_cols = Vec::with_capacity(cols.len());
        for (slot, &m) in cols.iter().enumerate() {
            if m < slab.cols() {
                in_range.push(slot);
                narrow_cols.push(m);
            }
        }

        let mut out = vec![0i32; cols.len()];
        if !narrow_cols.is_empty() {
            let values = slab.read_row_selection(local_t, &narrow_cols)?;
            for (slot, value) in in_range.into_iter().zip(values) {
                out[slot] = value;
            }
        }
        Ok(out)
    }

    pub fn read_column_range(&self, t0: u64, t1: u64, m: u64) -> Result<Vec<i32>> {
        if t1 < t0 {
            return errinput!("time range {t0}..={t1} is inverted");
        }
        self.check_cell(t1, m)?;

        let mut out = Vec::with_capacity((t1 - t0 + 1) as usize);

        if t0 < self.split {
            let hist_end = t1.min(self.split - 1);
            if m < self.hist.cols() {
                out.extend(self.hist.read_column_range(t0, hist_end, m)?);
            } else {
                out.resize((hist_end - t0 + 1) as usize, 0);
            }
        }
        if t1 >= self.split {
            let new_start = t0.max(self.split) - self.split;
            let new_end = t1 - self.split;
            if m < self.new.cols() {
                out.extend(self.new.read_column_range(new_start, new_end, m)?);
            } else {
                out.resize(out.len() + (new_end - new_start + 1) as usize, 0);
            }
        }
        Ok(out)
    }

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
        let t_end = t0 + nrows;

        if t0 < self.split {
            let window = t_end.min(self.split) - t0;
            self.union_into(&self.hist, t0, window, blocks, stride, &mut out, 0)?;
        }
        if t_end > self.split {
            let start = t0.max(self.split);
            let window = t_end - start;
            let dst_row = (start - t0) as usize;
            self.union_into(
                &self.new,
                start - self.split,
                window,
                blocks,
                stride,
                &mut out,
                dst_row,
            )?;
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn union_into(
        &self,
        slab: &ChunkedMatrix,
        local_t0: u64,
        nrows: u64,
        blocks: &[BlockSpan],
        stride: usize,
        out: &mut [i32],
        dst_row: usize,
    ) -> Result<()> {
        // Clip every span at the slab's width; the clipped remainder
        // stays zero in the output.
        let clipped: Vec<BlockSpan> = blocks
            .iter()
            .filter(|block| block.dcol0 < slab.cols())
            .map(|block| BlockSpan {
                dcol0: block.dcol0,
                mcol0: block.mcol0,
                ncols: block
                    .ncols
                    .min((slab.cols() - block.dcol0) as usize),
            })
            .collect();
        if clipped.is_empty() {
            return Ok(());
        }

        let part = slab.read_block_union(local_t0, nrows, &clipped, stride)?;
        let dst = dst_row * stride;
        out[dst..dst + part.len()].copy_from_slice(&part);
        Ok(())
    }

    /// Cache counters summed over both slabs.
    pub fn cache_stats(&self) -> (usize, usize) {
        let (hist_hits, hist_misses) = self.hist.cache_stats();
        let (new_hits, new_misses) = self.new.cache_stats();
        (hist_hits + new_hits, hist_misses + new_misses)
    }

    pub fn cached_chunks(&self) -> usize {
        self.hist.cached_chunks() + self.new.cached_chunks()
    }

    fn slab_for(&self, t: u64) -> (&ChunkedMatrix, u64) {
        if t < self.split {
            (&self.hist, t)
        } else {
            (&self.new, t - self.split)
        }
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
}

/// A matrix a reader can open without caring whether it is one grid or
/// a composition of two.
pub enum Matrix {
    Plain(ChunkedMatrix),
    Composed(VirtualMatrix),
}

impl Matrix {
    pub fn rows(&self) -> u64 {
        match self {
            Matrix::Plain(m) => m.rows(),
            Matrix::Composed(v) => v.rows(),
        }
    }

    pub fn cols(&self) -> u64 {
        match self {
            Matrix::Plain(m) => m.cols(),
            Matrix::Composed(v) => v.cols(),
        }
    }

    pub fn read_cell(&self, t: u64, m: u64) -> Result<i32> {
        match self {
            Matrix::Plain(matrix) => matrix.read_cell(t, m),
            Matrix::Composed(virt) => virt.read_cell(t, m),
        }
    }

    pub fn read_row_selection(&self, t: u64, cols: &[u64]) -> Result<Vec<i32>> {
        match self {
            Matrix::Plain(matrix) => matrix.read_row_selection(t, cols),
            Matrix::Composed(virt) => virt.read_row_selection(t, cols),
        }
    }

    pub fn read_column_range(&self, t0: u64, t1: u64, m: u64) -> Result<Vec<i32>> {
        match self {
            Matrix::Plain(matrix) => matrix.read_column_range(t0, t1, m),
            Matrix::Composed(virt) => virt.read_column_range(t0, t1, m),
        }
    }

    pub fn read_block_union(
        &self,
        t0: u64,
        nrows: u64,
        blocks: &[BlockSpan],
        stride: usize,
    ) -> Result<Vec<i32>> {
        match self {
            Matrix::Plain(matrix) => matrix.read_block_union(t0, nrows, blocks, stride),
            Matrix::Composed(virt) => virt.read_block_union(t0, nrows, blocks, stride),
        }
    }

    pub fn write_cell(&self, t: u64, m: u64, value: i32) -> Result<()> {
        match self {
            Matrix::Plain(matrix) => matrix.write_cell(t, m, value),
            Matrix::Composed(_) => Err(Error::ReadOnly),
        }
    }

    pub fn write_row_selection(&self, t: u64, cols: &[u64], values: &[i32]) -> Result<()> {
        match self {
            Matrix::Plain(matrix) => matrix.write_row_selection(t, cols, values),
            Matrix::Composed(_) => Err(Error::ReadOnly),
        }
    }

    pub fn write_bulk(&self, buffer: &[i32], t0: u64, nrows: u64, ncols: u64) -> Result<()> {
        match self {
            Matrix::Plain(matrix) => matrix.write_bulk(buffer, t0, nrows, ncols),
            Matrix::Composed(_) => Err(Error::ReadOnly),
        }
    }

    pub fn extend_time(&self, new_rows: u64) -> Result<()> {
        match self {
            Matrix::Plain(matrix) => matrix.extend_time(new_rows),
            Matrix::Composed(_) => Err(Error::ReadOnly),
        }
    }

    pub fn flush(&self) -> Result<()> {
        match self {
            Matrix::Plain(matrix) => matrix.flush(),
            Matrix::Composed(_) => Err(Error::ReadOnly),
        }
    }

    /// Read the rectangle `[t0, t1] × cols` into a dense row-major
    /// buffer (hour-major, one row per hour, stride `cols.len()`).
    /// The read strategy follows the row-selection planner: one
    /// rectangular read per ascending run, or per-cell visits when the
    /// selection is fragmented past the threshold.
    pub fn read_rect(&self, t0: u64, t1: u64, cols: &[u64]) -> Result<Vec<i32>> {
        if cols.is_empty() {
            return Ok(Vec::new());
        }
        if t1 < t0 {
            return errinput!("time range {t0}..={t1} is inverted");
        }
        let nrows = t1 - t0 + 1;

        match super::plan::plan_row_selection(cols) {
            super::plan::ReadPlan::Empty => Ok(Vec::new()),
            super::plan::ReadPlan::SingleCell { col } => self.read_column_range(t0, t1, col),
            super::plan::ReadPlan::Contiguous { start, len } => {
                let span = BlockSpan {
                    dcol0: start,
                    mcol0: 0,
                    ncols: len,
                };
                self.read_block_union(t0, nrows, &[span], len)
            }
            super::plan::ReadPlan::ElementList { cols } => {
                let mut out = Vec::with_capacity(nrows as usize * cols.len());
                for t in t0..=t1 {
                    out.extend(self.read_row_selection(t, &cols)?);
                }
                Ok(out)
            }
            super::plan::ReadPlan::BlockUnion { blocks } => {
                self.read_block_union(t0, nrows, &blocks, cols.len())
            }
        }
    }

    /// (hits, misses) of the chunk cache(s).
    pub fn cache_stats(&self) -> (usize, usize) {
        match self {
            Matrix::Plain(matrix) => matrix.cache_stats(),
            Matrix::Composed(virt) => virt.cache_stats(),
        }
    }

    /// Chunks currently cached in memory.
    pub fn cached_chunks(&self) -> usize {
        match self {
            Matrix::Plain(matrix) => matrix.cached_chunks(),
            Matrix::Composed(virt) => virt.cached_chunks(),
        }
    }

    /// Chunks modified since the last flush.
    pub fn dirty_chunks(&self) -> usize {
        match self {
            Matrix::Plain(matrix) => matrix.dirty_chunks(),
            Matrix::Composed(_) => 0,
        }
    }
}
