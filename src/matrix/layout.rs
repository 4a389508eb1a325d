//! Chunk geometry arithmetic.
//!
//! The matrix is tiled into `chunk_rows × chunk_cols` rectangles laid
//! out on a fixed grid: chunk `(ct, cm)` lives at linear id
//! `ct * chunks_per_row + cm`, and its file position is
//! `data_off + id * chunk_bytes`. Because the mesh width is constant
//! for the life of a store, growing the time axis only appends chunk
//! rows; no existing chunk ever moves.

/// Geometry of one chunked grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub chunk_rows: u32,
    pub chunk_cols: u32,
    /// Mesh width N of the matrix.
    pub cols: u64,
}

/// Position of a cell inside its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellLocation {
    pub chunk_id: u64,
    /// Row-major index inside the chunk.
    pub index: usize,
}

impl ChunkLayout {
    pub fn new(chunk_rows: u32, chunk_cols: u32, cols: u64) -> Self {
        debug_assert!(chunk_rows > 0 && chunk_cols > 0);
        Self {
            chunk_rows,
            chunk_cols,
            cols,
        }
    }

    /// Chunks per chunk-row of the grid.
    pub fn chunks_per_row(&self) -> u64 {
        self.cols.div_ceil(u64::from(self.chunk_cols))
    }

    /// Cells per chunk.
    pub fn chunk_elems(&self) -> usize {
        self.chunk_rows as usize * self.chunk_cols as usize
    }

    /// Encoded bytes per chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_elems() * 4
    }

    /// Linear id of chunk `(ct, cm)`.
    pub fn chunk_id(&self, chunk_row: u64, chunk_col: u64) -> u64 {
        chunk_row * self.chunks_per_row() + chunk_col
    }

    /// File offset of a chunk.
    pub fn chunk_offset(&self, data_off: u64, chunk_id: u64) -> u64 {
        data_off + chunk_id * self.chunk_bytes() as u64
    }

    /// Locate the chunk and in-chunk index of cell `(t, m)`.
    pub fn locate(&self, t: u64, m: u64) -> CellLocation {
        let chunk_row = t / u64::from(self.chunk_rows);
        let chunk_col = m / u64::from(self.chunk_cols);
        let local_row = (t % u64::from(self.chunk_rows)) as usize;
        let local_col = (m % u64::from(self.chunk_cols)) as usize;
        CellLocation {
            chunk_id: self.chunk_id(chunk_row, chunk_col),
            index: local_row * self.chunk_cols as usize + local_col,
        }
    }

    /// First time row covered by a chunk row.
    pub fn chunk_row_start(&self, chunk_row: u64) -> u64 {
        chunk_row * u64::from(self.chunk_rows)
    }

    /// First mesh column covered by a chunk column.
    pub fn chunk_col_start(&self, chunk_col: u64) -> u64 {
        chunk_col * u64::from(self.chunk_cols)
    }

    /// Chunk rows intersecting the half-open time window `[t0, t1)`.
    pub fn chunk_rows_covering(&self, t0: u64, t1: u64) -> std::ops::Range<u64> {
        if t0 >= t1 {
            return 0..0;
        }
        let first = t0 / u64::from(self.chunk_rows);
        let last = (t1 - 1) / u64::from(self.chunk_rows);
        first..last + 1
    }

    /// Chunk columns intersecting the half-open mesh window `[m0, m1)`.
    pub fn chunk_cols_covering(&self, m0: u64, m1: u64) -> std::ops::Range<u64> {
        if m0 >= m1 {
            return 0..0;
        }
        let first = m0 / u64::from(self.chunk_cols);
        let last = (m1 - 1) / u64::from(self.chunk_cols);
        first..last + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ChunkLayout {
        ChunkLayout::new(8784, 16, 100)
    }

    #[test]
    fn test_grid_dimensions() {
        let layout = layout();
        assert_eq!(layout.chunks_per_row(), 7); // ceil(100 / 16)
        assert_eq!(layout.chunk_elems(), 8784 * 16);
        assert_eq!(layout.chunk_bytes(), 8784 * 16 * 4);
    }

    #[test]
    fn test_locate() {
        let layout = layout();

        let origin = layout.locate(0, 0);
        assert_eq!(origin.chunk_id, 0);
        assert_eq!(origin.index, 0);

        let cell = layout.locate(1, 1);
        assert_eq!(cell.chunk_id, 0);
        assert_eq!(cell.index, 16 + 1);

        // Second chunk column.
        let cell = layout.locate(0, 16);
        assert_eq!(cell.chunk_id, 1);
        assert_eq!(cell.index, 0);

        // Second chunk row.
        let cell = layout.locate(8784, 0);
        assert_eq!(cell.chunk_id, 7);
        assert_eq!(cell.index, 0);

        let cell = layout.locate(8785, 33);
        assert_eq!(cell.chunk_id, 7 + 2);
        assert_eq!(cell.index, 16 + 1);
    }

    #[test]
    fn test_chunk_offsets() {
        let layout = layout();
        let data_off = 4096;
        assert_eq!(layout.chunk_offset(data_off, 0), 4096);
        assert_eq!(
            layout.chunk_offset(data_off, 3),
            4096 + 3 * 8784 * 16 * 4
        );
    }

    #[test]
    fn test_covering_ranges() {
        let layout = ChunkLayout::new(10, 4, 100);

        assert_eq!(layout.chunk_rows_covering(0, 10), 0..1);
        assert_eq!(layout.chunk_rows_covering(0, 11), 0..2);
        assert_eq!(layout.chunk_rows_covering(9, 21), 0..3);
        assert_eq!(layout.chunk_rows_covering(5, 5), 0..0);

        assert_eq!(layout.chunk_cols_covering(0, 4), 0..1);
        assert_eq!(layout.chunk_cols_covering(3, 9), 0..3);
    }
}
