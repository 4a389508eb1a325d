//! Dense year buffer for bulk-mode ingestion.
//!
//! Bulk mode assembles one calendar year of cells (`rows × N` i32,
//! about 51 GiB for the full mesh universe) in a single
//! zero-initialized allocation and writes the matrix once. The buffer
//! is 4096-byte aligned and advised as huge-page eligible so the fault
//! and TLB cost of touching it stays tolerable.
//!
//! Producers write cells concurrently without a queue. Stores are
//! relaxed atomics: the pipeline guarantees no two producers own the
//! same cell, the atomics only keep disjoint concurrent writes
//! well-defined.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::atomic::{AtomicI32, Ordering};

/// The alignment of the buffer, matching the direct-I/O block size.
const ALIGNMENT: usize = 4096;

pub struct BulkBuffer {
    data: *mut i32,
    rows: usize,
    cols: usize,
    layout: Layout,
}

unsafe impl Send for BulkBuffer {}
unsafe impl Sync for BulkBuffer {}

impl BulkBuffer {
    /// Allocate a zeroed `rows × cols` buffer. Returns `None` when the
    /// allocation fails, which callers treat as the signal to fall
    /// back to streaming mode.
    pub fn zeroed(rows: usize, cols: usize) -> Option<Self> {
        let cells = rows.checked_mul(cols)?;
        let bytes = cells.checked_mul(4)?;
        if bytes == 0 {
            return None;
        }

        let layout = Layout::from_size_align(bytes, ALIGNMENT).ok()?;
        let data = unsafe { alloc_zeroed(layout) } as *mut i32;
        if data.is_null() {
            return None;
        }

        let buffer = Self {
            data,
            rows,
            cols,
            layout,
        };
        buffer.advise_huge_pages();
        Some(buffer)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Store one cell. Callers must keep concurrent writers on
    /// disjoint cells; the last store to a cell wins.
    pub fn store(&self, row: usize, col: usize, value: i32) {
        assert!(row < self.rows && col < self.cols);
        let slot = unsafe { &*(self.data.add(row * self.cols + col) as *const AtomicI32) };
        slot.store(value, Ordering::Relaxed);
    }

    /// Read one cell.
    pub fn load(&self, row: usize, col: usize) -> i32 {
        assert!(row < self.rows && col < self.cols);
        unsafe { self.data.add(row * self.cols + col).read() }
    }

    /// View the whole buffer. Requires `&mut self`: exclusive access
    /// means no concurrent stores.
    pub fn as_slice(&mut self) -> &[i32] {
        unsafe { std::slice::from_raw_parts(self.data, self.rows * self.cols) }
    }

    #[cfg(target_os = "linux")]
    fn advise_huge_pages(&self) {
        unsafe {
            libc::madvise(
                self.data as *mut libc::c_void,
                self.layout.size(),
                libc::MADV_HUGEPAGE,
            );
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn advise_huge_pages(&self) {}
}

impl Drop for BulkBuffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.data as *mut u8, self.layout) }
    }
}
