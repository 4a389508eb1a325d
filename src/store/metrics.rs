//! Health metrics for an open store handle.

/// A point-in-time snapshot of a handle's state, for monitoring and
/// debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreMetrics {
    /// Current time extent T.
    pub time_rows: u64,
    /// Mesh width N.
    pub mesh_cols: u64,
    /// Chunk cache hits since open (both slabs for composed stores).
    pub cache_hits: usize,
    /// Chunk cache misses since open.
    pub cache_misses: usize,
    /// Chunks currently cached in memory.
    pub cached_chunks: usize,
    /// Chunks modified since the last flush.
    pub dirty_chunks: usize,
    /// Whether the handle serves a composed (virtual) matrix.
    pub composed: bool,
}

impl StoreMetrics {
    /// Cache hit ratio in `[0, 1]`; zero when nothing was read yet.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }
}
