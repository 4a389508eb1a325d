/// Default chunk height: one leap year in hours.
pub const DEFAULT_CHUNK_ROWS: u32 = 8784;

/// Default chunk width in mesh columns.
pub const DEFAULT_CHUNK_COLS: u32 = 16;

/// Default chunk cache budget in bytes.
pub const DEFAULT_CACHE_BYTES: usize = 32 * 1024 * 1024;

/// Default epoch attribute for newly created stores.
pub const DEFAULT_EPOCH: &str = "2016-01-01 00:00:00";

/// Work queue capacity between CSV producers and the matrix writer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Upper bound on CSV reader threads.
pub const MAX_PRODUCERS: usize = 32;

/// Configuration for creating or opening a store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Epoch attribute, format `YYYY-MM-DD HH:MM:SS` (default: 2016-01-01 00:00:00)
    pub epoch: String,

    /// Chunk height in hours (default: 8784)
    pub chunk_rows: u32,

    /// Chunk width in mesh columns (default: 16)
    pub chunk_cols: u32,

    /// Chunk cache budget in bytes (default: 32MB)
    pub cache_bytes: usize,
}

/// Configuration for one ingestion run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Number of CSV reader threads, capped at `MAX_PRODUCERS` (default: 8)
    pub producers: usize,

    /// Work queue capacity (default: 1024)
    pub queue_capacity: usize,

    /// Progress reporting interval in rows (default: 10000)
    pub batch_size: usize,

    /// Assemble one calendar year in a dense buffer and write it once (default: false)
    pub bulk_write: bool,

    /// Logical hour index mapped to physical row 0 of the target grid.
    /// Non-zero when ingesting the new slab of a composed store.
    pub row_base: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            epoch: DEFAULT_EPOCH.to_string(),
            chunk_rows: DEFAULT_CHUNK_ROWS,
            chunk_cols: DEFAULT_CHUNK_COLS,
            cache_bytes: DEFAULT_CACHE_BYTES,
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            producers: 8,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: 10_000,
            bulk_write: false,
            row_base: 0,
        }
    }
}

impl StoreOptions {
    /// Create options with the given epoch
    pub fn new(epoch: impl Into<String>) -> Self {
        Self {
            epoch: epoch.into(),
            ..Default::default()
        }
    }

    /// Set the chunk geometry
    pub fn chunk_geometry(mut self, rows: u32, cols: u32) -> Self {
        self.chunk_rows = rows;
        self.chunk_cols = cols;
        self
    }

    /// Set the chunk cache budget
    pub fn cache_bytes(mut self, bytes: usize) -> Self {
        self.cache_bytes = bytes;
        self
    }
}

impl IngestOptions {
    /// Set the producer thread count
    pub fn producers(mut self, count: usize) -> Self {
        self.producers = count;
        self
    }

    /// Set the work queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the progress reporting interval
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Enable bulk-year write mode
    pub fn bulk_write(mut self, enabled: bool) -> Self {
        self.bulk_write = enabled;
        self
    }

    /// Set the logical hour index of physical row 0
    pub fn row_base(mut self, base: u64) -> Self {
        self.row_base = base;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_store_options() {
        let options = StoreOptions::default();
        assert_eq!(options.epoch, DEFAULT_EPOCH);
        assert_eq!(options.chunk_rows, 8784);
        assert_eq!(options.chunk_cols, 16);
        assert_eq!(options.cache_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn test_store_options_builder() {
        let options = StoreOptions::new("2020-01-01 00:00:00")
            .chunk_geometry(24, 8)
            .cache_bytes(1024 * 1024);

        assert_eq!(options.epoch, "2020-01-01 00:00:00");
        assert_eq!(options.chunk_rows, 24);
        assert_eq!(options.chunk_cols, 8);
        assert_eq!(options.cache_bytes, 1024 * 1024);
    }

    #[test]
    fn test_ingest_options_builder() {
        let options = IngestOptions::default()
            .producers(4)
            .queue_capacity(64)
            .bulk_write(true)
            .row_base(8784);

        assert_eq!(options.producers, 4);
        assert_eq!(options.queue_capacity, 64);
        assert!(options.bulk_write);
        assert_eq!(options.row_base, 8784);
    }
}
