// Player construction options

use brook_bufpool::PoolConfig;
use std::path::PathBuf;

/// Bytes pulled from the source per read.
pub const DEFAULT_READ_CHUNK: usize = 2048;

/// High-water mark on bytes retained in the byte ring.
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 512 * 1024;

/// Construction-time player options.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Sizing of the playback buffer pool. Buffers are allocated once at
    /// construction; a stream whose packets cannot fit fails the session.
    pub pool: PoolConfig,
    /// In-flight buffers required before the sink is started. EOF starts the
    /// sink early with whatever is queued.
    pub start_threshold: usize,
    /// Bytes requested from the source per read call.
    pub read_chunk: usize,
    /// Ring high-water mark: ingestion pauses once this many unparsed
    /// bytes are retained and resumes when the parser has drained half of
    /// them, so a fast source cannot pull the whole stream into memory.
    pub max_buffered_bytes: usize,
    /// When set, every downloaded byte is tee'd to this path and the path is
    /// announced once the whole stream has been written.
    pub cache_path: Option<PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            start_threshold: pool.buffer_count - 1,
            pool,
            read_chunk: DEFAULT_READ_CHUNK,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            cache_path: None,
        }
    }
}

impl PlayerConfig {
    /// Threshold clamped to what the pool can actually hold. At least one
    /// buffer must be in flight before the sink can start.
    pub fn effective_start_threshold(&self) -> usize {
        self.start_threshold
            .min(self.pool.buffer_count.saturating_sub(1))
            .max(1)
    }

    /// High-water mark clamped so at least one read chunk always fits.
    pub fn effective_max_buffered(&self) -> usize {
        self.max_buffered_bytes.max(self.read_chunk)
    }
}
