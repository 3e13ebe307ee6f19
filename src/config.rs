//! Writer configuration
//!
//! Selects the compression method and level for every entry of an archive and how
//! many entries of one batch may be compressed at the same time.

use crate::error::{Result, ZipError};
use crate::writer::CompressionMethod;

/// Level used when the caller passes a negative compression level
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Highest accepted DEFLATE level
pub const MAX_COMPRESSION_LEVEL: i32 = 9;

/// Upper bound for `max_concurrent`
pub const MAX_CONCURRENT_LIMIT: usize = 16;

/// Configuration for an archive opened with [`crate::ZipArchive::open_with`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Compression method applied to every entry (default: Deflate)
    pub compression_method: CompressionMethod,
    /// Compression level (default: 6)
    pub compression_level: u32,
    /// Maximum number of entries of one batch compressed concurrently (default: 1)
    pub max_concurrent: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression_method: CompressionMethod::Deflate,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_concurrent: 1,
        }
    }
}

impl WriterConfig {
    /// Map a caller supplied level to a configuration.
    ///
    /// `0` stores entries uncompressed, `1..=9` selects DEFLATE at that level and a
    /// negative level selects DEFLATE at [`DEFAULT_COMPRESSION_LEVEL`]. Anything
    /// above 9 is rejected rather than clamped.
    pub fn from_level(level: i32) -> Result<Self> {
        let config = match level {
            l if l < 0 => Self::default(),
            0 => Self {
                compression_method: CompressionMethod::Stored,
                compression_level: 0,
                ..Self::default()
            },
            l if l <= MAX_COMPRESSION_LEVEL => Self {
                compression_level: l as u32,
                ..Self::default()
            },
            l => return Err(ZipError::InvalidCompressionLevel(l)),
        };
        Ok(config)
    }

    /// Single worker compressing one entry at a time
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Compress up to 4 entries of a batch at once
    pub fn balanced() -> Self {
        Self {
            max_concurrent: 4,
            ..Self::default()
        }
    }

    /// Compress up to 8 entries of a batch at once
    pub fn aggressive() -> Self {
        Self {
            max_concurrent: 8,
            ..Self::default()
        }
    }

    /// Set max concurrent compressions
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        assert!(max > 0, "max_concurrent must be at least 1");
        assert!(
            max <= MAX_CONCURRENT_LIMIT,
            "max_concurrent should not exceed 16"
        );
        self.max_concurrent = max;
        self
    }

    /// Set compression method
    pub fn with_method(mut self, method: CompressionMethod) -> Self {
        self.compression_method = method;
        self
    }

    /// Set compression level
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Whether batches are compressed on a thread pool
    pub fn is_parallel(&self) -> bool {
        cfg!(feature = "parallel")
            && self.max_concurrent > 1
            && self.compression_method != CompressionMethod::Stored
    }
}
