//! Error types for tzip

use std::io;
use std::path::PathBuf;

/// Result type for tzip operations
pub type Result<T> = std::result::Result<T, ZipError>;

/// Error types that can occur while writing, reading or polling archives
#[derive(Debug)]
pub enum ZipError {
    /// I/O error
    Io(io::Error),
    /// Invalid ZIP format or structure
    InvalidFormat(String),
    /// Entry not found in ZIP archive
    EntryNotFound(String),
    /// Unsupported compression method
    UnsupportedCompression(u16),
    /// Open mode other than `'w'`
    UnsupportedMode(char),
    /// Compression level outside the accepted range
    InvalidCompressionLevel(i32),
    /// Entry names and source paths of a batch differ in length
    LengthMismatch {
        count: usize,
        entries: usize,
        sources: usize,
    },
    /// Entry name that cannot be stored in an archive
    InvalidEntryName(String),
    /// Entry name already present in the archive
    DuplicateEntry(String),
    /// Source file missing or unreadable when the job ran
    SourceUnavailable { path: PathBuf, source: io::Error },
    /// Write handler not issued by this archive
    UnknownHandler,
    /// Decompressed data does not match the stored CRC-32
    CrcMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
    /// Background worker exited before the archive was closed
    WorkerGone,
    /// A previous write failed part way and left the archive unusable
    Poisoned(String),
}

impl std::fmt::Display for ZipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipError::Io(e) => write!(f, "I/O error: {}", e),
            ZipError::InvalidFormat(msg) => write!(f, "Invalid ZIP format: {}", msg),
            ZipError::EntryNotFound(name) => write!(f, "Entry not found: {}", name),
            ZipError::UnsupportedCompression(method) => {
                write!(f, "Unsupported compression method: {}", method)
            }
            ZipError::UnsupportedMode(mode) => {
                write!(f, "Unsupported open mode '{}', only 'w' is available", mode)
            }
            ZipError::InvalidCompressionLevel(level) => {
                write!(f, "Invalid compression level {} (expected 0-9)", level)
            }
            ZipError::LengthMismatch {
                count,
                entries,
                sources,
            } => write!(
                f,
                "Batch length mismatch: count {}, {} entry names, {} source paths",
                count, entries, sources
            ),
            ZipError::InvalidEntryName(name) => write!(f, "Invalid entry name: {:?}", name),
            ZipError::DuplicateEntry(name) => write!(f, "Duplicate entry: {}", name),
            ZipError::SourceUnavailable { path, source } => {
                write!(f, "Cannot read source {}: {}", path.display(), source)
            }
            ZipError::UnknownHandler => write!(f, "Write handler does not belong to this archive"),
            ZipError::CrcMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "CRC mismatch in {}: expected 0x{:08x}, got 0x{:08x}",
                name, expected, actual
            ),
            ZipError::WorkerGone => write!(f, "Archive worker thread terminated unexpectedly"),
            ZipError::Poisoned(cause) => write!(f, "Archive is poisoned: {}", cause),
        }
    }
}

impl std::error::Error for ZipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ZipError::Io(e) => Some(e),
            ZipError::SourceUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        ZipError::Io(err)
    }
}
