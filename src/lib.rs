//! # tzip: Background ZIP Writing
//!
//! `tzip` writes ZIP archives on a background thread. A caller opens an archive,
//! submits batches of files as write jobs and gets a handler back immediately.
//! The handler can be polled, waited on, or awaited, and closing the archive
//! drains the queue and writes the central directory.
//!
//! ## Features
//!
//! - **Background writes**: one worker thread per archive, jobs run in order
//! - **Pollable status**: `Pending`, then exactly one of `Ok` or `Error`, forever
//! - **All or nothing jobs**: sources are opened before a job writes anything
//! - **Parallel compression**: batches compressed on a bounded pool (`parallel`)
//! - **Streaming writer and reader**: DEFLATE, stored, zstd (`zstd-support`), ZIP64
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use tzip::{WriteStatus, ZipArchive};
//!
//! let mut zip = ZipArchive::open("test.zip", 7, 'w')?;
//! let handler = zip.write_files(
//!     &["test.txt", "test/test3.txt"],
//!     &["test/test.txt", "test/test/test3.txt"],
//!     2,
//! )?;
//!
//! loop {
//!     match zip.status(handler)? {
//!         WriteStatus::Ok => break,
//!         WriteStatus::Error => {
//!             eprintln!("{:?}", zip.job_error(handler)?);
//!             break;
//!         }
//!         WriteStatus::Pending => std::thread::sleep(Duration::from_millis(100)),
//!     }
//! }
//! zip.close()?;
//! # Ok::<(), tzip::ZipError>(())
//! ```
//!
//! ### Reading the result
//!
//! ```no_run
//! use tzip::StreamingZipReader;
//!
//! let mut reader = StreamingZipReader::open("test.zip")?;
//! for entry in reader.entries() {
//!     println!("{}: {} bytes", entry.name, entry.uncompressed_size);
//! }
//! let data = reader.read_entry_by_name("test.txt")?;
//! # Ok::<(), tzip::ZipError>(())
//! ```

pub mod archive;
pub mod client;
pub mod config;
pub mod error;
mod format;
pub mod job;
pub mod reader;
pub mod status;
mod worker;
pub mod writer;

#[cfg(feature = "parallel")]
mod parallel;

pub use archive::ZipArchive;
pub use config::WriterConfig;
pub use error::{Result, ZipError};
pub use job::{BatchEntry, WriteHandler};
pub use reader::{StreamingZipReader, ZipEntry};
pub use status::WriteStatus;
pub use writer::{CompressedEntry, CompressionMethod, StreamingZipWriter};
