//! Archive handle: open, submit batch writes, poll or wait, close
//!
//! A [`ZipArchive`] owns the output file through its background worker. Write jobs
//! are queued to the worker and return a [`WriteHandler`] straight away; the
//! handler is then polled with [`ZipArchive::status`] or waited on with
//! [`ZipArchive::wait`]. [`ZipArchive::close`] drains the queue, writes the
//! central directory and releases the file.
//!
//! ```no_run
//! use tzip::{WriteStatus, ZipArchive};
//! use std::time::Duration;
//!
//! let mut zip = ZipArchive::open("out.zip", 7, 'w')?;
//! let handler = zip.write_files(&["a.txt", "dir/b.txt"], &["src/a.txt", "src/b.txt"], 2)?;
//! match zip.wait(handler, Some(Duration::from_secs(30)))? {
//!     WriteStatus::Ok => zip.close()?,
//!     status => eprintln!("write ended as {}", status),
//! }
//! # Ok::<(), tzip::ZipError>(())
//! ```

use crate::config::WriterConfig;
use crate::error::{Result, ZipError};
use crate::job::{pair_batch, BatchEntry, Job, WriteHandler};
use crate::status::{JobState, WriteStatus};
use crate::worker::Worker;
use crate::writer::StreamingZipWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_ARCHIVE_ID: AtomicU64 = AtomicU64::new(1);

/// Open archive being written by a background worker
pub struct ZipArchive {
    id: u64,
    path: PathBuf,
    worker: Option<Worker>,
    jobs: Vec<Arc<JobState>>,
}

impl ZipArchive {
    /// Open `path` for writing.
    ///
    /// `mode` must be `'w'`, which creates or truncates the file. `compression_level`
    /// follows [`WriterConfig::from_level`]: 0 stores, 1-9 deflates, negative picks
    /// the default level and anything higher is rejected.
    pub fn open<P: AsRef<Path>>(path: P, compression_level: i32, mode: char) -> Result<Self> {
        if mode != 'w' {
            return Err(ZipError::UnsupportedMode(mode));
        }
        Self::open_with(path, WriterConfig::from_level(compression_level)?)
    }

    /// Open `path` for writing with an explicit configuration
    pub fn open_with<P: AsRef<Path>>(path: P, config: WriterConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = StreamingZipWriter::create(&path, &config)?;
        let id = NEXT_ARCHIVE_ID.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::spawn(writer, &config, id.to_string())?;
        log::info!("archive {} opened at {}", id, path.display());

        Ok(Self {
            id,
            path,
            worker: Some(worker),
            jobs: Vec::new(),
        })
    }

    /// Path the archive is written to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Submit a batch write of `count` files.
    ///
    /// `entry_names[i]` is the name inside the archive of the file at
    /// `source_paths[i]`. Both slices must hold exactly `count` items, otherwise
    /// [`ZipError::LengthMismatch`] is returned and no job is queued. The sources are
    /// read later by the worker and must not change until the job is terminal.
    pub fn write_files<N, P>(
        &mut self,
        entry_names: &[N],
        source_paths: &[P],
        count: usize,
    ) -> Result<WriteHandler>
    where
        N: AsRef<str>,
        P: AsRef<Path>,
    {
        let batch = pair_batch(entry_names, source_paths, count)?;
        self.submit(batch)
    }

    /// Queue a batch write job and return its handler without waiting
    pub fn submit(&mut self, entries: Vec<BatchEntry>) -> Result<WriteHandler> {
        let worker = self.worker.as_ref().ok_or(ZipError::WorkerGone)?;
        let state = Arc::new(JobState::new());
        let job_id = self.jobs.len() as u64;

        worker
            .jobs
            .send(Job {
                id: job_id,
                entries,
                state: Arc::clone(&state),
            })
            .map_err(|_| ZipError::WorkerGone)?;
        self.jobs.push(state);

        log::debug!("archive {}: queued job {}", self.id, job_id);
        Ok(WriteHandler {
            archive_id: self.id,
            job_id,
        })
    }

    fn job(&self, handler: WriteHandler) -> Result<&JobState> {
        if handler.archive_id != self.id {
            return Err(ZipError::UnknownHandler);
        }
        self.jobs
            .get(handler.job_id as usize)
            .map(Arc::as_ref)
            .ok_or(ZipError::UnknownHandler)
    }

    /// Current status of a job. Never blocks; once terminal the answer never changes.
    pub fn status(&self, handler: WriteHandler) -> Result<WriteStatus> {
        Ok(self.job(handler)?.status())
    }

    /// Block until the job is terminal or `timeout` elapses, returning the status seen
    pub fn wait(&self, handler: WriteHandler, timeout: Option<Duration>) -> Result<WriteStatus> {
        Ok(self.job(handler)?.wait(timeout))
    }

    /// Await the job's terminal status
    #[cfg(feature = "async")]
    pub async fn wait_async(&self, handler: WriteHandler) -> Result<WriteStatus> {
        Ok(self.job(handler)?.wait_async().await)
    }

    /// Why a job failed, if it did
    pub fn job_error(&self, handler: WriteHandler) -> Result<Option<String>> {
        Ok(self.job(handler)?.error())
    }

    /// Number of submitted jobs not yet terminal
    pub fn pending_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|job| !job.status().is_terminal())
            .count()
    }

    /// Finish every queued job, write the central directory and release the file
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        // closing the channel lets the worker drain the queue and finalize
        drop(worker.jobs);
        let file = worker.handle.join().map_err(|_| ZipError::WorkerGone)??;
        file.sync_all()?;
        log::info!(
            "archive {} closed at {} after {} jobs",
            self.id,
            self.path.display(),
            self.jobs.len()
        );
        Ok(())
    }
}

impl Drop for ZipArchive {
    fn drop(&mut self) {
        if self.worker.is_some() {
            log::warn!(
                "archive {} at {} dropped without close, finalizing",
                self.id,
                self.path.display()
            );
            if let Err(e) = self.shutdown() {
                log::error!("archive {}: finalizing on drop failed: {}", self.id, e);
            }
        }
    }
}
