//! Background worker owning the archive file
//!
//! One thread per open archive. Jobs arrive over a channel and run in submission
//! order. Every source of a job is opened and every name checked before the first
//! byte of the job reaches the archive, so a rejected job leaves the archive as it
//! was. A failure after that point poisons the archive.

use crate::config::WriterConfig;
use crate::error::{Result, ZipError};
use crate::job::{normalize_entry_name, Job, OpenedSource};
#[cfg(feature = "parallel")]
use crate::parallel::CompressionPool;
use crate::writer::StreamingZipWriter;
use std::collections::HashSet;
use std::fs::File;
use std::io::{Seek, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// How a job failed
enum JobFailure {
    /// Nothing was written; later jobs can still succeed
    Rejected(ZipError),
    /// The archive stream is broken
    Poisoned(ZipError),
}

pub(crate) struct Worker {
    pub(crate) jobs: Sender<Job>,
    pub(crate) handle: JoinHandle<Result<File>>,
}

impl Worker {
    /// Start the worker thread. The compression pool, when configured, is built
    /// here so a failure surfaces from `open` rather than from the first job.
    pub(crate) fn spawn(
        writer: StreamingZipWriter<File>,
        config: &WriterConfig,
        label: String,
    ) -> Result<Self> {
        log::debug!(
            "{}: starting worker ({:?}, level {}, {} compression threads)",
            label,
            config.compression_method,
            config.compression_level,
            config.max_concurrent
        );
        let executor = Executor {
            writer,
            #[cfg(feature = "parallel")]
            pool: if config.is_parallel() {
                Some(CompressionPool::new(config)?)
            } else {
                None
            },
        };

        let (jobs, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("tzip-writer-{}", label))
            .spawn(move || executor.run(rx, &label))?;
        Ok(Self { jobs, handle })
    }
}

struct Executor<W: Write + Seek> {
    writer: StreamingZipWriter<W>,
    #[cfg(feature = "parallel")]
    pool: Option<CompressionPool>,
}

impl<W: Write + Seek> Executor<W> {
    fn run(mut self, rx: Receiver<Job>, label: &str) -> Result<W> {
        let mut poisoned: Option<String> = None;

        for job in rx {
            if let Some(cause) = &poisoned {
                log::warn!("{}: job {} refused, archive is poisoned", label, job.id);
                job.state.fail(ZipError::Poisoned(cause.clone()).to_string());
                continue;
            }

            log::debug!("{}: job {} started with {} entries", label, job.id, job.entries.len());
            match self.run_job(&job) {
                Ok(()) => {
                    log::info!("{}: job {} wrote {} entries", label, job.id, job.entries.len());
                    job.state.succeed();
                }
                Err(JobFailure::Rejected(e)) => {
                    log::warn!("{}: job {} rejected: {}", label, job.id, e);
                    job.state.fail(e.to_string());
                }
                Err(JobFailure::Poisoned(e)) => {
                    log::error!("{}: job {} failed while writing: {}", label, job.id, e);
                    let cause = e.to_string();
                    job.state.fail(cause.clone());
                    poisoned = Some(cause);
                }
            }
        }

        if let Some(cause) = poisoned {
            return Err(ZipError::Poisoned(cause));
        }
        log::debug!("{}: finalizing {} entries", label, self.writer.entry_count());
        self.writer.finish()
    }

    fn run_job(&mut self, job: &Job) -> std::result::Result<(), JobFailure> {
        let sources = self.open_sources(job).map_err(JobFailure::Rejected)?;

        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            let compressed = pool.compress(sources).map_err(JobFailure::Rejected)?;
            for entry in compressed {
                self.writer
                    .write_compressed_entry(entry)
                    .map_err(JobFailure::Poisoned)?;
            }
            return Ok(());
        }

        for mut source in sources {
            log::debug!("writing {} from {}", source.name, source.path.display());
            self.writer
                .write_entry_from_reader(&source.name, &mut source.file, Some(source.len))
                .map_err(JobFailure::Poisoned)?;
        }
        Ok(())
    }

    fn open_sources(&self, job: &Job) -> Result<Vec<OpenedSource>> {
        let mut seen = HashSet::new();
        let mut sources = Vec::with_capacity(job.entries.len());
        for entry in &job.entries {
            let name = normalize_entry_name(&entry.name)?;
            if self.writer.contains(&name) || !seen.insert(name.clone()) {
                return Err(ZipError::DuplicateEntry(name));
            }

            let unavailable = |e| ZipError::SourceUnavailable {
                path: entry.path.clone(),
                source: e,
            };
            let file = File::open(&entry.path).map_err(unavailable)?;
            let metadata = file.metadata().map_err(unavailable)?;
            if !metadata.is_file() {
                return Err(unavailable(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "not a regular file",
                )));
            }

            sources.push(OpenedSource {
                name,
                path: entry.path.clone(),
                file,
                len: metadata.len(),
            });
        }
        Ok(sources)
    }
}
