//! Smoke-test client: creates fixture files, writes them to an archive through a
//! background job, polls the job until it settles and closes the archive.

use crate::archive::ZipArchive;
use crate::config::WriterConfig;
use crate::error::ZipError;
use crate::job::WriteHandler;
use crate::reader::StreamingZipReader;
use crate::status::WriteStatus;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Content of every fixture file
pub const TEST_CONTENT: &str = "Hello World!\n";

/// Fixture files, relative to the working directory
pub const SOURCE_FILES: [&str; 3] = ["test/test.txt", "test/test2.txt", "test/test/test3.txt"];

/// Entry names the fixtures get inside the archive
pub const ENTRY_NAMES: [&str; 3] = ["test.txt", "test2.txt", "test/test3.txt"];

/// Line printed on stderr when the write job ends in error
pub const JOB_FAILED_MESSAGE: &str = "Error while writing to test zip";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_LEVEL: i32 = 7;

/// Failure of a smoke run
#[derive(Debug)]
pub enum SmokeError {
    /// Fixture files could not be created
    Fixtures(io::Error),
    /// Archive could not be opened or the job not submitted
    Setup(ZipError),
    /// The write job settled as `Error`
    JobFailed { cause: Option<String> },
    /// Archive could not be finalized
    Close(ZipError),
    /// Archive content differs from the sources
    Verify(String),
}

impl std::fmt::Display for SmokeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmokeError::Fixtures(e) => write!(f, "Cannot create test files: {}", e),
            SmokeError::Setup(e) => write!(f, "Cannot start test zip: {}", e),
            SmokeError::JobFailed { .. } => f.write_str(JOB_FAILED_MESSAGE),
            SmokeError::Close(e) => write!(f, "Cannot close test zip: {}", e),
            SmokeError::Verify(msg) => write!(f, "Test zip verification failed: {}", msg),
        }
    }
}

impl std::error::Error for SmokeError {}

/// Settings of one smoke run
#[derive(Debug, Clone)]
pub struct SmokeConfig {
    /// Directory holding the fixtures; relative archive paths resolve against it
    pub workdir: PathBuf,
    pub archive: PathBuf,
    pub level: i32,
    pub poll_interval: Duration,
    /// Compression threads per batch
    pub threads: usize,
    pub create_fixtures: bool,
    pub verify: bool,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            archive: PathBuf::from("test.zip"),
            level: DEFAULT_LEVEL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            threads: 1,
            create_fixtures: true,
            verify: false,
        }
    }
}

impl SmokeConfig {
    pub fn archive_path(&self) -> PathBuf {
        self.workdir.join(&self.archive)
    }

    pub fn source_paths(&self) -> Vec<PathBuf> {
        SOURCE_FILES.iter().map(|p| self.workdir.join(p)).collect()
    }
}

/// Write the three fixture files under `root`
pub fn create_test_files(root: &Path) -> io::Result<()> {
    fs::create_dir_all(root.join("test/test"))?;
    for file in SOURCE_FILES {
        fs::write(root.join(file), TEST_CONTENT)?;
    }
    Ok(())
}

/// Poll `handler` every `interval` until it settles and return the terminal status
pub fn poll_until_done(
    archive: &ZipArchive,
    handler: WriteHandler,
    interval: Duration,
) -> Result<WriteStatus, ZipError> {
    let mut polls = 0u64;
    loop {
        polls += 1;
        let status = archive.status(handler)?;
        if status.is_terminal() {
            log::debug!("job {} settled as {} after {} polls", handler.job_id(), status, polls);
            return Ok(status);
        }
        thread::sleep(interval);
    }
}

/// Compress the fixtures into the archive and close it
pub fn compress_test(config: &SmokeConfig) -> Result<(), SmokeError> {
    let writer_config = WriterConfig::from_level(config.level)
        .map_err(SmokeError::Setup)?
        .with_max_concurrent(config.threads.clamp(1, crate::config::MAX_CONCURRENT_LIMIT));
    let sources = config.source_paths();

    let mut zip =
        ZipArchive::open_with(config.archive_path(), writer_config).map_err(SmokeError::Setup)?;
    let handler = zip
        .write_files(&ENTRY_NAMES, &sources, ENTRY_NAMES.len())
        .map_err(SmokeError::Setup)?;

    match poll_until_done(&zip, handler, config.poll_interval).map_err(SmokeError::Setup)? {
        WriteStatus::Ok => zip.close().map_err(SmokeError::Close),
        _ => {
            let cause = zip.job_error(handler).ok().flatten();
            if let Err(e) = zip.close() {
                log::warn!("closing after failed job: {}", e);
            }
            Err(SmokeError::JobFailed { cause })
        }
    }
}

/// Check the archive holds exactly `expected` (entry name, source path) pairs with
/// byte-identical content
pub fn verify_archive(archive: &Path, expected: &[(&str, PathBuf)]) -> Result<(), SmokeError> {
    let mut reader =
        StreamingZipReader::open(archive).map_err(|e| SmokeError::Verify(e.to_string()))?;

    let names = reader.names();
    if names.len() != expected.len() || expected.iter().any(|(name, _)| !names.contains(name)) {
        return Err(SmokeError::Verify(format!(
            "expected entries {:?}, found {:?}",
            expected.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            names
        )));
    }

    for (name, path) in expected {
        let stored = reader
            .read_entry_by_name(name)
            .map_err(|e| SmokeError::Verify(e.to_string()))?;
        let source = fs::read(path)
            .map_err(|e| SmokeError::Verify(format!("{}: {}", path.display(), e)))?;
        if stored != source {
            return Err(SmokeError::Verify(format!(
                "{} differs from {}",
                name,
                path.display()
            )));
        }
    }
    Ok(())
}

/// Full smoke run: fixtures, compression, optional verification
pub fn run(config: &SmokeConfig) -> Result<(), SmokeError> {
    if config.create_fixtures {
        create_test_files(&config.workdir).map_err(SmokeError::Fixtures)?;
    }
    compress_test(config)?;

    if config.verify {
        let expected: Vec<_> = ENTRY_NAMES
            .iter()
            .copied()
            .zip(config.source_paths())
            .collect();
        verify_archive(&config.archive_path(), &expected)?;
        log::info!("verified {}", config.archive_path().display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast_config(workdir: &Path) -> SmokeConfig {
        SmokeConfig {
            workdir: workdir.to_path_buf(),
            poll_interval: Duration::from_millis(5),
            verify: true,
            ..SmokeConfig::default()
        }
    }

    #[test]
    fn test_fixture_layout() {
        let dir = tempdir().unwrap();
        create_test_files(dir.path()).unwrap();
        for file in SOURCE_FILES {
            assert_eq!(fs::read_to_string(dir.path().join(file)).unwrap(), TEST_CONTENT);
        }
    }

    #[test]
    fn test_run_succeeds_and_verifies() {
        let dir = tempdir().unwrap();
        run(&fast_config(dir.path())).unwrap();
        assert!(dir.path().join("test.zip").exists());
    }

    #[test]
    fn test_missing_source_is_job_failure() {
        let dir = tempdir().unwrap();
        create_test_files(dir.path()).unwrap();
        fs::remove_file(dir.path().join("test/test2.txt")).unwrap();

        let config = SmokeConfig {
            create_fixtures: false,
            ..fast_config(dir.path())
        };
        match run(&config) {
            Err(err @ SmokeError::JobFailed { .. }) => {
                assert_eq!(err.to_string(), JOB_FAILED_MESSAGE);
                if let SmokeError::JobFailed { cause } = err {
                    assert!(cause.unwrap().contains("test2.txt"));
                }
            }
            other => panic!("expected JobFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_detects_changed_source() {
        let dir = tempdir().unwrap();
        let config = SmokeConfig {
            verify: false,
            ..fast_config(dir.path())
        };
        run(&config).unwrap();
        fs::write(dir.path().join("test/test.txt"), "changed\n").unwrap();

        let expected: Vec<_> = ENTRY_NAMES.iter().copied().zip(config.source_paths()).collect();
        assert!(matches!(
            verify_archive(&config.archive_path(), &expected),
            Err(SmokeError::Verify(_))
        ));
    }
}
