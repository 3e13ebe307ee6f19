//! Tests for awaiting write jobs
//!
//! Run with: cargo test --features async

#[cfg(feature = "async")]
mod async_tests {
    use std::time::Duration;
    use tempfile::tempdir;
    use tzip::{Result, StreamingZipReader, WriteStatus, ZipArchive};

    #[tokio::test]
    async fn test_wait_async_ok() -> Result<()> {
        let dir = tempdir().unwrap();
        let source = dir.path().join("async.txt");
        std::fs::write(&source, b"Hello, async!").unwrap();
        let zip_path = dir.path().join("async.zip");

        let mut zip = ZipArchive::open(&zip_path, 6, 'w')?;
        let handler = zip.write_files(&["async.txt"], &[&source], 1)?;
        let status = tokio::time::timeout(Duration::from_secs(30), zip.wait_async(handler))
            .await
            .expect("job did not settle")?;
        assert_eq!(status, WriteStatus::Ok);

        // already settled: returns at once
        assert_eq!(zip.wait_async(handler).await?, WriteStatus::Ok);
        zip.close()?;

        let mut reader = StreamingZipReader::open(&zip_path)?;
        assert_eq!(reader.read_entry_by_name("async.txt")?, b"Hello, async!");
        Ok(())
    }

    #[tokio::test]
    async fn test_wait_async_error() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut zip = ZipArchive::open(dir.path().join("err.zip"), 6, 'w')?;
        let handler = zip.write_files(&["gone.txt"], &[dir.path().join("gone.txt")], 1)?;

        let status = tokio::time::timeout(Duration::from_secs(30), zip.wait_async(handler))
            .await
            .expect("job did not settle")?;
        assert_eq!(status, WriteStatus::Error);
        assert!(zip.job_error(handler)?.is_some());
        zip.close()
    }
}
