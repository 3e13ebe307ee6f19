#[cfg(feature = "zstd-support")]
#[test]
fn test_zstd_batch_job() {
    use std::time::Duration;
    use tempfile::tempdir;
    use tzip::{CompressionMethod, StreamingZipReader, WriteStatus, WriterConfig, ZipArchive};

    let dir = tempdir().unwrap();
    let text = dir.path().join("test1.txt");
    let bin = dir.path().join("test2.bin");
    std::fs::write(&text, b"Hello from Zstd compression!").unwrap();
    std::fs::write(&bin, vec![42u8; 10000]).unwrap();
    let zip_path = dir.path().join("zstd_test.zip");

    let config = WriterConfig::default()
        .with_method(CompressionMethod::Zstd)
        .with_compression_level(3);
    let mut zip = ZipArchive::open_with(&zip_path, config).unwrap();
    let handler = zip
        .write_files(&["test1.txt", "test2.bin"], &[&text, &bin], 2)
        .unwrap();
    assert_eq!(
        zip.wait(handler, Some(Duration::from_secs(30))).unwrap(),
        WriteStatus::Ok
    );
    zip.close().unwrap();

    let mut reader = StreamingZipReader::open(&zip_path).expect("Failed to open zip");
    let entries: Vec<_> = reader.entries().to_vec();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.compression_method == 93));

    assert_eq!(
        reader.read_entry_by_name("test1.txt").unwrap(),
        b"Hello from Zstd compression!"
    );
    let data2 = reader.read_entry_by_name("test2.bin").unwrap();
    assert_eq!(data2.len(), 10000);
    assert!(data2.iter().all(|&b| b == 42));
    assert!(entries[1].compressed_size < entries[1].uncompressed_size / 2);
}

#[cfg(all(feature = "zstd-support", feature = "parallel"))]
#[test]
fn test_zstd_parallel_batch() {
    use std::time::Duration;
    use tempfile::tempdir;
    use tzip::{CompressionMethod, StreamingZipReader, WriteStatus, WriterConfig, ZipArchive};

    let dir = tempdir().unwrap();
    let mut names = Vec::new();
    let mut paths = Vec::new();
    for i in 0..6 {
        let path = dir.path().join(format!("chunk{}.bin", i));
        std::fs::write(&path, vec![i as u8; 50_000]).unwrap();
        names.push(format!("chunks/{}.bin", i));
        paths.push(path);
    }
    let zip_path = dir.path().join("zstd_parallel.zip");

    let config = WriterConfig::balanced().with_method(CompressionMethod::Zstd);
    let mut zip = ZipArchive::open_with(&zip_path, config).unwrap();
    let handler = zip.write_files(&names, &paths, names.len()).unwrap();
    assert_eq!(
        zip.wait(handler, Some(Duration::from_secs(30))).unwrap(),
        WriteStatus::Ok
    );
    zip.close().unwrap();

    let mut reader = StreamingZipReader::open(&zip_path).unwrap();
    for (i, name) in names.iter().enumerate() {
        let data = reader.read_entry_by_name(name).unwrap();
        assert_eq!(data, vec![i as u8; 50_000]);
    }
}
