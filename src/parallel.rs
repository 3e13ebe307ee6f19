//! Parallel compression of batch entries
//!
//! Every entry of a batch is read and compressed on a bounded rayon pool, then the
//! worker writes the results in submission order. Peak memory is roughly the sum
//! of the `max_concurrent` largest entries, compressed and uncompressed.

use crate::config::WriterConfig;
use crate::error::{Result, ZipError};
use crate::job::OpenedSource;
use crate::writer::{compress_buffer, CompressedEntry, CompressionMethod};
use rayon::prelude::*;
use std::io::Read;

/// Thread pool sized from [`WriterConfig::max_concurrent`]
pub(crate) struct CompressionPool {
    pool: rayon::ThreadPool,
    method: CompressionMethod,
    level: u32,
}

impl CompressionPool {
    pub(crate) fn new(config: &WriterConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrent)
            .thread_name(|index| format!("tzip-compress-{}", index))
            .build()
            .map_err(|e| ZipError::Io(std::io::Error::other(e)))?;
        Ok(Self {
            pool,
            method: config.compression_method,
            level: config.compression_level,
        })
    }

    /// Compress all sources, keeping their order
    pub(crate) fn compress(&self, sources: Vec<OpenedSource>) -> Result<Vec<CompressedEntry>> {
        let (method, level) = (self.method, self.level);
        self.pool.install(|| {
            sources
                .into_par_iter()
                .map(|source| compress_source(source, method, level))
                .collect()
        })
    }
}

fn compress_source(
    mut source: OpenedSource,
    method: CompressionMethod,
    level: u32,
) -> Result<CompressedEntry> {
    let mut data = Vec::with_capacity(source.len as usize);
    source
        .file
        .read_to_end(&mut data)
        .map_err(|e| ZipError::SourceUnavailable {
            path: source.path.clone(),
            source: e,
        })?;

    log::debug!(
        "compressing {} ({} bytes) on {:?}",
        source.name,
        data.len(),
        std::thread::current().name()
    );

    Ok(CompressedEntry {
        crc32: crc32fast::hash(&data),
        uncompressed_size: data.len() as u64,
        data: compress_buffer(method, level, &data)?,
        name: source.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_compress_keeps_submission_order() {
        let dir = tempdir().unwrap();
        let mut sources = Vec::new();
        for i in 0..12 {
            let path = dir.path().join(format!("f{}.txt", i));
            let mut file = File::create(&path).unwrap();
            write!(file, "{}", format!("content {} ", i).repeat(100 * (i + 1))).unwrap();
            drop(file);
            let len = std::fs::metadata(&path).unwrap().len();
            sources.push(OpenedSource {
                name: format!("f{}.txt", i),
                file: File::open(&path).unwrap(),
                path,
                len,
            });
        }

        let pool = CompressionPool::new(&WriterConfig::balanced()).unwrap();
        let compressed = pool.compress(sources).unwrap();

        assert_eq!(compressed.len(), 12);
        for (i, entry) in compressed.iter().enumerate() {
            assert_eq!(entry.name, format!("f{}.txt", i));
            let mut plain = Vec::new();
            DeflateDecoder::new(&entry.data[..])
                .read_to_end(&mut plain)
                .unwrap();
            assert_eq!(plain.len() as u64, entry.uncompressed_size);
            assert_eq!(crc32fast::hash(&plain), entry.crc32);
        }
    }
}
