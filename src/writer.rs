//! Streaming ZIP writer that compresses data on-the-fly without temp files
//!
//! Entries are either streamed (sizes and CRC follow the data in a data descriptor)
//! or written from a buffer that was compressed ahead of time, in which case the
//! local header carries the final sizes. The background worker uses the first form
//! for sequential batches and the second for batches compressed on a thread pool.

use crate::config::WriterConfig;
use crate::error::{Result, ZipError};
use crate::format::*;
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

/// Chunk size used when streaming a source into an entry
const READ_CHUNK: usize = 64 * 1024;

/// Compression method to use for ZIP entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression (stored)
    Stored,
    /// DEFLATE compression (most common)
    Deflate,
    /// Zstd compression (requires zstd-support feature)
    #[cfg(feature = "zstd-support")]
    Zstd,
}

impl CompressionMethod {
    pub(crate) fn to_zip_method(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            #[cfg(feature = "zstd-support")]
            CompressionMethod::Zstd => 93,
        }
    }

    fn version_needed(self) -> u16 {
        match self {
            #[cfg(feature = "zstd-support")]
            CompressionMethod::Zstd => VERSION_ZSTD,
            _ => VERSION_DEFAULT,
        }
    }
}

/// Entry already written, kept for the central directory
struct WrittenEntry {
    name: String,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    compression_method: u16,
    flags: u16,
    version_needed: u16,
}

/// Entry data compressed ahead of time, ready to be written in one piece
#[derive(Debug, Clone)]
pub struct CompressedEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub uncompressed_size: u64,
    pub crc32: u32,
}

/// Streaming ZIP writer that compresses data on-the-fly
pub struct StreamingZipWriter<W: Write + Seek> {
    output: W,
    entries: Vec<WrittenEntry>,
    names: HashSet<String>,
    current_entry: Option<CurrentEntry>,
    compression_level: u32,
    compression_method: CompressionMethod,
}

struct CurrentEntry {
    name: String,
    local_header_offset: u64,
    flags: u16,
    encoder: Box<dyn CompressorWrite>,
    counter: CrcCounter,
}

trait CompressorWrite: Write + Send {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer>;
    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer;
}

struct StoredCompressor {
    buffer: CompressedBuffer,
}

impl Write for StoredCompressor {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CompressorWrite for StoredCompressor {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer> {
        Ok(self.buffer)
    }

    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer {
        &mut self.buffer
    }
}

struct DeflateCompressor {
    encoder: DeflateEncoder<CompressedBuffer>,
}

impl Write for DeflateCompressor {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.encoder.flush()
    }
}

impl CompressorWrite for DeflateCompressor {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer> {
        Ok(self.encoder.finish()?)
    }

    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer {
        self.encoder.get_mut()
    }
}

#[cfg(feature = "zstd-support")]
struct ZstdCompressor {
    encoder: zstd::Encoder<'static, CompressedBuffer>,
}

#[cfg(feature = "zstd-support")]
impl Write for ZstdCompressor {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.encoder.flush()
    }
}

#[cfg(feature = "zstd-support")]
impl CompressorWrite for ZstdCompressor {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer> {
        Ok(self.encoder.finish()?)
    }

    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer {
        self.encoder.get_mut()
    }
}

fn new_compressor(
    method: CompressionMethod,
    level: u32,
    size_hint: Option<u64>,
) -> Result<Box<dyn CompressorWrite>> {
    let buffer = CompressedBuffer::with_size_hint(size_hint);
    let compressor: Box<dyn CompressorWrite> = match method {
        CompressionMethod::Stored => Box::new(StoredCompressor { buffer }),
        CompressionMethod::Deflate => Box::new(DeflateCompressor {
            encoder: DeflateEncoder::new(buffer, Compression::new(level)),
        }),
        #[cfg(feature = "zstd-support")]
        CompressionMethod::Zstd => {
            let mut encoder = zstd::Encoder::new(buffer, level as i32)?;
            encoder.include_checksum(false)?; // ZIP uses CRC32, not zstd checksum
            Box::new(ZstdCompressor { encoder })
        }
    };
    Ok(compressor)
}

/// Compress a whole buffer with the given method, for entries prepared off the writer thread
pub fn compress_buffer(method: CompressionMethod, level: u32, data: &[u8]) -> Result<Vec<u8>> {
    let mut compressor = new_compressor(method, level, Some(data.len() as u64))?;
    compressor.write_all(data)?;
    Ok(compressor.finish_compression()?.take())
}

/// Metadata tracker for CRC and byte counts
struct CrcCounter {
    crc: Crc32,
    uncompressed_count: u64,
    compressed_count: u64,
}

impl CrcCounter {
    fn new() -> Self {
        Self {
            crc: Crc32::new(),
            uncompressed_count: 0,
            compressed_count: 0,
        }
    }

    fn update_uncompressed(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.uncompressed_count += data.len() as u64;
    }

    fn add_compressed(&mut self, count: u64) {
        self.compressed_count += count;
    }

    fn finalize(&self) -> u32 {
        self.crc.clone().finalize()
    }
}

/// Buffer for compressed output, drained to the archive once it passes a threshold
/// picked from the expected entry size.
struct CompressedBuffer {
    buffer: Vec<u8>,
    flush_threshold: usize,
}

impl CompressedBuffer {
    fn with_size_hint(size_hint: Option<u64>) -> Self {
        let (initial_capacity, flush_threshold) = match size_hint {
            Some(size) if size < 10_000 => (8 * 1024, 256 * 1024),
            Some(size) if size < 1_000_000 => (64 * 1024, 1024 * 1024),
            _ => (256 * 1024, 4 * 1024 * 1024),
        };

        Self {
            buffer: Vec::with_capacity(initial_capacity),
            flush_threshold,
        }
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= self.flush_threshold
    }
}

impl Write for CompressedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Local file header for an entry; `sizes` is `None` when a data descriptor follows
fn local_header(
    name: &str,
    method: u16,
    flags: u16,
    version_needed: u16,
    sizes: Option<(u32, u64, u64)>,
) -> Vec<u8> {
    let mut extra = Vec::new();
    let (crc, compressed, uncompressed) = match sizes {
        Some((crc, compressed, uncompressed))
            if needs_zip64(compressed) || needs_zip64(uncompressed) =>
        {
            put_u16(&mut extra, ZIP64_EXTRA_ID);
            put_u16(&mut extra, 16);
            put_u64(&mut extra, uncompressed);
            put_u64(&mut extra, compressed);
            (crc, ZIP64_MARKER_32, ZIP64_MARKER_32)
        }
        Some((crc, compressed, uncompressed)) => (crc, compressed as u32, uncompressed as u32),
        None => (0, 0, 0),
    };
    let version_needed = if extra.is_empty() {
        version_needed
    } else {
        version_needed.max(VERSION_ZIP64)
    };

    let mut header = Vec::with_capacity(30 + name.len() + extra.len());
    put_u32(&mut header, LOCAL_FILE_HEADER_SIGNATURE);
    put_u16(&mut header, version_needed);
    put_u16(&mut header, flags);
    put_u16(&mut header, method);
    put_u32(&mut header, 0); // mod time/date
    put_u32(&mut header, crc);
    put_u32(&mut header, compressed);
    put_u32(&mut header, uncompressed);
    put_u16(&mut header, name.len() as u16);
    put_u16(&mut header, extra.len() as u16);
    header.extend_from_slice(name.as_bytes());
    header.extend_from_slice(&extra);
    header
}

/// ZIP64 extra field for the central directory, empty when nothing overflows
fn central_zip64_extra(entry: &WrittenEntry) -> Vec<u8> {
    let mut data = Vec::new();
    if needs_zip64(entry.uncompressed_size) {
        put_u64(&mut data, entry.uncompressed_size);
    }
    if needs_zip64(entry.compressed_size) {
        put_u64(&mut data, entry.compressed_size);
    }
    if needs_zip64(entry.local_header_offset) {
        put_u64(&mut data, entry.local_header_offset);
    }
    if data.is_empty() {
        return data;
    }
    let mut extra = Vec::with_capacity(4 + data.len());
    put_u16(&mut extra, ZIP64_EXTRA_ID);
    put_u16(&mut extra, data.len() as u16);
    extra.extend_from_slice(&data);
    extra
}

fn central_directory_record(entry: &WrittenEntry) -> Vec<u8> {
    let extra = central_zip64_extra(entry);
    let version_needed = if extra.is_empty() {
        entry.version_needed
    } else {
        entry.version_needed.max(VERSION_ZIP64)
    };

    let mut record = Vec::with_capacity(46 + entry.name.len() + extra.len());
    put_u32(&mut record, CENTRAL_DIRECTORY_SIGNATURE);
    put_u16(&mut record, version_needed); // version made by
    put_u16(&mut record, version_needed);
    put_u16(&mut record, entry.flags);
    put_u16(&mut record, entry.compression_method);
    put_u32(&mut record, 0); // mod time/date
    put_u32(&mut record, entry.crc32);
    put_u32(&mut record, field_u32(entry.compressed_size));
    put_u32(&mut record, field_u32(entry.uncompressed_size));
    put_u16(&mut record, entry.name.len() as u16);
    put_u16(&mut record, extra.len() as u16);
    put_u16(&mut record, 0); // file comment len
    put_u16(&mut record, 0); // disk number start
    put_u16(&mut record, 0); // internal attrs
    put_u32(&mut record, 0); // external attrs
    put_u32(&mut record, field_u32(entry.local_header_offset));
    record.extend_from_slice(entry.name.as_bytes());
    record.extend_from_slice(&extra);
    record
}

fn entry_flags(name: &str, streamed: bool) -> u16 {
    let mut flags = 0;
    if streamed {
        flags |= FLAG_DATA_DESCRIPTOR;
    }
    if !name.is_ascii() {
        flags |= FLAG_UTF8;
    }
    flags
}

impl StreamingZipWriter<File> {
    /// Create (or truncate) the archive at `path`
    pub fn create<P: AsRef<Path>>(path: P, config: &WriterConfig) -> Result<Self> {
        let output = File::create(path)?;
        Ok(Self::from_writer(output, config))
    }
}

impl<W: Write + Seek> StreamingZipWriter<W> {
    /// Create a ZIP writer on top of an arbitrary writer
    pub fn from_writer(writer: W, config: &WriterConfig) -> Self {
        Self {
            output: writer,
            entries: Vec::new(),
            names: HashSet::new(),
            current_entry: None,
            compression_level: config.compression_level,
            compression_method: config.compression_method,
        }
    }

    /// Compression method applied to new entries
    pub fn compression_method(&self) -> CompressionMethod {
        self.compression_method
    }

    /// Compression level applied to new entries
    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    /// Whether an entry with this name was already started
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of completed entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn claim_name(&mut self, name: &str) -> Result<()> {
        if name.is_empty() || name.len() > u16::MAX as usize {
            return Err(ZipError::InvalidEntryName(name.to_string()));
        }
        if !self.names.insert(name.to_string()) {
            return Err(ZipError::DuplicateEntry(name.to_string()));
        }
        Ok(())
    }

    /// Start a new entry (file) in the ZIP
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        self.start_entry_with_hint(name, None)
    }

    /// Start a new entry with an uncompressed size hint used to size the output buffer
    pub fn start_entry_with_hint(&mut self, name: &str, size_hint: Option<u64>) -> Result<()> {
        self.finish_entry()?;
        self.claim_name(name)?;

        let local_header_offset = self.output.stream_position()?;
        let flags = entry_flags(name, true);
        let header = local_header(
            name,
            self.compression_method.to_zip_method(),
            flags,
            self.compression_method.version_needed(),
            None,
        );
        self.output.write_all(&header)?;

        let encoder = new_compressor(self.compression_method, self.compression_level, size_hint)?;
        self.current_entry = Some(CurrentEntry {
            name: name.to_string(),
            local_header_offset,
            flags,
            encoder,
            counter: CrcCounter::new(),
        });

        Ok(())
    }

    /// Write uncompressed data to the current entry
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .current_entry
            .as_mut()
            .ok_or_else(|| ZipError::InvalidFormat("No entry started".to_string()))?;

        entry.counter.update_uncompressed(data);
        entry.encoder.write_all(data)?;

        let buffer = entry.encoder.get_buffer_mut();
        if buffer.should_flush() {
            let compressed_data = buffer.take();
            self.output.write_all(&compressed_data)?;
            entry.counter.add_compressed(compressed_data.len() as u64);
        }

        Ok(())
    }

    /// Stream everything `reader` yields into a new entry and complete it.
    ///
    /// Returns the number of uncompressed bytes written.
    pub fn write_entry_from_reader<R: Read>(
        &mut self,
        name: &str,
        reader: &mut R,
        size_hint: Option<u64>,
    ) -> Result<u64> {
        self.start_entry_with_hint(name, size_hint)?;
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.write_data(&chunk[..n])?;
            total += n as u64;
        }
        self.finish_entry()?;
        Ok(total)
    }

    /// Write an entry whose data was compressed with this writer's method beforehand
    pub fn write_compressed_entry(&mut self, entry: CompressedEntry) -> Result<()> {
        self.finish_entry()?;
        self.claim_name(&entry.name)?;

        let local_header_offset = self.output.stream_position()?;
        let flags = entry_flags(&entry.name, false);
        let compressed_size = entry.data.len() as u64;
        let method = self.compression_method;
        let header = local_header(
            &entry.name,
            method.to_zip_method(),
            flags,
            method.version_needed(),
            Some((entry.crc32, compressed_size, entry.uncompressed_size)),
        );
        self.output.write_all(&header)?;
        self.output.write_all(&entry.data)?;

        self.entries.push(WrittenEntry {
            name: entry.name,
            local_header_offset,
            crc32: entry.crc32,
            compressed_size,
            uncompressed_size: entry.uncompressed_size,
            compression_method: method.to_zip_method(),
            flags,
            version_needed: method.version_needed(),
        });
        Ok(())
    }

    /// Complete the current entry, if any, and write its data descriptor
    pub fn finish_entry(&mut self) -> Result<()> {
        let Some(mut entry) = self.current_entry.take() else {
            return Ok(());
        };

        let mut buffer = entry.encoder.finish_compression()?;
        let remaining_data = buffer.take();
        if !remaining_data.is_empty() {
            self.output.write_all(&remaining_data)?;
            entry.counter.add_compressed(remaining_data.len() as u64);
        }

        let crc = entry.counter.finalize();
        let compressed_size = entry.counter.compressed_count;
        let uncompressed_size = entry.counter.uncompressed_count;

        let mut descriptor = Vec::with_capacity(24);
        put_u32(&mut descriptor, DATA_DESCRIPTOR_SIGNATURE);
        put_u32(&mut descriptor, crc);
        if needs_zip64(compressed_size) || needs_zip64(uncompressed_size) {
            put_u64(&mut descriptor, compressed_size);
            put_u64(&mut descriptor, uncompressed_size);
        } else {
            put_u32(&mut descriptor, compressed_size as u32);
            put_u32(&mut descriptor, uncompressed_size as u32);
        }
        self.output.write_all(&descriptor)?;

        self.entries.push(WrittenEntry {
            name: entry.name,
            local_header_offset: entry.local_header_offset,
            crc32: crc,
            compressed_size,
            uncompressed_size,
            compression_method: self.compression_method.to_zip_method(),
            flags: entry.flags,
            version_needed: self.compression_method.version_needed(),
        });
        Ok(())
    }

    /// Finish ZIP file (write central directory and return the writer)
    pub fn finish(mut self) -> Result<W> {
        self.finish_entry()?;

        let central_dir_offset = self.output.stream_position()?;
        for entry in &self.entries {
            self.output.write_all(&central_directory_record(entry))?;
        }
        let central_dir_size = self.output.stream_position()? - central_dir_offset;
        let entry_count = self.entries.len() as u64;

        let need_zip64 = entry_count >= ZIP64_MARKER_16 as u64
            || needs_zip64(central_dir_size)
            || needs_zip64(central_dir_offset);

        let mut tail = Vec::with_capacity(98);
        if need_zip64 {
            let zip64_eocd_offset = central_dir_offset + central_dir_size;

            put_u32(&mut tail, ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE);
            put_u64(&mut tail, 44); // size of the remaining record
            put_u16(&mut tail, VERSION_ZIP64); // version made by
            put_u16(&mut tail, VERSION_ZIP64); // version needed
            put_u32(&mut tail, 0); // this disk
            put_u32(&mut tail, 0); // disk with central directory
            put_u64(&mut tail, entry_count);
            put_u64(&mut tail, entry_count);
            put_u64(&mut tail, central_dir_size);
            put_u64(&mut tail, central_dir_offset);

            put_u32(&mut tail, ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE);
            put_u32(&mut tail, 0); // disk with ZIP64 EOCD
            put_u64(&mut tail, zip64_eocd_offset);
            put_u32(&mut tail, 1); // total disks
        }

        let count_16 = if entry_count >= ZIP64_MARKER_16 as u64 {
            ZIP64_MARKER_16
        } else {
            entry_count as u16
        };
        put_u32(&mut tail, END_OF_CENTRAL_DIRECTORY_SIGNATURE);
        put_u16(&mut tail, 0); // disk number
        put_u16(&mut tail, 0); // disk with central dir
        put_u16(&mut tail, count_16);
        put_u16(&mut tail, count_16);
        put_u32(&mut tail, field_u32(central_dir_size));
        put_u32(&mut tail, field_u32(central_dir_offset));
        put_u16(&mut tail, 0); // comment len

        self.output.write_all(&tail)?;
        self.output.flush()?;
        Ok(self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::StreamingZipReader;
    use std::io::Cursor;

    fn deflate_config() -> WriterConfig {
        WriterConfig::default()
    }

    #[test]
    fn test_stored_entry_keeps_bytes_verbatim() {
        let config = WriterConfig::from_level(0).unwrap();
        let mut writer = StreamingZipWriter::from_writer(Cursor::new(Vec::new()), &config);
        writer.start_entry("plain.txt").unwrap();
        writer.write_data(b"stored as is").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let needle = b"stored as is";
        assert!(bytes.windows(needle.len()).any(|w| w == needle));

        let mut reader = StreamingZipReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.entries()[0].compression_method, 0);
        assert_eq!(reader.read_entry_by_name("plain.txt").unwrap(), needle);
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut writer = StreamingZipWriter::from_writer(Cursor::new(Vec::new()), &deflate_config());
        writer.start_entry("a.txt").unwrap();
        match writer.start_entry("a.txt") {
            Err(ZipError::DuplicateEntry(name)) => assert_eq!(name, "a.txt"),
            other => panic!("expected DuplicateEntry, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_write_without_entry_fails() {
        let mut writer = StreamingZipWriter::from_writer(Cursor::new(Vec::new()), &deflate_config());
        assert!(matches!(
            writer.write_data(b"orphan"),
            Err(ZipError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_precompressed_and_streamed_entries_mix() {
        let config = deflate_config();
        let payload = b"precompressed payload, precompressed payload".to_vec();
        let compressed = CompressedEntry {
            name: "pre.txt".to_string(),
            data: compress_buffer(config.compression_method, 6, &payload).unwrap(),
            uncompressed_size: payload.len() as u64,
            crc32: crc32fast::hash(&payload),
        };

        let mut writer = StreamingZipWriter::from_writer(Cursor::new(Vec::new()), &config);
        writer
            .write_entry_from_reader("streamed.txt", &mut &b"streamed"[..], None)
            .unwrap();
        writer.write_compressed_entry(compressed).unwrap();
        assert_eq!(writer.entry_count(), 2);
        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = StreamingZipReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.read_entry_by_name("streamed.txt").unwrap(), b"streamed");
        assert_eq!(reader.read_entry_by_name("pre.txt").unwrap(), payload);
    }

    #[test]
    fn test_utf8_name_sets_flag() {
        assert_eq!(entry_flags("plain.txt", false), 0);
        assert_eq!(entry_flags("caf\u{e9}.txt", false), FLAG_UTF8);
        assert_eq!(
            entry_flags("caf\u{e9}.txt", true),
            FLAG_UTF8 | FLAG_DATA_DESCRIPTOR
        );
    }

    #[test]
    fn test_empty_archive_is_just_eocd() {
        let writer = StreamingZipWriter::from_writer(Cursor::new(Vec::new()), &deflate_config());
        let bytes = writer.finish().unwrap().into_inner();
        assert_eq!(bytes.len(), EOCD_LEN);
        assert_eq!(le_u32(&bytes, 0), END_OF_CENTRAL_DIRECTORY_SIGNATURE);
    }
}
