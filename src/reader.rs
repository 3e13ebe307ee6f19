//! ZIP reader used to check archives produced by the writer
//!
//! Loads the central directory once, then decompresses entries on demand and
//! verifies their CRC-32.

use crate::error::{Result, ZipError};
use crate::format::*;
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Fixed part of a central directory record
const CENTRAL_RECORD_LEN: usize = 46;
/// Fixed part of a local file header
const LOCAL_HEADER_LEN: usize = 30;
const ZIP64_LOCATOR_LEN: u64 = 20;

/// Entry in the ZIP central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub crc32: u32,
    pub flags: u16,
    pub offset: u64,
}

/// ZIP archive reader over any seekable source
pub struct StreamingZipReader<R: Read + Seek> {
    source: R,
    entries: Vec<ZipEntry>,
}

impl StreamingZipReader<BufReader<File>> {
    /// Open a ZIP file and read its central directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> StreamingZipReader<R> {
    /// Read the central directory from `source`
    pub fn new(mut source: R) -> Result<Self> {
        let entries = read_central_directory(&mut source)?;
        Ok(Self { source, entries })
    }

    /// Get list of all entries in the ZIP
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Entry names in central directory order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Find an entry by name
    pub fn find_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Read an entry by name and verify its CRC-32
    pub fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find_entry(name)
            .ok_or_else(|| ZipError::EntryNotFound(name.to_string()))?
            .clone();
        self.read_entry(&entry)
    }

    /// Read an entry's decompressed data and verify its CRC-32
    pub fn read_entry(&mut self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.uncompressed_size.min(1 << 24) as usize);
        self.read_entry_streaming(entry)?.read_to_end(&mut data)?;

        let actual = crc32fast::hash(&data);
        if actual != entry.crc32 {
            return Err(ZipError::CrcMismatch {
                name: entry.name.clone(),
                expected: entry.crc32,
                actual,
            });
        }
        Ok(data)
    }

    /// Decompressing reader over an entry's data (no CRC check)
    pub fn read_entry_streaming(&mut self, entry: &ZipEntry) -> Result<Box<dyn Read + '_>> {
        self.source.seek(SeekFrom::Start(entry.offset))?;
        let mut header = [0u8; LOCAL_HEADER_LEN];
        self.source.read_exact(&mut header)?;
        if le_u32(&header, 0) != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(ZipError::InvalidFormat(format!(
                "Invalid local file header signature for {}",
                entry.name
            )));
        }
        let skip = le_u16(&header, 26) as i64 + le_u16(&header, 28) as i64;
        self.source.seek(SeekFrom::Current(skip))?;

        let limited = (&mut self.source).take(entry.compressed_size);
        match entry.compression_method {
            0 => Ok(Box::new(limited)),
            8 => Ok(Box::new(DeflateDecoder::new(limited))),
            #[cfg(feature = "zstd-support")]
            93 => Ok(Box::new(zstd::Decoder::new(limited)?)),
            method => Err(ZipError::UnsupportedCompression(method)),
        }
    }
}

struct DirectoryLocation {
    entries: u64,
    size: u64,
    offset: u64,
}

fn read_central_directory<R: Read + Seek>(source: &mut R) -> Result<Vec<ZipEntry>> {
    let (eocd_offset, eocd) = find_eocd(source)?;

    let entries_16 = le_u16(&eocd, 10);
    let size_32 = le_u32(&eocd, 12);
    let offset_32 = le_u32(&eocd, 16);

    let location = if entries_16 == ZIP64_MARKER_16
        || size_32 == ZIP64_MARKER_32
        || offset_32 == ZIP64_MARKER_32
    {
        read_zip64_eocd(source, eocd_offset)?
    } else {
        DirectoryLocation {
            entries: entries_16 as u64,
            size: size_32 as u64,
            offset: offset_32 as u64,
        }
    };

    let directory_end = location
        .offset
        .checked_add(location.size)
        .ok_or_else(|| ZipError::InvalidFormat("Central directory out of range".to_string()))?;
    if directory_end > eocd_offset {
        return Err(ZipError::InvalidFormat(
            "Central directory overlaps end record".to_string(),
        ));
    }

    source.seek(SeekFrom::Start(location.offset))?;
    let mut directory = vec![0u8; location.size as usize];
    source.read_exact(&mut directory)?;

    let mut entries = Vec::with_capacity(location.entries.min(u16::MAX as u64) as usize);
    let mut at = 0usize;
    for _ in 0..location.entries {
        if at + CENTRAL_RECORD_LEN > directory.len()
            || le_u32(&directory, at) != CENTRAL_DIRECTORY_SIGNATURE
        {
            return Err(ZipError::InvalidFormat(format!(
                "Truncated central directory after {} entries",
                entries.len()
            )));
        }
        let (entry, record_len) = parse_central_record(&directory[at..])?;
        entries.push(entry);
        at += record_len;
    }

    Ok(entries)
}

/// Parse one central directory record, returning the entry and the record length
fn parse_central_record(record: &[u8]) -> Result<(ZipEntry, usize)> {
    let flags = le_u16(record, 8);
    let compression_method = le_u16(record, 10);
    let crc32 = le_u32(record, 16);
    let compressed_32 = le_u32(record, 20);
    let uncompressed_32 = le_u32(record, 24);
    let name_len = le_u16(record, 28) as usize;
    let extra_len = le_u16(record, 30) as usize;
    let comment_len = le_u16(record, 32) as usize;
    let offset_32 = le_u32(record, 42);

    let record_len = CENTRAL_RECORD_LEN + name_len + extra_len + comment_len;
    if record.len() < record_len {
        return Err(ZipError::InvalidFormat(
            "Central directory record exceeds directory".to_string(),
        ));
    }
    let name_end = CENTRAL_RECORD_LEN + name_len;
    let name = String::from_utf8_lossy(&record[CENTRAL_RECORD_LEN..name_end]).into_owned();
    let extra = &record[name_end..name_end + extra_len];

    let mut entry = ZipEntry {
        name,
        compressed_size: compressed_32 as u64,
        uncompressed_size: uncompressed_32 as u64,
        compression_method,
        crc32,
        flags,
        offset: offset_32 as u64,
    };

    if let Some(zip64) = find_extra(extra, ZIP64_EXTRA_ID) {
        // values appear only for the fields that carry the marker, in this order
        let mut values = zip64.chunks_exact(8).map(|chunk| le_u64(chunk, 0));
        if uncompressed_32 == ZIP64_MARKER_32 {
            entry.uncompressed_size = values.next().unwrap_or(entry.uncompressed_size);
        }
        if compressed_32 == ZIP64_MARKER_32 {
            entry.compressed_size = values.next().unwrap_or(entry.compressed_size);
        }
        if offset_32 == ZIP64_MARKER_32 {
            entry.offset = values.next().unwrap_or(entry.offset);
        }
    }

    Ok((entry, record_len))
}

fn find_extra(mut extra: &[u8], id: u16) -> Option<&[u8]> {
    while extra.len() >= 4 {
        let field_id = le_u16(extra, 0);
        let len = le_u16(extra, 2) as usize;
        let data = extra.get(4..4 + len)?;
        if field_id == id {
            return Some(data);
        }
        extra = &extra[4 + len..];
    }
    None
}

/// Locate the end of central directory record in the trailing window of the file
fn find_eocd<R: Read + Seek>(source: &mut R) -> Result<(u64, Vec<u8>)> {
    let file_size = source.seek(SeekFrom::End(0))?;
    let search_start = file_size.saturating_sub(EOCD_SEARCH_WINDOW);
    source.seek(SeekFrom::Start(search_start))?;
    let mut tail = Vec::new();
    source.read_to_end(&mut tail)?;

    let mut window = &tail[..];
    while let Some(pos) = rfind_signature(window, END_OF_CENTRAL_DIRECTORY_SIGNATURE) {
        if pos + EOCD_LEN <= tail.len() {
            let comment_len = le_u16(&tail, pos + 20) as usize;
            if pos + EOCD_LEN + comment_len <= tail.len() {
                let record = tail[pos..pos + EOCD_LEN].to_vec();
                return Ok((search_start + pos as u64, record));
            }
        }
        window = &tail[..pos];
    }

    Err(ZipError::InvalidFormat(
        "End of central directory not found".to_string(),
    ))
}

fn read_zip64_eocd<R: Read + Seek>(source: &mut R, eocd_offset: u64) -> Result<DirectoryLocation> {
    let locator_offset = eocd_offset.checked_sub(ZIP64_LOCATOR_LEN).ok_or_else(|| {
        ZipError::InvalidFormat("ZIP64 EOCD locator not found".to_string())
    })?;
    source.seek(SeekFrom::Start(locator_offset))?;
    let mut locator = [0u8; ZIP64_LOCATOR_LEN as usize];
    source.read_exact(&mut locator)?;
    if le_u32(&locator, 0) != ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE {
        return Err(ZipError::InvalidFormat(
            "ZIP64 EOCD locator not found".to_string(),
        ));
    }

    source.seek(SeekFrom::Start(le_u64(&locator, 8)))?;
    let mut record = [0u8; 56];
    source.read_exact(&mut record)?;
    let signature = le_u32(&record, 0);
    if signature != ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE {
        return Err(ZipError::InvalidFormat(format!(
            "Invalid ZIP64 EOCD signature: 0x{:08x}",
            signature
        )));
    }

    Ok(DirectoryLocation {
        entries: le_u64(&record, 32),
        size: le_u64(&record, 40),
        offset: le_u64(&record, 48),
    })
}
