//! ZIP record signatures, header flags and little-endian helpers shared by the
//! reader and the writer.

pub(crate) const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
pub(crate) const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;
pub(crate) const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;
pub(crate) const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;
pub(crate) const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;
pub(crate) const ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE: u32 = 0x07064b50;

/// ZIP64 extended information extra field id
pub(crate) const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Sizes and CRC follow the entry data in a data descriptor
pub(crate) const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// Entry name is UTF-8
pub(crate) const FLAG_UTF8: u16 = 1 << 11;

pub(crate) const VERSION_DEFAULT: u16 = 20;
pub(crate) const VERSION_ZIP64: u16 = 45;
#[cfg(feature = "zstd-support")]
pub(crate) const VERSION_ZSTD: u16 = 63;

/// Fixed part of the end of central directory record
pub(crate) const EOCD_LEN: usize = 22;
/// EOCD plus the longest possible archive comment
pub(crate) const EOCD_SEARCH_WINDOW: u64 = EOCD_LEN as u64 + u16::MAX as u64;

/// 32-bit field marker meaning "see the ZIP64 extra field"
pub(crate) const ZIP64_MARKER_32: u32 = u32::MAX;
pub(crate) const ZIP64_MARKER_16: u16 = u16::MAX;

pub(crate) fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Value for a 32-bit size/offset field, or the ZIP64 marker when it does not fit
pub(crate) fn field_u32(value: u64) -> u32 {
    if needs_zip64(value) {
        ZIP64_MARKER_32
    } else {
        value as u32
    }
}

pub(crate) fn needs_zip64(value: u64) -> bool {
    value >= ZIP64_MARKER_32 as u64
}

pub(crate) fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

pub(crate) fn le_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

pub(crate) fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Position of the last occurrence of `signature` in `buf`
pub(crate) fn rfind_signature(buf: &[u8], signature: u32) -> Option<usize> {
    let needle = signature.to_le_bytes();
    buf.windows(4).rposition(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_u32_marks_large_values() {
        assert_eq!(field_u32(12), 12);
        assert_eq!(field_u32(u32::MAX as u64 - 1), u32::MAX - 1);
        assert_eq!(field_u32(u32::MAX as u64), ZIP64_MARKER_32);
        assert_eq!(field_u32(5 * 1024 * 1024 * 1024), ZIP64_MARKER_32);
    }

    #[test]
    fn test_rfind_signature_returns_last_match() {
        let mut buf = Vec::new();
        put_u32(&mut buf, END_OF_CENTRAL_DIRECTORY_SIGNATURE);
        put_u16(&mut buf, 7);
        put_u32(&mut buf, END_OF_CENTRAL_DIRECTORY_SIGNATURE);
        assert_eq!(rfind_signature(&buf, END_OF_CENTRAL_DIRECTORY_SIGNATURE), Some(6));
        assert_eq!(rfind_signature(&buf, CENTRAL_DIRECTORY_SIGNATURE), None);
        assert_eq!(le_u16(&buf, 4), 7);
    }
}
