//! Write jobs: batch entries, handler tokens and entry name rules

use crate::error::{Result, ZipError};
use crate::status::JobState;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One file of a batch: where to read it and the name it gets inside the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// Entry name in ZIP
    pub name: String,
    /// File path to read from
    pub path: PathBuf,
}

impl BatchEntry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Pair entry names with source paths position by position.
///
/// `count` must equal both slice lengths; nothing is paired otherwise.
pub fn pair_batch<N, P>(
    entry_names: &[N],
    source_paths: &[P],
    count: usize,
) -> Result<Vec<BatchEntry>>
where
    N: AsRef<str>,
    P: AsRef<Path>,
{
    if entry_names.len() != count || source_paths.len() != count {
        return Err(ZipError::LengthMismatch {
            count,
            entries: entry_names.len(),
            sources: source_paths.len(),
        });
    }
    Ok(entry_names
        .iter()
        .zip(source_paths)
        .map(|(name, path)| BatchEntry::new(name.as_ref(), path.as_ref()))
        .collect())
}

/// Token for one submitted write job, only meaningful to the archive that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteHandler {
    pub(crate) archive_id: u64,
    pub(crate) job_id: u64,
}

impl WriteHandler {
    /// Position of the job among the jobs submitted to its archive
    pub fn job_id(&self) -> u64 {
        self.job_id
    }
}

/// Job as handed to the worker thread
pub(crate) struct Job {
    pub(crate) id: u64,
    pub(crate) entries: Vec<BatchEntry>,
    pub(crate) state: Arc<JobState>,
}

/// Source file opened before any byte of its job is written
pub(crate) struct OpenedSource {
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    pub(crate) file: File,
    pub(crate) len: u64,
}

/// Longest name a local or central header can record
pub const MAX_ENTRY_NAME_LEN: usize = u16::MAX as usize;

/// Canonical form of an entry name: forward slashes, no leading `/` or `./`,
/// no empty, `.` or `..` components, at most [`MAX_ENTRY_NAME_LEN`] bytes.
pub fn normalize_entry_name(name: &str) -> Result<String> {
    let unified = name.replace('\\', "/");
    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(ZipError::InvalidEntryName(name.to_string())),
            part => parts.push(part),
        }
    }
    let normalized = parts.join("/");
    if normalized.is_empty() || normalized.len() > MAX_ENTRY_NAME_LEN {
        return Err(ZipError::InvalidEntryName(name.to_string()));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_batch_positional() {
        let batch = pair_batch(
            &["test.txt", "test/test3.txt"],
            &["test/test.txt", "test/test/test3.txt"],
            2,
        )
        .unwrap();
        assert_eq!(batch[1], BatchEntry::new("test/test3.txt", "test/test/test3.txt"));
    }

    #[test]
    fn test_pair_batch_length_mismatch() {
        let err = pair_batch(&["a", "b"], &["a"], 2).unwrap_err();
        match err {
            ZipError::LengthMismatch {
                count,
                entries,
                sources,
            } => assert_eq!((count, entries, sources), (2, 2, 1)),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(pair_batch(&["a"], &["a"], 3).is_err());
    }

    #[test]
    fn test_normalize_entry_name() {
        assert_eq!(normalize_entry_name("test/test3.txt").unwrap(), "test/test3.txt");
        assert_eq!(normalize_entry_name("/abs/x.txt").unwrap(), "abs/x.txt");
        assert_eq!(normalize_entry_name("dir\\win.txt").unwrap(), "dir/win.txt");
        assert_eq!(normalize_entry_name("./a//b.txt").unwrap(), "a/b.txt");
    }

    #[test]
    fn test_normalize_rejects_escapes_and_empty() {
        assert!(normalize_entry_name("../etc/passwd").is_err());
        assert!(normalize_entry_name("a/../../b").is_err());
        assert!(normalize_entry_name("").is_err());
        assert!(normalize_entry_name("/./").is_err());
    }

    #[test]
    fn test_normalize_rejects_names_too_long_for_header() {
        let longest = "n".repeat(MAX_ENTRY_NAME_LEN);
        assert_eq!(normalize_entry_name(&longest).unwrap().len(), MAX_ENTRY_NAME_LEN);
        match normalize_entry_name(&"x".repeat(70_000)) {
            Err(ZipError::InvalidEntryName(_)) => {}
            other => panic!("unexpected result {:?}", other.map(|n| n.len())),
        }
    }
}
