use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A byte range of a file, optionally with its bytes loaded.
///
/// `data` is `None` until the range has been read; an empty body is
/// `Some` and stays empty. It is never serialized; query results carry only
/// the location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doc {
    pub path: PathBuf,
    pub start: u32,
    pub end: u32,
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
}

impl Doc {
    /// A document covering all of `body`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, body: impl Into<Vec<u8>>) -> Self {
        let data = body.into();
        Self {
            path: path.into(),
            start: 0,
            end: data.len() as u32,
            data: Some(data),
        }
    }

    #[must_use]
    pub fn with_range(path: impl Into<PathBuf>, start: u32, end: u32) -> Self {
        Self {
            path: path.into(),
            start,
            end,
            data: None,
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Loaded bytes, empty when nothing has been loaded.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Reads `[start, end)` from `path`, or the whole file when both are 0.
    pub fn load(&mut self) -> Result<()> {
        let mut file = File::open(&self.path)?;
        if self.start == 0 && self.end == 0 {
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            self.end = data.len() as u32;
            self.data = Some(data);
            return Ok(());
        }
        file.seek(SeekFrom::Start(u64::from(self.start)))?;
        let mut data = vec![0; self.end.saturating_sub(self.start) as usize];
        file.read_exact(&mut data)?;
        self.data = Some(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_reads_whole_file_or_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mail.txt");
        std::fs::write(&path, b"header\nbody text\n").unwrap();

        let mut whole = Doc::with_range(&path, 0, 0);
        assert!(!whole.is_loaded());
        whole.load().unwrap();
        assert_eq!(whole.end, 17);
        assert_eq!(whole.bytes(), b"header\nbody text\n");

        let mut part = Doc::with_range(&path, 7, 11);
        part.load().unwrap();
        assert_eq!(part.bytes(), b"body");
    }

    #[test]
    fn empty_body_counts_as_loaded() {
        let doc = Doc::new("/nowhere/empty.txt", Vec::<u8>::new());
        assert!(doc.is_loaded());
        assert_eq!((doc.start, doc.end), (0, 0));
        assert!(doc.bytes().is_empty());
    }

    #[test]
    fn range_past_end_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.txt");
        std::fs::write(&path, b"abc").unwrap();
        assert!(Doc::with_range(&path, 1, 10).load().is_err());
    }
}
