//! Document metadata store (`dmd`): one fixed-size record per docid.
//!
//! Record `i` holds `(file_id, start, end)` for docid `i`, each a u32 BE.
//! Record 0 is a placeholder so that real docids start at 1.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::constants::DOC_META_RECORD_SIZE;
use crate::error::{BlotdexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocMeta {
    pub file_id: u32,
    pub start: u32,
    pub end: u32,
}

impl DocMeta {
    fn encode(&self) -> [u8; DOC_META_RECORD_SIZE] {
        let mut out = [0u8; DOC_META_RECORD_SIZE];
        out[0..4].copy_from_slice(&self.file_id.to_be_bytes());
        out[4..8].copy_from_slice(&self.start.to_be_bytes());
        out[8..12].copy_from_slice(&self.end.to_be_bytes());
        out
    }

    fn decode(record: &[u8]) -> Option<Self> {
        let field = |at: usize| {
            record
                .get(at..at + 4)
                .and_then(|s| <[u8; 4]>::try_from(s).ok())
                .map(u32::from_be_bytes)
        };
        Some(Self {
            file_id: field(0)?,
            start: field(4)?,
            end: field(8)?,
        })
    }
}

fn record_count(path: &Path, len: u64) -> Result<u32> {
    if len % DOC_META_RECORD_SIZE as u64 != 0 {
        return Err(BlotdexError::decode(
            len,
            format!("{} is not a whole number of metadata records", path.display()),
        ));
    }
    u32::try_from(len / DOC_META_RECORD_SIZE as u64)
        .map_err(|_| BlotdexError::decode(len, "metadata file exceeds the docid space"))
}

/// Buffered appender assigning docids.
#[derive(Debug)]
pub struct DocMetaWriter {
    path: PathBuf,
    flushed: u32,
    flush_rate: usize,
    pending: Vec<DocMeta>,
}

impl DocMetaWriter {
    /// Opens the store for appending, creating it lazily on first flush.
    pub fn open(path: impl Into<PathBuf>, flush_rate: usize) -> Result<Self> {
        let path = path.into();
        let flushed = match std::fs::metadata(&path) {
            Ok(meta) => record_count(&path, meta.len())?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
            Err(err) => return Err(err.into()),
        };
        let flush_rate = flush_rate.max(1);
        let mut pending = Vec::with_capacity(flush_rate);
        if flushed == 0 {
            pending.push(DocMeta::default());
        }
        Ok(Self {
            path,
            flushed,
            flush_rate,
            pending,
        })
    }

    /// Appends a record and returns its docid.
    pub fn add(&mut self, file_id: u32, start: u32, end: u32) -> Result<u32> {
        if self.pending.len() >= self.flush_rate {
            self.flush()?;
        }
        let docid = self
            .flushed
            .checked_add(self.pending.len() as u32)
            .ok_or_else(|| BlotdexError::decode(0, "docid space exhausted"))?;
        self.pending.push(DocMeta {
            file_id,
            start,
            end,
        });
        Ok(docid)
    }

    /// The most recently assigned docid (0 when no document was added yet).
    #[must_use]
    pub fn last(&self) -> u32 {
        (self.flushed + self.pending.len() as u32).saturating_sub(1)
    }

    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for meta in &self.pending {
            writer.write_all(&meta.encode())?;
        }
        writer.flush()?;
        tracing::debug!(
            dmd.path = %self.path.display(),
            dmd.records = self.pending.len(),
            "flushed document metadata"
        );
        self.flushed += self.pending.len() as u32;
        self.pending.clear();
        Ok(())
    }
}

/// Read-only, memory-mapped view of the store.
#[derive(Debug)]
pub struct DocMetaReader {
    map: Option<Mmap>,
    records: u32,
}

impl DocMetaReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let records = record_count(path, len)?;
        let map = if len == 0 {
            None
        } else {
            // SAFETY: the index lock keeps writers out while the map is alive.
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self { map, records })
    }

    /// Number of real documents, excluding the placeholder record.
    #[must_use]
    pub fn num_docs(&self) -> u64 {
        u64::from(self.records.saturating_sub(1))
    }

    #[must_use]
    pub fn lookup(&self, docid: u32) -> Option<DocMeta> {
        if docid == 0 || docid >= self.records {
            return None;
        }
        let start = docid as usize * DOC_META_RECORD_SIZE;
        let map = self.map.as_ref()?;
        DocMeta::decode(map.get(start..start + DOC_META_RECORD_SIZE)?)
    }
}
