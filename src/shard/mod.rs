//! Per-shard posting storage.
//!
//! A shard owns every fingerprint `f` with `f % num_shards == id`, keyed
//! inside the shard by its 16-bit subfingerprint. On disk a shard is a
//! posting file `b<id>.pos` plus its directory `b<id>.pos.iix`.

mod reader;
mod writer;

use std::io::{self, BufReader, Read};
use std::path::Path;

pub use reader::{ReadState, ShardReader};
pub use writer::ShardWriter;

use crate::constants::SUBFINGERPRINTS;
use crate::error::{BlotdexError, Result};
use crate::io::posting::DirectoryEntry;

/// Reads all directory entries, rejecting short or malformed files.
pub(crate) fn read_directory(path: &Path) -> Result<Vec<DirectoryEntry>> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut entries = Vec::with_capacity(SUBFINGERPRINTS);
    for sub in 0..SUBFINGERPRINTS {
        match DirectoryEntry::read_from(&mut reader) {
            Ok(entry) => entries.push(entry),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
                ) =>
            {
                return Err(BlotdexError::CorruptDirectory {
                    path: path.to_path_buf(),
                    reason: format!("entry {sub:#06x}: {err}"),
                });
            }
            Err(err) => return Err(err.into()),
        }
    }
    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(BlotdexError::CorruptDirectory {
            path: path.to_path_buf(),
            reason: "trailing bytes after last entry".into(),
        });
    }
    Ok(entries)
}
