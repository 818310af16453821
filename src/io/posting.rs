//! Posting-list codec for a single subfingerprint.
//!
//! Each subfingerprint owns a chain of blocks in the shard's posting file:
//!
//! ```text
//! [varint block_len][uvarint delta]...[i64 BE link]
//! ```
//!
//! `block_len` counts the deltas plus the 8 link bytes. `head` is the offset
//! of the first block. A freshly written block carries link `-1`; when the
//! next block for the same subfingerprint is flushed, that link is patched in
//! place to the new block's offset, so chains read oldest to newest.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::constants::{LINK_SIZE, MAX_VARINT_LEN, NO_LINK, POST_FLUSH_BYTES};
use crate::error::{BlotdexError, Result};
use crate::io::varint::{put_uvarint, put_varint, read_uvarint, read_varint, uvarint, varint};

/// Append-mostly handle on a shard posting file.
///
/// Blocks are only ever appended; the single in-place write is patching the
/// tail link of a chain.
#[derive(Debug)]
pub struct PostingFile {
    file: File,
    end: u64,
    scratch: Vec<u8>,
}

impl PostingFile {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::with_end(file, 0))
    }

    pub fn open_append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let end = file.metadata()?.len();
        Ok(Self::with_end(file, end))
    }

    fn with_end(file: File, end: u64) -> Self {
        Self {
            file,
            end,
            scratch: Vec::with_capacity(POST_FLUSH_BYTES + 2 * MAX_VARINT_LEN + LINK_SIZE),
        }
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end
    }

    /// Appends one block holding `deltas` and a terminal link.
    ///
    /// Returns the block offset and the offset of its link field.
    pub fn write_block(&mut self, deltas: &[u8]) -> Result<(u64, u64)> {
        let offset = self.end;
        self.scratch.clear();
        put_varint(&mut self.scratch, (deltas.len() + LINK_SIZE) as i64);
        self.scratch.extend_from_slice(deltas);
        self.scratch.extend_from_slice(&NO_LINK.to_be_bytes());

        let block = std::mem::take(&mut self.scratch);
        let written = self.seek_and_write(offset, &block);
        self.scratch = block;
        written?;

        self.end = offset + self.scratch.len() as u64;
        Ok((offset, self.end - LINK_SIZE as u64))
    }

    /// Points the link field at `link_pos` to the block at `target`.
    pub fn patch_link(&mut self, link_pos: u64, target: u64) -> Result<()> {
        if link_pos + LINK_SIZE as u64 > self.end {
            return Err(BlotdexError::decode(link_pos, "link field past end of posting file"));
        }
        self.seek_and_write(link_pos, &(target as i64).to_be_bytes())
    }

    fn seek_and_write(&mut self, position: u64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(position))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Reads a block's length prefix, returning `(block_len, prefix_len)`.
    fn read_block_len(&mut self, position: u64) -> Result<(u64, u64)> {
        let available = self.end.saturating_sub(position).min(MAX_VARINT_LEN as u64) as usize;
        if available == 0 {
            return Err(BlotdexError::decode(position, "block offset past end of posting file"));
        }
        let mut buf = [0u8; MAX_VARINT_LEN];
        self.read_at(position, &mut buf[..available])?;
        let (len, n) = varint(&buf[..available])
            .ok_or_else(|| BlotdexError::decode(position, "malformed block length"))?;
        if len <= LINK_SIZE as i64 {
            return Err(BlotdexError::decode(
                position,
                format!("invalid length of flushed post block: {len}"),
            ));
        }
        Ok((len as u64, n as u64))
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Directory record for one subfingerprint, as stored in the `.iix` file:
/// zigzag varint `head`, zigzag varint `total`, u32 BE `current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub head: i64,
    pub total: u32,
    pub current: u32,
}

impl DirectoryEntry {
    pub const EMPTY: Self = Self {
        head: NO_LINK,
        total: 0,
        current: 0,
    };

    pub fn write_to<W: Write>(&self, writer: &mut W, scratch: &mut Vec<u8>) -> io::Result<()> {
        scratch.clear();
        put_varint(scratch, self.head);
        put_varint(scratch, i64::from(self.total));
        scratch.extend_from_slice(&self.current.to_be_bytes());
        writer.write_all(scratch)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let head = read_varint(reader)?;
        let total = read_varint(reader)?;
        let total = u32::try_from(total).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, format!("invalid total: {total}"))
        })?;
        let mut current = [0u8; 4];
        reader.read_exact(&mut current)?;
        if (head == NO_LINK) != (total == 0) || head < NO_LINK {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("head {head} inconsistent with total {total}"),
            ));
        }
        Ok(Self {
            head,
            total,
            current: u32::from_be_bytes(current),
        })
    }
}

/// Writer-side state of one subfingerprint's posting chain.
#[derive(Debug, Clone)]
pub struct Poster {
    head: i64,
    link: i64,
    current: u32,
    total: u32,
    posts: Vec<u8>,
    // `total` and `current` as of the last block that reached the file.
    flushed_total: u32,
    flushed_current: u32,
}

impl Default for Poster {
    fn default() -> Self {
        Self::from_entry(DirectoryEntry::EMPTY)
    }
}

impl Poster {
    /// Restores a poster from its directory record. The append link is not
    /// known until [`Poster::read_to_link`] runs.
    #[must_use]
    pub fn from_entry(entry: DirectoryEntry) -> Self {
        Self {
            head: entry.head,
            link: NO_LINK,
            current: entry.current,
            total: entry.total,
            posts: Vec::new(),
            flushed_total: entry.total,
            flushed_current: entry.current,
        }
    }

    /// Directory record for the chain as it stands in the posting file.
    /// Posts still buffered are not counted.
    #[must_use]
    pub fn entry(&self) -> DirectoryEntry {
        DirectoryEntry {
            head: self.head,
            total: self.flushed_total,
            current: self.flushed_current,
        }
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn head(&self) -> i64 {
        self.head
    }

    /// Records that `docid` contains this subfingerprint.
    ///
    /// Docids must be non-decreasing; repeating the last docid is a no-op.
    pub fn add_post(&mut self, sub: u16, docid: u32, file: &mut PostingFile) -> Result<()> {
        if docid == self.current && self.total != 0 {
            return Ok(());
        }
        if docid < self.current {
            return Err(BlotdexError::OutOfOrderPost {
                sub,
                docid,
                current: self.current,
            });
        }
        if self.posts.capacity() == 0 {
            self.posts.reserve_exact(POST_FLUSH_BYTES + MAX_VARINT_LEN);
        }
        put_uvarint(&mut self.posts, u64::from(docid - self.current));
        self.current = docid;
        self.total += 1;
        if self.posts.len() >= POST_FLUSH_BYTES {
            return self.flush_to(file);
        }
        Ok(())
    }

    /// Writes buffered deltas as a new block and chains it to the previous one.
    pub fn flush_to(&mut self, file: &mut PostingFile) -> Result<()> {
        if self.posts.is_empty() {
            return Ok(());
        }
        let (offset, link_pos) = file.write_block(&self.posts)?;
        if self.link == NO_LINK {
            self.head = offset as i64;
        } else {
            file.patch_link(self.link as u64, offset)?;
        }
        self.link = link_pos as i64;
        self.posts.clear();
        self.flushed_total = self.total;
        self.flushed_current = self.current;
        Ok(())
    }

    /// Walks an existing chain to find the tail link, so later flushes can
    /// extend it. Only the length prefix and link of each block are read.
    pub fn read_to_link(&mut self, file: &mut PostingFile) -> Result<()> {
        if self.head == NO_LINK {
            return Ok(());
        }
        let mut position = self.head as u64;
        loop {
            let (len, prefix) = file.read_block_len(position)?;
            let block_end = position + prefix + len;
            if block_end > file.len() {
                return Err(BlotdexError::decode(position, "truncated post block"));
            }
            let link_pos = block_end - LINK_SIZE as u64;
            let mut link = [0u8; LINK_SIZE];
            file.read_at(link_pos, &mut link)?;
            let next = i64::from_be_bytes(link);
            if next == NO_LINK {
                self.link = link_pos as i64;
                return Ok(());
            }
            // Blocks are appended, so a chain only ever moves forward.
            if next < 0 || next as u64 <= position {
                return Err(BlotdexError::decode(link_pos, format!("invalid block link {next}")));
            }
            position = next as u64;
        }
    }
}

/// Lazy reader over one posting chain.
///
/// The cursor holds the decoded docids of the current block and the offset
/// of the next block (or `-1` once the tail has been decoded).
#[derive(Debug, Clone)]
pub struct Posts {
    next_block: i64,
    current: u32,
    docids: Vec<u32>,
    i: usize,
}

impl Posts {
    #[must_use]
    pub fn new(head: i64) -> Self {
        Self {
            next_block: head,
            current: 0,
            docids: Vec::new(),
            i: 0,
        }
    }

    /// Returns the next docid in the chain, or `None` at the end of it.
    pub fn next(&mut self, data: &[u8]) -> Result<Option<u32>> {
        while self.i == self.docids.len() {
            if self.next_block == NO_LINK {
                return Ok(None);
            }
            self.read_block(data)?;
        }
        let docid = self.docids[self.i];
        self.i += 1;
        Ok(Some(docid))
    }

    fn read_block(&mut self, data: &[u8]) -> Result<()> {
        let offset = self.next_block as u64;
        let start = usize::try_from(self.next_block)
            .ok()
            .filter(|&start| start < data.len())
            .ok_or_else(|| BlotdexError::decode(offset, "block offset past end of posting file"))?;
        let (len, n) = varint(&data[start..])
            .ok_or_else(|| BlotdexError::decode(offset, "malformed block length"))?;
        if len <= LINK_SIZE as i64 {
            return Err(BlotdexError::decode(
                offset,
                format!("invalid length of flushed post block: {len}"),
            ));
        }
        let body_start = start + n;
        let body_end = usize::try_from(len)
            .ok()
            .and_then(|len| body_start.checked_add(len))
            .filter(|&end| end <= data.len())
            .ok_or_else(|| BlotdexError::decode(offset, "truncated post block"))?;
        let body = &data[body_start..body_end];
        let (deltas, link) = body.split_at(body.len() - LINK_SIZE);

        self.docids.clear();
        let mut pos = 0;
        while pos < deltas.len() {
            let (delta, used) = uvarint(&deltas[pos..]).ok_or_else(|| {
                BlotdexError::decode(offset, "misaligned delta in post block")
            })?;
            let delta = u32::try_from(delta)
                .map_err(|_| BlotdexError::decode(offset, format!("32bit delta overflow: {delta:#x}")))?;
            self.current = self
                .current
                .checked_add(delta)
                .ok_or_else(|| BlotdexError::decode(offset, "docid overflow in post block"))?;
            self.docids.push(self.current);
            pos += used;
        }

        let mut link_bytes = [0u8; LINK_SIZE];
        link_bytes.copy_from_slice(link);
        let next = i64::from_be_bytes(link_bytes);
        if next != NO_LINK && (next < 0 || next as u64 <= offset) {
            return Err(BlotdexError::decode(offset, format!("invalid block link {next}")));
        }
        self.next_block = next;
        self.i = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn generate(n: usize) -> Vec<u32> {
        let mut cur = fastrand::u32(..) >> 4;
        (0..n)
            .map(|_| {
                cur += fastrand::u32(1..118);
                cur
            })
            .collect()
    }

    fn read_all(head: i64, data: &[u8]) -> Vec<u32> {
        let mut posts = Posts::new(head);
        let mut out = Vec::new();
        while let Some(docid) = posts.next(data).unwrap() {
            out.push(docid);
        }
        out
    }

    fn chain_blocks(head: i64, data: &[u8]) -> Vec<(usize, i64)> {
        let mut blocks = Vec::new();
        let mut pos = head;
        while pos != NO_LINK {
            let start = pos as usize;
            let (len, n) = varint(&data[start..]).unwrap();
            let link_at = start + n + len as usize - LINK_SIZE;
            let link = i64::from_be_bytes(data[link_at..link_at + LINK_SIZE].try_into().unwrap());
            blocks.push((start, link));
            pos = link;
        }
        blocks
    }

    #[test]
    fn posts_round_trip_across_many_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b0.pos");
        let mut file = PostingFile::create(&path).unwrap();
        let mut poster = Poster::default();

        let docids = generate(1311);
        for &docid in &docids {
            poster.add_post(0x7, docid, &mut file).unwrap();
        }
        poster.flush_to(&mut file).unwrap();
        file.sync().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(read_all(poster.head(), &data), docids);
        assert_eq!(poster.total() as usize, docids.len());
    }

    #[test]
    fn repeated_docid_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b0.pos");
        let mut file = PostingFile::create(&path).unwrap();
        let mut poster = Poster::default();

        for docid in [1, 1, 2, 2, 2, 9] {
            poster.add_post(0, docid, &mut file).unwrap();
        }
        assert_eq!(poster.total(), 3);
        poster.flush_to(&mut file).unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(read_all(poster.head(), &data), vec![1, 2, 9]);
    }

    #[test]
    fn decreasing_docid_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut file = PostingFile::create(&dir.path().join("b0.pos")).unwrap();
        let mut poster = Poster::default();
        poster.add_post(5, 10, &mut file).unwrap();
        let err = poster.add_post(5, 3, &mut file).unwrap_err();
        assert!(matches!(
            err,
            BlotdexError::OutOfOrderPost {
                sub: 5,
                docid: 3,
                current: 10
            }
        ));
    }

    #[test]
    fn entry_covers_only_flushed_posts() {
        let dir = TempDir::new().unwrap();
        let mut file = PostingFile::create(&dir.path().join("b0.pos")).unwrap();
        let mut poster = Poster::default();
        poster.add_post(0, 4, &mut file).unwrap();
        assert_eq!(poster.entry(), DirectoryEntry::EMPTY);

        poster.flush_to(&mut file).unwrap();
        poster.add_post(0, 9, &mut file).unwrap();
        let entry = poster.entry();
        assert_eq!((entry.head, entry.total, entry.current), (0, 1, 4));
        assert_eq!(poster.total(), 2);
    }

    #[test]
    fn chain_links_every_flush_and_ends_in_terminal_link() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b0.pos");
        let mut file = PostingFile::create(&path).unwrap();
        let mut a = Poster::default();
        let mut b = Poster::default();

        // Interleave two chains so blocks of one are not contiguous.
        let flushes = 5;
        let mut docid = 0;
        for _ in 0..flushes {
            for _ in 0..40 {
                docid += 1;
                a.add_post(1, docid, &mut file).unwrap();
                b.add_post(2, docid, &mut file).unwrap();
            }
            a.flush_to(&mut file).unwrap();
            b.flush_to(&mut file).unwrap();
        }

        let data = std::fs::read(&path).unwrap();
        let blocks = chain_blocks(a.head(), &data);
        assert_eq!(blocks.len(), flushes);
        assert_eq!(blocks.last().unwrap().1, NO_LINK);
        assert!(blocks[..flushes - 1].iter().all(|&(_, link)| link != NO_LINK));
        assert_eq!(read_all(a.head(), &data).len(), a.total() as usize);
        assert_eq!(read_all(b.head(), &data), read_all(a.head(), &data));
    }

    #[test]
    fn read_to_link_allows_extending_a_reopened_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b0.pos");
        let entry = {
            let mut file = PostingFile::create(&path).unwrap();
            let mut poster = Poster::default();
            for docid in 1..=300 {
                poster.add_post(0, docid, &mut file).unwrap();
            }
            poster.flush_to(&mut file).unwrap();
            poster.entry()
        };

        let mut file = PostingFile::open_append(&path).unwrap();
        let mut poster = Poster::from_entry(entry);
        poster.read_to_link(&mut file).unwrap();
        for docid in 301..=450 {
            poster.add_post(0, docid, &mut file).unwrap();
        }
        poster.flush_to(&mut file).unwrap();

        let data = std::fs::read(&path).unwrap();
        let expected: Vec<u32> = (1..=450).collect();
        assert_eq!(read_all(poster.head(), &data), expected);
        assert_eq!(poster.total(), 450);
    }

    #[test]
    fn truncated_block_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b0.pos");
        let mut file = PostingFile::create(&path).unwrap();
        let mut poster = Poster::default();
        for docid in 1..=20 {
            poster.add_post(0, docid, &mut file).unwrap();
        }
        poster.flush_to(&mut file).unwrap();

        let data = std::fs::read(&path).unwrap();
        let mut posts = Posts::new(poster.head());
        let err = posts.next(&data[..data.len() - 3]).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn directory_entry_rejects_wide_totals() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 0);
        put_varint(&mut buf, i64::from(u32::MAX) + 1);
        buf.extend_from_slice(&[0, 0, 0, 1]);
        let err = DirectoryEntry::read_from(&mut buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut scratch = Vec::new();
        let mut out = Vec::new();
        let entry = DirectoryEntry {
            head: 17,
            total: 4,
            current: 99,
        };
        entry.write_to(&mut out, &mut scratch).unwrap();
        assert_eq!(DirectoryEntry::read_from(&mut out.as_slice()).unwrap(), entry);
    }
}
