use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};

use crate::config::directory_path;
use crate::constants::SUBFINGERPRINTS;
use crate::error::{BlotdexError, Result};
use crate::io::posting::{Poster, PostingFile};
use crate::types::Post;

use super::read_directory;

/// Single-owner writer for one shard: 65536 posters over one posting file.
#[derive(Debug)]
pub struct ShardWriter {
    id: u32,
    path: PathBuf,
    file: PostingFile,
    posters: Vec<Poster>,
    failed: Option<BlotdexError>,
}

impl ShardWriter {
    /// Creates an empty shard at `path`, truncating any previous files.
    pub fn create(id: u32, path: &Path) -> Result<Self> {
        let file = PostingFile::create(path)?;
        let writer = Self {
            id,
            path: path.to_path_buf(),
            file,
            posters: vec![Poster::default(); SUBFINGERPRINTS],
            failed: None,
        };
        writer.write_directory()?;
        Ok(writer)
    }

    /// Reopens an existing shard so new posts extend its chains.
    pub fn open_append(id: u32, path: &Path) -> Result<Self> {
        let entries = read_directory(&directory_path(path))?;
        let mut file = PostingFile::open_append(path)?;
        let mut posters = Vec::with_capacity(SUBFINGERPRINTS);
        for (sub, entry) in entries.into_iter().enumerate() {
            let mut poster = Poster::from_entry(entry);
            poster
                .read_to_link(&mut file)
                .map_err(|err| match err {
                    BlotdexError::Decode { offset, reason } => BlotdexError::Decode {
                        offset,
                        reason: format!("subfingerprint {sub:#06x}: {reason}"),
                    },
                    other => other,
                })?;
            posters.push(poster);
        }
        tracing::info!(
            shard.id = id,
            shard.bytes = file.len(),
            "reopened shard for append"
        );
        Ok(Self {
            id,
            path: path.to_path_buf(),
            file,
            posters,
            failed: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Appends the posts of one document batch. Posts for each
    /// subfingerprint must arrive in non-decreasing docid order.
    pub fn add_posts(&mut self, posts: &[Post]) -> Result<()> {
        for post in posts {
            let sub = post.sub();
            self.posters[usize::from(sub)].add_post(sub, post.docid(), &mut self.file)?;
        }
        Ok(())
    }

    /// Consumes batches until the sending side hangs up, acknowledging each.
    ///
    /// After the first write error the shard stops writing; the error is
    /// reported by [`ShardWriter::close`].
    pub fn serve(&mut self, batches: &Receiver<Vec<Post>>, acks: &Sender<()>) {
        for batch in batches {
            if self.failed.is_none() {
                if let Err(err) = self.add_posts(&batch) {
                    tracing::error!(shard.id = self.id, error = %err, "shard write failed");
                    self.failed = Some(err);
                }
            } else {
                tracing::debug!(
                    shard.id = self.id,
                    batch.posts = batch.len(),
                    "dropping posts for failed shard"
                );
            }
            if acks.send(()).is_err() {
                break;
            }
        }
    }

    /// Flushes every buffer, syncs the posting file and rewrites the
    /// directory.
    ///
    /// A shard that failed earlier still flushes what it can and records
    /// the chains as they stand on disk, then returns its first error.
    pub fn close(mut self) -> Result<()> {
        let id = self.id;
        let mut first = self.failed.take();
        let mut keep = |res: Result<()>| {
            if let Err(err) = res {
                if first.is_none() {
                    first = Some(err);
                } else {
                    tracing::warn!(shard.id = id, error = %err, "dropping shard close error");
                }
            }
        };
        for poster in &mut self.posters {
            keep(poster.flush_to(&mut self.file));
        }
        keep(self.file.sync());
        keep(self.write_directory());
        if let Some(err) = first {
            return Err(err);
        }
        tracing::debug!(
            shard.id = self.id,
            shard.bytes = self.file.len(),
            "closed shard"
        );
        Ok(())
    }

    fn write_directory(&self) -> Result<()> {
        let file = File::create(directory_path(&self.path))?;
        let mut writer = BufWriter::new(file);
        let mut scratch = Vec::with_capacity(32);
        for poster in &self.posters {
            poster.entry().write_to(&mut writer, &mut scratch)?;
        }
        let file = writer.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}
