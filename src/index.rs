//! Read side of an index.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::blotter::Blotter;
use crate::config::{self, Config};
use crate::error::{BlotdexError, Result};
use crate::io::doc_meta::DocMetaReader;
use crate::io::path_tree::PathTree;
use crate::lock::{FileLock, LockMode};
use crate::query::Query;
use crate::shard::{ReadState, ShardReader};
use crate::shatter::for_each_blot;
use crate::token::{self, Tokenizer};
use crate::types::{Blot, Doc, Stats, join_blot, split_blot};

/// An opened index. Holds the index lock shared, so any number of readers
/// may coexist while no indexer runs.
pub struct Index {
    config: Config,
    dmd: DocMetaReader,
    fnames: PathTree,
    shards: Vec<ShardReader>,
    tokenizer: Arc<dyn Tokenizer>,
    _lock: FileLock,
}

impl Index {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::path::absolute(root.as_ref())?;
        let lock = FileLock::open_and_lock(&config::lock_path(&root), LockMode::Shared)?;
        let config = Config::read(&root)?;
        let dmd = DocMetaReader::open(&config.dmd_path())?;
        let fnames = PathTree::read_from(&mut BufReader::new(File::open(config.fnames_path())?))?;
        let mut shards = Vec::with_capacity(config.num_shards);
        for i in 0..config.num_shards {
            let shard = ShardReader::open(i as u32, &config.post_path(i)).map_err(|err| {
                BlotdexError::ShardOpen {
                    shard: i as u32,
                    source: Box::new(err),
                }
            })?;
            shards.push(shard);
        }
        let tokenizer = config.token.build()?;
        tracing::info!(
            index.root = %config.index_root.display(),
            index.shards = config.num_shards,
            index.docs = dmd.num_docs(),
            "opened index"
        );
        Ok(Self {
            config,
            dmd,
            fnames,
            shards,
            tokenizer,
            _lock: lock,
        })
    }

    /// Releases the mapped files and the lock.
    pub fn close(self) -> Result<()> {
        tracing::debug!(index.root = %self.config.index_root.display(), "closed index");
        Ok(())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.index_root
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn num_shards(&self) -> usize {
        self.config.num_shards
    }

    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.config.seq_len
    }

    pub(crate) fn shards(&self) -> &[ShardReader] {
        &self.shards
    }

    /// `(shard, subfingerprint)` holding `blot`.
    #[must_use]
    pub fn split_blot(&self, blot: u32) -> (u32, u16) {
        split_blot(blot, self.config.num_shards as u32)
    }

    #[must_use]
    pub fn join_blot(&self, shard: u32, sub: u16) -> u32 {
        join_blot(shard, sub, self.config.num_shards as u32)
    }

    fn blotter(&self) -> Result<Box<dyn Blotter>> {
        self.config.blot.build()
    }

    /// Fingerprints of `doc` in document order, as produced while indexing.
    /// The document is loaded first if needed.
    pub fn blot_doc(&self, doc: &mut Doc) -> Result<Vec<u32>> {
        if !doc.is_loaded() {
            doc.load()?;
        }
        let words = token::words(self.tokenizer.as_ref(), doc.bytes(), doc.start);
        let mut blotter = self.blotter()?;
        let mut blots = Vec::with_capacity(words.len());
        for_each_blot(blotter.as_mut(), &words, |_, blot| blots.push(blot));
        Ok(blots)
    }

    /// Byte range `[start, end)` of the first word window in `doc` whose
    /// fingerprint matches `blot` in the index's fingerprint space.
    pub fn find_blot(&self, blot: u32, doc: &mut Doc) -> Result<(u32, u32)> {
        if !doc.is_loaded() {
            doc.load()?;
        }
        let words = token::words(self.tokenizer.as_ref(), doc.bytes(), doc.start);
        let mut blotter = self.blotter()?;
        let window = blotter.window();
        let wanted = self.split_blot(blot);
        let mut found = None;
        for_each_blot(blotter.as_mut(), &words, |i, got| {
            if found.is_none() && self.split_blot(got) == wanted {
                found = Some((words[i + 1 - window].pos, words[i].end()));
            }
        });
        found.ok_or(BlotdexError::FingerprintNotFound { blot })
    }

    /// Location of document `docid`, without its data.
    #[must_use]
    pub fn docid_to_doc(&self, docid: u32) -> Option<Doc> {
        let meta = self.dmd.lookup(docid)?;
        let path = self.fnames.abs(meta.file_id)?;
        Some(Doc::with_range(path, meta.start, meta.end))
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        let num_posts: u64 = self.shards.iter().map(ShardReader::num_posts).sum();
        let num_blots: u64 = self.shards.iter().map(ShardReader::num_blots).sum();
        let blot_mean = if num_blots == 0 {
            0.0
        } else {
            num_posts as f64 / num_blots as f64
        };
        let sos: f64 = self.shards.iter().map(|s| s.sos_diffs(blot_mean)).sum();
        let blot_sigma = if num_blots == 0 {
            0.0
        } else {
            (sos / num_blots as f64).sqrt()
        };
        Stats {
            root: self.config.index_root.clone(),
            num_docs: self.dmd.num_docs(),
            num_paths: self.fnames.len() as u64,
            num_posts,
            num_blots,
            blot_mean,
            blot_sigma,
        }
    }

    #[must_use]
    pub fn start_query(&self) -> Query<'_> {
        Query::new(self)
    }

    /// Resolves the documents on `state`'s chain into `dst`, up to its limit.
    pub(crate) fn collect_docs(&self, state: &mut ReadState<'_>, dst: &mut Blot) -> Result<usize> {
        dst.reset();
        while !dst.is_full() {
            let Some(docid) = state.next_docid()? else {
                break;
            };
            if docid == 0 {
                continue;
            }
            let doc = self
                .docid_to_doc(docid)
                .ok_or(BlotdexError::MissingDocument { docid })?;
            dst.docs.push(doc);
        }
        Ok(dst.len())
    }
}
