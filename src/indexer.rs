//! Write side of an index: creation, append and ingestion.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use atomic_write_file::AtomicWriteFile;

use crate::config::{self, Config};
use crate::error::{BlotdexError, Result};
use crate::io::doc_meta::DocMetaWriter;
use crate::io::path_tree::PathTree;
use crate::lock::{FileLock, LockMode};
use crate::shard::ShardWriter;
use crate::shatter::{ShardHandle, Sequencer, ShatterPool};
use crate::types::Doc;

/// Adds documents to an index. Holds the index lock exclusively.
///
/// [`Indexer::add`] returns as soon as the document is queued; posts reach
/// disk by the time [`Indexer::close`] returns.
pub struct Indexer {
    config: Config,
    fnames: PathTree,
    dmd: DocMetaWriter,
    pool: ShatterPool,
    sequencer: Arc<Sequencer>,
    shards: Vec<JoinHandle<ShardWriter>>,
    _lock: FileLock,
}

impl Indexer {
    /// Creates a new index at `config.index_root`, which must not exist.
    pub fn create(config: Config) -> Result<Self> {
        config.validate()?;
        let lock = FileLock::open_and_lock(&config.lock_path(), LockMode::Exclusive)?;
        match std::fs::create_dir(&config.index_root) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BlotdexError::IndexExists(config.index_root.clone()));
            }
            Err(err) => return Err(err.into()),
        }
        let fnames = PathTree::new();
        config.write()?;
        write_path_tree(&config, &fnames)?;

        let mut writers = Vec::with_capacity(config.num_shards);
        for i in 0..config.num_shards {
            writers.push(ShardWriter::create(i as u32, &config.post_path(i))?);
        }
        let dmd = DocMetaWriter::open(config.dmd_path(), config.doc_flush_rate)?;
        tracing::info!(
            index.root = %config.index_root.display(),
            index.shards = config.num_shards,
            index.seq_len = config.seq_len,
            "created index"
        );
        Self::start(config, fnames, dmd, writers, lock)
    }

    pub fn create_at(root: impl AsRef<Path>, num_shards: usize, seq_len: usize) -> Result<Self> {
        Self::create(Config::new(root, num_shards, seq_len)?)
    }

    /// Reopens an existing index so more documents can be appended.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::path::absolute(root.as_ref())?;
        let lock = FileLock::open_and_lock(&config::lock_path(&root), LockMode::Exclusive)?;
        let config = Config::read(&root)?;
        let fnames = PathTree::read_from(&mut BufReader::new(File::open(config.fnames_path())?))?;
        let dmd = DocMetaWriter::open(config.dmd_path(), config.doc_flush_rate)?;
        let mut writers = Vec::with_capacity(config.num_shards);
        for i in 0..config.num_shards {
            let writer = ShardWriter::open_append(i as u32, &config.post_path(i)).map_err(|err| {
                BlotdexError::ShardOpen {
                    shard: i as u32,
                    source: Box::new(err),
                }
            })?;
            writers.push(writer);
        }
        tracing::info!(
            index.root = %config.index_root.display(),
            index.last_docid = dmd.last(),
            "opened index for append"
        );
        Self::start(config, fnames, dmd, writers, lock)
    }

    fn start(
        config: Config,
        fnames: PathTree,
        dmd: DocMetaWriter,
        writers: Vec<ShardWriter>,
        lock: FileLock,
    ) -> Result<Self> {
        let mut handles = Vec::with_capacity(writers.len());
        let mut shards = Vec::with_capacity(writers.len());
        for mut writer in writers {
            let (batches, batch_rx) = crossbeam_channel::bounded(0);
            let (ack_tx, acks) = crossbeam_channel::bounded(0);
            let shard = thread::Builder::new()
                .name(format!("blotdex-shard-{}", writer.id()))
                .spawn(move || {
                    writer.serve(&batch_rx, &ack_tx);
                    writer
                })?;
            handles.push(ShardHandle { batches, acks });
            shards.push(shard);
        }
        let sequencer = Arc::new(Sequencer::new(dmd.last(), handles));
        let pool = ShatterPool::start(
            config.num_shatters,
            config.num_shards,
            config.token.build()?,
            &config.blot,
            Arc::clone(&sequencer),
        )?;
        Ok(Self {
            config,
            fnames,
            dmd,
            pool,
            sequencer,
            shards,
            _lock: lock,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers `doc` and queues it for indexing, returning its docid.
    ///
    /// A document without loaded data is read from its path first; an empty
    /// body is indexed as given.
    pub fn add(&mut self, mut doc: Doc) -> Result<u32> {
        if !doc.is_loaded() {
            doc.load()?;
        }
        let Doc {
            path,
            start,
            end,
            data,
        } = doc;
        let file_id = self.fnames.add_path(&path)?;
        let docid = self.dmd.add(file_id, start, end)?;
        self.pool.submit(docid, start, data.unwrap_or_default())?;
        Ok(docid)
    }

    /// Waits for queued documents, then persists everything. The first
    /// error is returned; later ones are logged.
    pub fn close(self) -> Result<()> {
        let Self {
            config,
            fnames,
            dmd,
            pool,
            sequencer,
            shards,
            _lock,
        } = self;
        let mut first: Option<BlotdexError> = None;
        let mut keep = |res: Result<()>| {
            if let Err(err) = res {
                if first.is_none() {
                    first = Some(err);
                } else {
                    tracing::warn!(error = %err, "dropping index close error");
                }
            }
        };

        keep(pool.join());
        keep(sequencer.close());
        drop(sequencer);

        let mut writers = Vec::with_capacity(shards.len());
        for (i, shard) in shards.into_iter().enumerate() {
            match shard.join() {
                Ok(writer) => writers.push(writer),
                Err(_) => keep(Err(BlotdexError::WorkerPanic(format!(
                    "shard {i} writer panicked"
                )))),
            }
        }

        keep(config.write());
        keep(write_path_tree(&config, &fnames));
        keep(dmd.close());

        let closed: Vec<Result<()>> = thread::scope(|scope| {
            let closing: Vec<_> = writers
                .into_iter()
                .map(|writer| {
                    let shard = writer.id();
                    scope.spawn(move || {
                        writer.close().map_err(|err| BlotdexError::ShardClose {
                            shard,
                            source: Box::new(err),
                        })
                    })
                })
                .collect();
            closing
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(BlotdexError::WorkerPanic("shard close panicked".into()))
                    })
                })
                .collect()
        });
        for res in closed {
            keep(res);
        }

        tracing::info!(index.root = %config.index_root.display(), "closed indexer");
        first.map_or(Ok(()), Err)
    }
}

fn write_path_tree(config: &Config, fnames: &PathTree) -> Result<()> {
    let mut file = AtomicWriteFile::options().open(config.fnames_path())?;
    let mut writer = BufWriter::new(&mut file);
    fnames.write_to(&mut writer)?;
    writer.flush()?;
    drop(writer);
    file.commit()?;
    Ok(())
}
