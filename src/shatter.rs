//! Parallel tokenize-and-blot workers feeding the shard writers.
//!
//! Workers finish documents in any order; the [`Sequencer`] releases each
//! document's posts to the shards strictly in docid order, so every shard
//! writer sees non-decreasing docids.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::blotter::{BlotConfig, Blotter};
use crate::error::{BlotdexError, Result};
use crate::token::{self, Token, Tokenizer};
use crate::types::{Post, split_blot};

/// Work item for the shatter pool.
#[derive(Debug)]
pub enum ShatterRequest {
    Document { docid: u32, offset: u32, data: Vec<u8> },
    Shutdown,
}

/// Sending half of one shard writer's batch channel, with its acks.
#[derive(Debug)]
pub struct ShardHandle {
    pub batches: Sender<Vec<Post>>,
    pub acks: Receiver<()>,
}

#[derive(Debug)]
struct Delivery {
    last: u32,
    shards: Vec<ShardHandle>,
}

/// Releases per-document batches to the shards in docid order.
#[derive(Debug)]
pub struct Sequencer {
    delivery: Mutex<Delivery>,
    turn: Condvar,
}

impl Sequencer {
    /// `last` is the docid delivered most recently; the next delivery must
    /// be `last + 1`.
    #[must_use]
    pub fn new(last: u32, shards: Vec<ShardHandle>) -> Self {
        Self {
            delivery: Mutex::new(Delivery { last, shards }),
            turn: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Delivery>> {
        self.delivery
            .lock()
            .map_err(|_| BlotdexError::WorkerPanic("sequencer lock poisoned".into()))
    }

    /// Blocks until every earlier docid has been delivered, then hands each
    /// non-empty batch to its shard and waits for all of them to be
    /// acknowledged. `batches[i]` goes to shard `i`.
    pub fn deliver(&self, docid: u32, batches: Vec<Vec<Post>>) -> Result<()> {
        let mut delivery = self.lock()?;
        while delivery.last.wrapping_add(1) != docid {
            delivery = self
                .turn
                .wait(delivery)
                .map_err(|_| BlotdexError::WorkerPanic("sequencer lock poisoned".into()))?;
        }
        let res = Self::hand_off(&delivery.shards, batches);
        // Advance even on failure so later documents are not stuck behind
        // this one.
        delivery.last = docid;
        drop(delivery);
        self.turn.notify_all();
        res
    }

    fn hand_off(shards: &[ShardHandle], batches: Vec<Vec<Post>>) -> Result<()> {
        let mut res = Ok(());
        let mut sent = Vec::with_capacity(shards.len());
        for (shard, batch) in batches.into_iter().enumerate() {
            if batch.is_empty() {
                continue;
            }
            match shards.get(shard) {
                Some(handle) if handle.batches.send(batch).is_ok() => sent.push(shard),
                _ => {
                    res = res.and(Err(BlotdexError::ShardUnavailable {
                        shard: shard as u32,
                    }));
                }
            }
        }
        // Every accepted batch is acknowledged, even after a failure, so no
        // shard is left blocked on its ack.
        for shard in sent {
            if shards[shard].acks.recv().is_err() {
                res = res.and(Err(BlotdexError::ShardUnavailable {
                    shard: shard as u32,
                }));
            }
        }
        res
    }

    /// Drops the shard channels, ending the shard writers' loops.
    pub fn close(&self) -> Result<()> {
        self.lock()?.shards.clear();
        Ok(())
    }
}

/// Splits a document's fingerprints into per-shard posts.
fn shatter(
    tokenizer: &dyn Tokenizer,
    blotter: &mut dyn Blotter,
    num_shards: u32,
    docid: u32,
    offset: u32,
    data: &[u8],
) -> Vec<Vec<Post>> {
    let mut batches = vec![Vec::new(); num_shards as usize];
    let words = token::words(tokenizer, data, offset);
    for_each_blot(blotter, &words, |_, blot| {
        let (shard, sub) = split_blot(blot, num_shards);
        batches[shard as usize].push(Post::new(docid, u32::from(sub)));
    });
    batches
}

/// Feeds `words` to `blotter` and calls `emit(i, blot)` for every word `i`
/// that completes a full window.
pub(crate) fn for_each_blot(
    blotter: &mut dyn Blotter,
    words: &[Token<'_>],
    mut emit: impl FnMut(usize, u32),
) {
    let window = blotter.window();
    for (i, word) in words.iter().enumerate() {
        let blot = blotter.blot(word.lit);
        if i + 1 >= window {
            emit(i, blot);
        }
    }
}

/// Fixed-size pool of shatter workers behind a rendezvous request queue.
#[derive(Debug)]
pub struct ShatterPool {
    requests: Sender<ShatterRequest>,
    workers: Vec<JoinHandle<Result<()>>>,
}

impl ShatterPool {
    pub fn start(
        num_workers: usize,
        num_shards: usize,
        tokenizer: Arc<dyn Tokenizer>,
        blot: &BlotConfig,
        sequencer: Arc<Sequencer>,
    ) -> Result<Self> {
        let (requests, queue) = crossbeam_channel::bounded(0);
        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let worker = Worker {
                id,
                num_shards: num_shards as u32,
                tokenizer: Arc::clone(&tokenizer),
                blotter: blot.build()?,
                sequencer: Arc::clone(&sequencer),
            };
            let queue = queue.clone();
            let handle = thread::Builder::new()
                .name(format!("blotdex-shatter-{id}"))
                .spawn(move || worker.run(&queue))?;
            workers.push(handle);
        }
        tracing::debug!(shatter.workers = num_workers, "started shatter pool");
        Ok(Self { requests, workers })
    }

    /// Queues a document, blocking until a worker takes it.
    pub fn submit(&self, docid: u32, offset: u32, data: Vec<u8>) -> Result<()> {
        self.requests
            .send(ShatterRequest::Document {
                docid,
                offset,
                data,
            })
            .map_err(|_| BlotdexError::WorkerPanic("all shatter workers exited".into()))
    }

    /// Stops every worker after in-flight documents are delivered and
    /// returns the first worker error.
    pub fn join(self) -> Result<()> {
        for _ in 0..self.workers.len() {
            // A worker that already exited leaves its shutdown unread.
            if self.requests.send(ShatterRequest::Shutdown).is_err() {
                break;
            }
        }
        drop(self.requests);
        let mut first = None;
        for handle in self.workers {
            let res = handle
                .join()
                .map_err(|_| BlotdexError::WorkerPanic("shatter worker panicked".into()))
                .and_then(|res| res);
            if let Err(err) = res {
                if first.is_none() {
                    first = Some(err);
                } else {
                    tracing::warn!(error = %err, "dropping shatter worker error");
                }
            }
        }
        first.map_or(Ok(()), Err)
    }
}

struct Worker {
    id: usize,
    num_shards: u32,
    tokenizer: Arc<dyn Tokenizer>,
    blotter: Box<dyn Blotter>,
    sequencer: Arc<Sequencer>,
}

impl Worker {
    fn run(mut self, queue: &Receiver<ShatterRequest>) -> Result<()> {
        let mut first = None;
        for request in queue {
            let (docid, offset, data) = match request {
                ShatterRequest::Document {
                    docid,
                    offset,
                    data,
                } => (docid, offset, data),
                ShatterRequest::Shutdown => break,
            };
            let batches = shatter(
                self.tokenizer.as_ref(),
                self.blotter.as_mut(),
                self.num_shards,
                docid,
                offset,
                &data,
            );
            tracing::debug!(
                shatter.worker = self.id,
                doc.id = docid,
                doc.posts = batches.iter().map(Vec::len).sum::<usize>(),
                "shattered document"
            );
            if let Err(err) = self.sequencer.deliver(docid, batches) {
                tracing::error!(shatter.worker = self.id, doc.id = docid, error = %err, "delivery failed");
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blotter::Circ;
    use crate::token::SimpleWords;
    use std::time::Duration;

    fn fake_shards(n: usize) -> (Vec<ShardHandle>, Vec<JoinHandle<Vec<u32>>>) {
        let mut handles = Vec::new();
        let mut consumers = Vec::new();
        for _ in 0..n {
            let (batches, batch_rx) = crossbeam_channel::bounded::<Vec<Post>>(0);
            let (ack_tx, acks) = crossbeam_channel::bounded(0);
            handles.push(ShardHandle { batches, acks });
            consumers.push(thread::spawn(move || {
                let mut seen = Vec::new();
                for batch in &batch_rx {
                    seen.extend(batch.iter().map(|p| p.docid()));
                    thread::sleep(Duration::from_micros(fastrand::u64(0..300)));
                    ack_tx.send(()).unwrap();
                }
                seen
            }));
        }
        (handles, consumers)
    }

    #[test]
    fn deliveries_reach_shards_in_docid_order() {
        let (handles, consumers) = fake_shards(3);
        let sequencer = Arc::new(Sequencer::new(0, handles));

        let mut docids: Vec<u32> = (1..=60).collect();
        fastrand::shuffle(&mut docids);
        let producers: Vec<_> = docids
            .chunks(6)
            .map(|chunk| {
                let mut chunk = chunk.to_vec();
                chunk.sort_unstable();
                let sequencer = Arc::clone(&sequencer);
                thread::spawn(move || {
                    for docid in chunk {
                        thread::sleep(Duration::from_micros(fastrand::u64(0..500)));
                        let mut batches = vec![Vec::new(); 3];
                        for shard in 0..3 {
                            if fastrand::bool() {
                                batches[shard].push(Post::new(docid, shard as u32));
                            }
                        }
                        sequencer.deliver(docid, batches).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        sequencer.close().unwrap();
        for consumer in consumers {
            let seen = consumer.join().unwrap();
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
        }
    }

    #[test]
    fn shatter_buckets_posts_by_shard() {
        let text = b"one two three four five six seven eight nine ten eleven";
        let mut blotter = Circ::new(10);
        let batches = shatter(&SimpleWords, &mut blotter, 4, 9, 0, text);
        let posts: Vec<Post> = batches.iter().flatten().copied().collect();
        // 11 words, window of 10: two fingerprints.
        assert_eq!(posts.len(), 2);
        assert_eq!(batches.len(), 4);
        assert!(posts.iter().all(|p| p.docid() == 9 && p.blot() < 1 << 16));

        let mut short = Circ::new(10);
        let line = b"only nine words are in this short line here";
        let none = shatter(&SimpleWords, &mut short, 4, 1, 0, line);
        assert!(none.iter().all(Vec::is_empty));
    }

    #[test]
    fn pool_delivers_every_document() {
        let (handles, consumers) = fake_shards(2);
        let sequencer = Arc::new(Sequencer::new(0, handles));
        let pool = ShatterPool::start(
            3,
            2,
            Arc::new(SimpleWords),
            &BlotConfig {
                seq_len: 2,
                interleave: 1,
            },
            Arc::clone(&sequencer),
        )
        .unwrap();
        for docid in 1..=40u32 {
            let body = format!("doc {docid} has a few words in it");
            pool.submit(docid, 0, body.into_bytes()).unwrap();
        }
        pool.join().unwrap();
        sequencer.close().unwrap();

        let mut delivered = Vec::new();
        for consumer in consumers {
            let seen = consumer.join().unwrap();
            assert!(seen.windows(2).all(|w| w[0] <= w[1]));
            delivered.extend(seen);
        }
        delivered.sort_unstable();
        delivered.dedup();
        assert_eq!(delivered, (1..=40).collect::<Vec<_>>());
    }
}
