//! Query cursors over an opened [`Index`].

use crate::constants::SUBFINGERPRINTS;
use crate::error::Result;
use crate::index::Index;
use crate::shard::ReadState;
use crate::types::Blot;

/// Ranked scan position: one cursor per shard and the shard to visit next.
///
/// A shard's cursor is `None` once it has no fingerprint left that occurs
/// in more than one document.
#[derive(Debug, Clone)]
pub struct QueryState<'a> {
    shards: Vec<Option<ReadState<'a>>>,
    i: usize,
}

impl<'a> QueryState<'a> {
    fn new(index: &'a Index) -> Self {
        Self {
            shards: index
                .shards()
                .iter()
                .map(|shard| Some(shard.read_state_at(0)))
                .collect(),
            i: 0,
        }
    }

    /// Next shard in round-robin order whose cursor is still live.
    fn next_live(&self) -> Option<usize> {
        let n = self.shards.len();
        (0..n)
            .map(|k| (self.i + k) % n)
            .find(|&shard| self.shards[shard].is_some())
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.shards.iter().all(Option::is_none)
    }
}

pub struct Query<'a> {
    index: &'a Index,
    state: QueryState<'a>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(index: &'a Index) -> Self {
        Self {
            index,
            state: QueryState::new(index),
        }
    }

    #[must_use]
    pub fn state(&self) -> &QueryState<'a> {
        &self.state
    }

    /// Fills `blot.docs` with the documents containing `blot.blot`, up to
    /// `blot.limit`. Returns the number of documents found.
    pub fn get(&mut self, blot: &mut Blot) -> Result<usize> {
        let (shard, sub) = self.index.split_blot(blot.blot);
        let mut state = self.index.shards()[shard as usize].read_state_for(sub);
        self.index.collect_docs(&mut state, blot)
    }

    /// Fills `dst` with the most widely shared fingerprints not yet returned,
    /// taking shards in turn. Returns the number of slots filled; 0 means
    /// the scan is complete.
    ///
    /// Every filled slot consumes one fingerprint, including a slot whose
    /// limit is 0; it comes back with `blot` set and no documents. A failing
    /// fingerprint is not skipped: slots filled before it are returned, and
    /// the error is raised once it is the first fingerprint of a call.
    pub fn next(&mut self, dst: &mut [Blot]) -> Result<usize> {
        let num_shards = self.state.shards.len();
        let mut filled = 0;
        while filled < dst.len() {
            let Some(shard) = self.state.next_live() else {
                break;
            };
            self.state.i = (shard + 1) % num_shards;
            let Some(mut state) = self.state.shards[shard].take() else {
                continue;
            };
            // Ranks are by descending count, so nothing shared remains.
            if state.total <= 1 {
                continue;
            }
            let reader = &self.index.shards()[shard];
            let slot = &mut dst[filled];
            slot.blot = self.index.join_blot(state.shard, state.sub);
            if let Err(err) = self.index.collect_docs(&mut state, slot) {
                // Leave the scan on this fingerprint so it is not skipped.
                self.state.shards[shard] = Some(reader.read_state_at(state.rank));
                self.state.i = shard;
                if filled > 0 {
                    tracing::debug!(error = %err, "returning filled slots before a failing fingerprint");
                    return Ok(filled);
                }
                return Err(err);
            }
            filled += 1;

            let next_rank = usize::from(state.rank) + 1;
            if next_rank < SUBFINGERPRINTS {
                self.state.shards[shard] = Some(reader.read_state_at(next_rank as u16));
            }
        }
        Ok(filled)
    }
}
