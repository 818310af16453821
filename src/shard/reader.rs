use std::cmp::Reverse;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::config::directory_path;
use crate::constants::SUBFINGERPRINTS;
use crate::error::Result;
use crate::io::posting::Posts;

use super::read_directory;

/// Read-only view of one shard: its directory plus the mapped posting file.
#[derive(Debug)]
pub struct ShardReader {
    id: u32,
    heads: Vec<i64>,
    counts: Vec<u32>,
    /// Subfingerprints by descending count, ties by subfingerprint.
    perm: Vec<u16>,
    /// Inverse of `perm`.
    ranks: Vec<u16>,
    map: Option<Mmap>,
}

impl ShardReader {
    pub fn open(id: u32, path: &Path) -> Result<Self> {
        let entries = read_directory(&directory_path(path))?;
        let heads: Vec<i64> = entries.iter().map(|e| e.head).collect();
        let counts: Vec<u32> = entries.iter().map(|e| e.total).collect();

        let mut perm: Vec<u16> = (0..SUBFINGERPRINTS).map(|sub| sub as u16).collect();
        perm.sort_by_key(|&sub| Reverse(counts[usize::from(sub)]));
        let mut ranks = vec![0u16; SUBFINGERPRINTS];
        for (rank, &sub) in perm.iter().enumerate() {
            ranks[usize::from(sub)] = rank as u16;
        }

        let file = File::open(path)?;
        let map = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: posting files are append-only and the shared index
            // lock keeps writers out while the map is alive.
            Some(unsafe { Mmap::map(&file)? })
        };
        tracing::debug!(shard.id = id, shard.path = %path.display(), "opened shard");
        Ok(Self {
            id,
            heads,
            counts,
            perm,
            ranks,
            map,
        })
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    fn data(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Cursor over the subfingerprint at `rank` in descending-count order.
    #[must_use]
    pub fn read_state_at(&self, rank: u16) -> ReadState<'_> {
        self.read_state(self.sub_at(rank), rank)
    }

    #[must_use]
    pub fn read_state_for(&self, sub: u16) -> ReadState<'_> {
        self.read_state(sub, self.rank_of(sub))
    }

    fn read_state(&self, sub: u16, rank: u16) -> ReadState<'_> {
        ReadState {
            shard: self.id,
            sub,
            rank,
            total: self.count(sub),
            posts: Posts::new(self.heads[usize::from(sub)]),
            data: self.data(),
        }
    }

    #[must_use]
    pub fn sub_at(&self, rank: u16) -> u16 {
        self.perm[usize::from(rank)]
    }

    #[must_use]
    pub fn rank_of(&self, sub: u16) -> u16 {
        self.ranks[usize::from(sub)]
    }

    #[must_use]
    pub fn count(&self, sub: u16) -> u32 {
        self.counts[usize::from(sub)]
    }

    #[must_use]
    pub fn num_posts(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Size of the shard's fingerprint space, occupied or not.
    #[must_use]
    pub fn num_blots(&self) -> u64 {
        SUBFINGERPRINTS as u64
    }

    /// Sum of squared differences between each subfingerprint's count and
    /// `mean`.
    #[must_use]
    pub fn sos_diffs(&self, mean: f64) -> f64 {
        self.counts
            .iter()
            .map(|&c| {
                let d = mean - f64::from(c);
                d * d
            })
            .sum()
    }
}

/// Position of a reader on one subfingerprint's posting chain.
#[derive(Debug, Clone)]
pub struct ReadState<'a> {
    pub shard: u32,
    pub sub: u16,
    pub rank: u16,
    /// Number of documents on the chain.
    pub total: u32,
    posts: Posts,
    data: &'a [u8],
}

impl ReadState<'_> {
    /// Next docid on the chain, in ascending order.
    pub fn next_docid(&mut self) -> Result<Option<u32>> {
        self.posts.next(self.data)
    }
}
