/// A `(docid, subfingerprint)` pair packed into a `u64`, docid in the high
/// 32 bits. The low half carries the full in-shard fingerprint; shard
/// writers key on its low 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Post(u64);

impl Post {
    #[must_use]
    pub const fn new(docid: u32, blot: u32) -> Self {
        Self(((docid as u64) << 32) | blot as u64)
    }

    #[must_use]
    pub const fn docid(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[must_use]
    pub const fn blot(self) -> u32 {
        self.0 as u32
    }

    #[must_use]
    pub const fn sub(self) -> u16 {
        self.0 as u16
    }

    #[must_use]
    pub const fn split(self) -> (u32, u32) {
        (self.docid(), self.blot())
    }
}

/// Splits a fingerprint into `(shard, subfingerprint)`.
///
/// Fingerprints are first reduced to the index's fingerprint space of
/// `num_shards * 65536` values.
#[must_use]
pub fn split_blot(blot: u32, num_shards: u32) -> (u32, u16) {
    let space = u64::from(num_shards) << 16;
    let global = (u64::from(blot) % space) as u32;
    (global % num_shards, (global / num_shards) as u16)
}

/// Inverse of [`split_blot`] on the fingerprint space.
#[must_use]
pub fn join_blot(shard: u32, sub: u16, num_shards: u32) -> u32 {
    u32::from(sub) * num_shards + shard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_agree_on_the_fingerprint_space() {
        for num_shards in [1u32, 2, 7, 64] {
            for blot in [0u32, 1, 65_535, 0xdead_beef, u32::MAX] {
                let (shard, sub) = split_blot(blot, num_shards);
                assert!(shard < num_shards);
                let joined = join_blot(shard, sub, num_shards);
                assert_eq!(u64::from(joined), u64::from(blot) % (u64::from(num_shards) << 16));
                assert_eq!(split_blot(joined, num_shards), (shard, sub));
            }
        }
    }

    #[test]
    fn docid_occupies_high_half() {
        let post = Post::new(7, 0x0001_beef);
        assert_eq!(post.split(), (7, 0x0001_beef));
        assert_eq!(post.sub(), 0xbeef);
        assert!(Post::new(2, 0) > Post::new(1, u32::MAX));
    }
}
