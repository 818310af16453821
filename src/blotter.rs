//! Rolling fingerprints ("blots") over windows of consecutive words.
//!
//! A blotter is stateful: words must be fed in document order, and the value
//! returned after each word covers the last `window()` words.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SEQ_LEN;
use crate::error::{BlotdexError, Result};

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

pub trait Blotter: Send {
    fn blot(&mut self, word: &[u8]) -> u32;

    /// Number of words after which a returned blot depends only on the
    /// current document.
    fn window(&self) -> usize;
}

/// FNV-1 over the case-folded word.
fn word_hash(word: &[u8]) -> u32 {
    let fold = |hash: u32, byte: u8| hash.wrapping_mul(FNV32_PRIME) ^ u32::from(byte);
    if word.is_ascii() {
        return word
            .iter()
            .fold(FNV32_OFFSET, |h, b| fold(h, b.to_ascii_lowercase()));
    }
    match std::str::from_utf8(word) {
        Ok(text) => text.to_lowercase().bytes().fold(FNV32_OFFSET, fold),
        Err(_) => word.iter().copied().fold(FNV32_OFFSET, fold),
    }
}

/// XOR of the word hashes in a circular window of `seq_len` words.
#[derive(Debug, Clone)]
pub struct Circ {
    hashes: Vec<u32>,
    hash: u32,
    i: usize,
}

impl Circ {
    #[must_use]
    pub fn new(seq_len: usize) -> Self {
        Self {
            hashes: vec![0; seq_len.max(1)],
            hash: 0,
            i: 0,
        }
    }
}

impl Blotter for Circ {
    fn blot(&mut self, word: &[u8]) -> u32 {
        let h = word_hash(word);
        self.hash ^= self.hashes[self.i] ^ h;
        self.hashes[self.i] = h;
        self.i += 1;
        if self.i == self.hashes.len() {
            self.i = 0;
        }
        self.hash
    }

    fn window(&self) -> usize {
        self.hashes.len()
    }
}

/// `k` circular windows fed round-robin, so each blot covers every k-th word.
#[derive(Debug, Clone)]
pub struct Interleaved {
    circs: Vec<Circ>,
    i: usize,
}

impl Interleaved {
    #[must_use]
    pub fn new(seq_len: usize, interleave: usize) -> Self {
        Self {
            circs: (0..interleave.max(1)).map(|_| Circ::new(seq_len)).collect(),
            i: 0,
        }
    }
}

impl Blotter for Interleaved {
    fn blot(&mut self, word: &[u8]) -> u32 {
        let res = self.circs[self.i].blot(word);
        self.i += 1;
        if self.i == self.circs.len() {
            self.i = 0;
        }
        res
    }

    fn window(&self) -> usize {
        self.circs.len() * self.circs[0].window()
    }
}

fn default_interleave() -> usize {
    1
}

fn default_seq_len() -> usize {
    DEFAULT_SEQ_LEN
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlotConfig {
    #[serde(default = "default_seq_len")]
    pub seq_len: usize,
    #[serde(default = "default_interleave")]
    pub interleave: usize,
}

impl Default for BlotConfig {
    fn default() -> Self {
        Self {
            seq_len: default_seq_len(),
            interleave: default_interleave(),
        }
    }
}

impl BlotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.seq_len == 0 || self.interleave == 0 {
            return Err(BlotdexError::InvalidConfig {
                reason: format!(
                    "blotter needs seq_len and interleave > 0, got {} and {}",
                    self.seq_len, self.interleave
                ),
            });
        }
        Ok(())
    }

    /// A fresh blotter; each worker or document scan owns its own.
    pub fn build(&self) -> Result<Box<dyn Blotter>> {
        self.validate()?;
        if self.interleave == 1 {
            Ok(Box::new(Circ::new(self.seq_len)))
        } else {
            Ok(Box::new(Interleaved::new(self.seq_len, self.interleave)))
        }
    }
}
