use serde::{Deserialize, Serialize};

use super::doc::Doc;

/// One query result slot: a fingerprint and the documents it occurs in.
///
/// `limit` caps how many documents a query resolves into `docs`; `None`
/// resolves all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blot {
    pub blot: u32,
    pub docs: Vec<Doc>,
    #[serde(skip)]
    pub limit: Option<usize>,
}

impl Blot {
    #[must_use]
    pub fn new(blot: u32) -> Self {
        Self {
            blot,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_limit(blot: u32, limit: usize) -> Self {
        Self {
            blot,
            docs: Vec::with_capacity(limit),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.docs.len() >= limit)
    }

    /// Clears results, keeping the limit, so the slot can be reused.
    pub fn reset(&mut self) {
        self.docs.clear();
    }
}
