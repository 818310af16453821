use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by index creation, ingestion and queries.
#[derive(Debug, Error)]
pub enum BlotdexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("decode error at offset {offset}: {reason}")]
    Decode { offset: u64, reason: String },

    #[error("corrupt shard directory {}: {reason}", path.display())]
    CorruptDirectory { path: PathBuf, reason: String },

    #[error("corrupt path tree: {reason}")]
    CorruptPathTree { reason: String },

    #[error("post for docid {docid} arrived after docid {current} on subfingerprint {sub:#06x}")]
    OutOfOrderPost { sub: u16, docid: u32, current: u32 },

    #[error("lock error: {0}")]
    Lock(String),

    #[error("index already exists at {}", .0.display())]
    IndexExists(PathBuf),

    #[error("path cannot be interned: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("shard {shard} is no longer accepting posts")]
    ShardUnavailable { shard: u32 },

    #[error("fingerprint {blot:#x} not found in document")]
    FingerprintNotFound { blot: u32 },

    #[error("shard {shard} failed to open: {source}")]
    ShardOpen {
        shard: u32,
        #[source]
        source: Box<BlotdexError>,
    },

    #[error("docid {docid} has no metadata record")]
    MissingDocument { docid: u32 },

    #[error("shard {shard} failed to close: {source}")]
    ShardClose {
        shard: u32,
        #[source]
        source: Box<BlotdexError>,
    },

    #[error("worker thread panicked: {0}")]
    WorkerPanic(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BlotdexError>;

impl BlotdexError {
    pub(crate) fn decode(offset: u64, reason: impl Into<String>) -> Self {
        Self::Decode {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether the error indicates on-disk corruption rather than an
    /// environmental failure.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::Decode { .. }
            | Self::CorruptDirectory { .. }
            | Self::CorruptPathTree { .. }
            | Self::MissingDocument { .. } => true,
            Self::ShardOpen { source, .. } | Self::ShardClose { source, .. } => {
                source.is_corruption()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_mentions_offset() {
        let err = BlotdexError::decode(42, "misaligned block");
        assert_eq!(err.to_string(), "decode error at offset 42: misaligned block");
        assert!(err.is_corruption());
    }

    #[test]
    fn shard_close_keeps_source() {
        let err = BlotdexError::ShardClose {
            shard: 3,
            source: Box::new(BlotdexError::Lock("busy".into())),
        };
        assert!(err.to_string().contains("shard 3"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_corruption());
    }
}
