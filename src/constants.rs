//! Format constants shared by the writer and reader sides.

/// Number of subfingerprints (directory entries) per shard.
pub const SUBFINGERPRINTS: usize = 1 << 16;

/// A posting buffer is flushed as one block once it reaches this many bytes.
pub const POST_FLUSH_BYTES: usize = 512;

/// Trailing link size of each posting block.
pub const LINK_SIZE: usize = 8;

/// Link value terminating a posting chain, and the head of an empty one.
pub const NO_LINK: i64 = -1;

/// Size of a document-metadata record: `file_id`, `start`, `end` as u32 BE.
pub const DOC_META_RECORD_SIZE: usize = 12;

pub const MAX_VARINT_LEN: usize = 10;

pub const CONFIG_FILE_NAME: &str = "cfg.json";
pub const DOC_META_FILE_NAME: &str = "dmd";
pub const PATH_TREE_FILE_NAME: &str = "files.fnm";
pub const LOCK_SUFFIX: &str = ".lock";
pub const DIRECTORY_SUFFIX: &str = ".iix";

pub const DEFAULT_SEQ_LEN: usize = 10;
pub const DEFAULT_NUM_SHARDS: usize = 2;
pub const DEFAULT_NUM_SHATTERS: usize = 2;
pub const DEFAULT_DOC_FLUSH_RATE: usize = 16_384;
pub const DEFAULT_TOKENIZER: &str = "words.simple";
