#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: internal helpers are self-describing.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Casts: docids, offsets and subfingerprints are bounded by the on-disk
// format (u32 docids, 16-bit subfingerprints, shard counts validated against
// the 32-bit fingerprint space).
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
//
// Style
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::should_implement_trait)] // `Posts::next` takes the mapped bytes
#![allow(clippy::unnecessary_wraps)]

//! Sharded near-duplicate index over word-window fingerprints ("blots").
//!
//! [`Indexer`] tokenizes documents, fingerprints every window of `seq_len`
//! words and appends `(docid, fingerprint)` posts to per-shard posting
//! chains. [`Index`] opens the result read-only; a [`Query`] resolves a
//! fingerprint to the documents sharing it, or walks fingerprints from the
//! most widely shared down.

/// The blotdex crate version (matches `Cargo.toml`).
pub const BLOTDEX_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod blotter;
pub mod config;
pub mod constants;
pub mod error;
pub mod index;
pub mod indexer;
pub mod io;
mod lock;
pub mod query;
pub mod shard;
pub mod shatter;
pub mod token;
pub mod types;

pub use blotter::{BlotConfig, Blotter, Circ, Interleaved};
pub use config::Config;
pub use error::{BlotdexError, Result};
pub use index::Index;
pub use indexer::Indexer;
pub use lock::{FileLock, LockMode};
pub use query::{Query, QueryState};
pub use shard::{ReadState, ShardReader, ShardWriter};
pub use shatter::{Sequencer, ShatterPool, ShatterRequest};
pub use token::{SimpleWords, Tag, Token, TokenConfig, Tokenizer, UnicodeWords};
pub use types::{Blot, Doc, Post, Stats, join_blot, split_blot};
