//! Public value types exposed by the `blotdex` crate.

pub mod blot;
pub mod doc;
pub mod post;
pub mod stats;

pub use blot::Blot;
pub use doc::Doc;
pub use post::{Post, join_blot, split_blot};
pub use stats::Stats;
