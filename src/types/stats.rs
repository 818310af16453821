use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Aggregate counts over an opened index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub root: PathBuf,
    pub num_docs: u64,
    pub num_paths: u64,
    pub num_posts: u64,
    pub num_blots: u64,
    /// Mean number of documents per fingerprint.
    pub blot_mean: f64,
    /// Standard deviation of documents per fingerprint.
    pub blot_sigma: f64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "blotdex index at {}:", self.root.display())?;
        writeln!(f, "\t- {} docs", self.num_docs)?;
        writeln!(f, "\t- {} nodes in path tree", self.num_paths)?;
        writeln!(f, "\t- {} posts", self.num_posts)?;
        writeln!(f, "\t- {} blots", self.num_blots)?;
        writeln!(f, "\t- {:.2} mean docs per blot", self.blot_mean)?;
        writeln!(f, "\t- {:.2} sigma (std deviation)", self.blot_sigma)
    }
}
