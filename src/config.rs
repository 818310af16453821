//! Index configuration persisted as `cfg.json` in the index root.

use std::io::Write;
use std::path::{Path, PathBuf};

use atomic_write_file::AtomicWriteFile;
use serde::{Deserialize, Serialize};

use crate::blotter::BlotConfig;
use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_DOC_FLUSH_RATE, DEFAULT_NUM_SHARDS, DEFAULT_NUM_SHATTERS,
    DEFAULT_SEQ_LEN, DIRECTORY_SUFFIX, DOC_META_FILE_NAME, LOCK_SUFFIX, PATH_TREE_FILE_NAME,
};
use crate::error::{BlotdexError, Result};
use crate::token::TokenConfig;

fn default_seq_len() -> usize {
    DEFAULT_SEQ_LEN
}

fn default_num_shards() -> usize {
    DEFAULT_NUM_SHARDS
}

fn default_num_shatters() -> usize {
    DEFAULT_NUM_SHATTERS
}

fn default_doc_flush_rate() -> usize {
    DEFAULT_DOC_FLUSH_RATE
}

/// Layout and tuning of one index.
///
/// `num_shards` and `seq_len` are fixed when the index is created; reopening
/// for append or for queries always uses the stored values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub index_root: PathBuf,
    #[serde(default = "default_seq_len")]
    pub seq_len: usize,
    #[serde(default = "default_num_shards")]
    pub num_shards: usize,
    /// Tokenize-and-blot worker threads used while indexing.
    #[serde(default = "default_num_shatters")]
    pub num_shatters: usize,
    /// Metadata records buffered before they are appended to `dmd`.
    #[serde(default = "default_doc_flush_rate")]
    pub doc_flush_rate: usize,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub blot: BlotConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_root: PathBuf::new(),
            seq_len: default_seq_len(),
            num_shards: default_num_shards(),
            num_shatters: default_num_shatters(),
            doc_flush_rate: default_doc_flush_rate(),
            token: TokenConfig::default(),
            blot: BlotConfig::default(),
        }
    }
}

impl Config {
    /// Configuration for a new index at `root`, made absolute.
    pub fn new(root: impl AsRef<Path>, num_shards: usize, seq_len: usize) -> Result<Self> {
        let index_root = std::path::absolute(root.as_ref())?;
        Ok(Self {
            index_root,
            seq_len,
            num_shards,
            blot: BlotConfig {
                seq_len,
                ..BlotConfig::default()
            },
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_num_shatters(mut self, num_shatters: usize) -> Self {
        self.num_shatters = num_shatters;
        self
    }

    #[must_use]
    pub fn with_tokenizer(mut self, name: impl Into<String>) -> Self {
        self.token.name = name.into();
        self
    }

    #[must_use]
    pub fn with_interleave(mut self, interleave: usize) -> Self {
        self.blot.interleave = interleave;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(BlotdexError::InvalidConfig { reason });
        if self.index_root.as_os_str().is_empty() {
            return invalid("index root is empty".into());
        }
        if self.num_shards == 0 {
            return invalid("num_shards must be > 0".into());
        }
        if self.num_shards > u32::MAX as usize / crate::constants::SUBFINGERPRINTS {
            return invalid(format!("num_shards {} is too large", self.num_shards));
        }
        if self.num_shatters == 0 {
            return invalid("num_shatters must be > 0".into());
        }
        if self.seq_len == 0 {
            return invalid("seq_len must be > 0".into());
        }
        if self.blot.seq_len != self.seq_len {
            return invalid(format!(
                "blot.seq_len {} differs from seq_len {}",
                self.blot.seq_len, self.seq_len
            ));
        }
        self.blot.validate()?;
        self.token.build()?;
        Ok(())
    }

    /// Loads and validates `cfg.json` under `root`.
    pub fn read(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::path::absolute(root.as_ref())?;
        let bytes = std::fs::read(root.join(CONFIG_FILE_NAME))?;
        let mut config: Self = serde_json::from_slice(&bytes)?;
        // A moved index keeps working from its new location.
        config.index_root = root;
        config.validate()?;
        Ok(config)
    }

    /// Writes `cfg.json` atomically.
    pub fn write(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let mut file = AtomicWriteFile::options().open(self.config_path())?;
        file.write_all(&json)?;
        file.write_all(b"\n")?;
        file.commit()?;
        tracing::debug!(config.path = %self.config_path().display(), "wrote index config");
        Ok(())
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.index_root.join(CONFIG_FILE_NAME)
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        lock_path(&self.index_root)
    }

    #[must_use]
    pub fn dmd_path(&self) -> PathBuf {
        self.index_root.join(DOC_META_FILE_NAME)
    }

    #[must_use]
    pub fn fnames_path(&self) -> PathBuf {
        self.index_root.join(PATH_TREE_FILE_NAME)
    }

    #[must_use]
    pub fn post_path(&self, shard: usize) -> PathBuf {
        self.index_root.join(format!("b{shard}.pos"))
    }

    #[must_use]
    pub fn iix_path(&self, shard: usize) -> PathBuf {
        directory_path(&self.post_path(shard))
    }
}

/// Lock file of the index at `root`. It is a sibling of the root, so the
/// lock can be taken before the root exists or its config is read.
#[must_use]
pub fn lock_path(root: &Path) -> PathBuf {
    let mut name = root.as_os_str().to_owned();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// The directory file stored next to a posting file.
#[must_use]
pub fn directory_path(post_path: &Path) -> PathBuf {
    let mut name = post_path.as_os_str().to_owned();
    name.push(DIRECTORY_SUFFIX);
    PathBuf::from(name)
}
