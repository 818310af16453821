//! On-disk codecs: posting chains, shard directories, document metadata and
//! the path tree.

pub mod doc_meta;
pub mod path_tree;
pub mod posting;
pub mod varint;
