//! Ranked scans with `Query::next` and ordering under concurrent indexing.

use std::path::Path;

use blotdex::{Blot, Config, Doc, Index, Indexer, Post, ShardWriter};
use tempfile::TempDir;

/// Builds a single-shard index of `num_docs` documents too short to produce
/// fingerprints, then replaces its shard with hand-written posts.
fn index_with_posts(dir: &Path, num_docs: u32, posts: &[(u32, u16)]) -> Config {
    let root = dir.join("idx");
    let mut indexer = Indexer::create_at(&root, 1, 10).unwrap();
    for i in 0..num_docs {
        indexer
            .add(Doc::new(dir.join(format!("d{i}")), b"too short".to_vec()))
            .unwrap();
    }
    let config = indexer.config().clone();
    indexer.close().unwrap();

    let mut writer = ShardWriter::create(0, &config.post_path(0)).unwrap();
    let mut sorted = posts.to_vec();
    sorted.sort_unstable();
    for (docid, sub) in sorted {
        writer.add_posts(&[Post::new(docid, u32::from(sub))]).unwrap();
    }
    writer.close().unwrap();
    config
}

#[test]
fn next_returns_shared_fingerprints_by_descending_count() {
    let dir = TempDir::new().unwrap();
    let mut posts = Vec::new();
    posts.extend((1..=5).map(|d| (d, 0x10)));
    posts.push((2, 0x20));
    posts.extend((3..=5).map(|d| (d, 0x30)));
    index_with_posts(dir.path(), 5, &posts);

    let index = Index::open(dir.path().join("idx")).unwrap();
    let mut query = index.start_query();
    let mut slots = vec![Blot::default(); 4];

    let n = query.next(&mut slots).unwrap();
    assert_eq!(n, 2);
    assert_eq!(slots[0].blot, 0x10);
    assert_eq!(slots[0].len(), 5);
    assert_eq!(slots[1].blot, 0x30);
    assert_eq!(slots[1].len(), 3);
    let third = &slots[1].docs[0];
    assert_eq!(third.path, std::path::absolute(dir.path().join("d2")).unwrap());

    assert_eq!(query.next(&mut slots).unwrap(), 0);
    assert!(query.state().is_exhausted());
}

#[test]
fn next_respects_slot_count_and_limits() {
    let dir = TempDir::new().unwrap();
    let mut posts = Vec::new();
    for (sub, docs) in [(1u16, 6u32), (2, 4), (3, 2), (4, 5)] {
        posts.extend((1..=docs).map(|d| (d, sub)));
    }
    index_with_posts(dir.path(), 6, &posts);

    let index = Index::open(dir.path().join("idx")).unwrap();
    let mut query = index.start_query();
    let mut slot = [Blot::with_limit(0, 2)];
    let mut seen = Vec::new();
    while query.next(&mut slot).unwrap() == 1 {
        assert!(slot[0].len() <= 2);
        seen.push(slot[0].blot);
    }
    assert_eq!(seen, vec![1, 4, 2, 3]);
}

#[test]
fn concurrent_shatters_keep_chains_ordered() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("idx");
    let config = Config::new(&root, 3, 3).unwrap().with_num_shatters(6);
    let mut indexer = Indexer::create(config).unwrap();

    let common = "every document opens with this line";
    let total = 300u32;
    for i in 0..total {
        // Uneven lengths make workers finish out of submission order.
        let filler = "word ".repeat(fastrand::usize(0..400));
        let body = format!("{common} {filler} doc{i}");
        indexer
            .add(Doc::new(dir.path().join(format!("{i}.txt")), body.into_bytes()))
            .unwrap();
    }
    indexer.close().unwrap();

    let index = Index::open(&root).unwrap();
    let mut probe = Doc::new(dir.path().join("probe"), common.as_bytes().to_vec());
    let blots = index.blot_doc(&mut probe).unwrap();
    let mut query = index.start_query();
    for blot in blots {
        let mut slot = Blot::new(blot);
        assert_eq!(query.get(&mut slot).unwrap(), total as usize);
        let ids: Vec<String> = slot
            .docs
            .iter()
            .map(|d| d.path.file_stem().unwrap().to_string_lossy().into_owned())
            .collect();
        let expected: Vec<String> = (0..total).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    let mut slots = vec![Blot::default(); 8];
    let n = query.next(&mut slots).unwrap();
    assert!(n > 0);
    assert!(slots[..n].iter().all(|b| b.len() > 1));
}

#[test]
fn zero_limit_slot_takes_a_fingerprint_without_documents() {
    let dir = TempDir::new().unwrap();
    let mut posts: Vec<(u32, u16)> = (1..=4).map(|d| (d, 0x10)).collect();
    posts.extend((1..=2).map(|d| (d, 0x11)));
    index_with_posts(dir.path(), 4, &posts);

    let index = Index::open(dir.path().join("idx")).unwrap();
    let mut query = index.start_query();
    let mut slot = [Blot::with_limit(0, 0)];
    assert_eq!(query.next(&mut slot).unwrap(), 1);
    assert_eq!(slot[0].blot, 0x10);
    assert!(slot[0].docs.is_empty());
    assert_eq!(query.next(&mut slot).unwrap(), 1);
    assert_eq!(slot[0].blot, 0x11);
}

#[test]
fn corrupt_chain_stops_the_scan_without_skipping() {
    let dir = TempDir::new().unwrap();
    let mut posts: Vec<(u32, u16)> = (1..=5).map(|d| (d, 0x10)).collect();
    posts.extend((3..=5).map(|d| (d, 0x30)));
    let config = index_with_posts(dir.path(), 5, &posts);

    // The 0x30 chain is the last block in the file.
    let pos = config.post_path(0);
    let bytes = std::fs::read(&pos).unwrap();
    std::fs::write(&pos, &bytes[..bytes.len() - 3]).unwrap();

    let index = Index::open(dir.path().join("idx")).unwrap();
    let mut query = index.start_query();
    let mut slots = vec![Blot::default(); 2];
    assert_eq!(query.next(&mut slots).unwrap(), 1);
    assert_eq!(slots[0].blot, 0x10);
    assert_eq!(slots[0].len(), 5);

    for _ in 0..2 {
        let err = query.next(&mut slots).unwrap_err();
        assert!(err.is_corruption());
        assert!(!query.state().is_exhausted());
    }
}
