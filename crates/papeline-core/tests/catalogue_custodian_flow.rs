//! Exercises the Shard Catalogue (C1) and Disk Custodian (C4) together: a shard
//! directory with done/failed/pending files, then a sweep that reclaims only what
//! the catalogue says is safe to delete.

use std::fs;

use papeline_core::catalogue::{ShardCatalogue, SortOrder};
use papeline_core::custodian::sweep_once;
use tempfile::TempDir;

#[test]
fn custodian_reclaims_only_done_and_failed_shards() {
    let logs = TempDir::new().unwrap();
    let shards = TempDir::new().unwrap();

    for name in ["a.gz", "b.gz", "c.gz", "d.gz"] {
        fs::write(shards.path().join(name), b"not actually gzip, just bytes").unwrap();
    }

    let mut catalogue = ShardCatalogue::open(logs.path(), "s2orc", "dataset0").unwrap();
    catalogue.mark_done("a.gz").unwrap();
    catalogue.mark_failed("b.gz", "truncated gzip stream").unwrap();

    let pending = catalogue.list_pending(shards.path(), SortOrder::Lexicographic).unwrap();
    let pending_names: Vec<String> = pending
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(pending_names, vec!["c.gz", "d.gz"]);

    // threshold of u64::MAX forces the sweep to run regardless of actual free space.
    let report = sweep_once(shards.path(), shards.path(), &catalogue, u64::MAX).unwrap();
    assert_eq!(report.deleted, 2);

    assert!(!shards.path().join("a.gz").exists());
    assert!(!shards.path().join("b.gz").exists());
    assert!(shards.path().join("c.gz").exists());
    assert!(shards.path().join("d.gz").exists());
}

#[test]
fn catalogue_survives_reopen_across_process_boundary() {
    let logs = TempDir::new().unwrap();
    let shards = TempDir::new().unwrap();
    fs::write(shards.path().join("x.gz"), b"data").unwrap();

    {
        let mut catalogue = ShardCatalogue::open(logs.path(), "papers", "machine0").unwrap();
        catalogue.mark_done("x.gz").unwrap();
    }

    let reopened = ShardCatalogue::open(logs.path(), "papers", "machine0").unwrap();
    assert!(reopened.is_done("x.gz"));
    assert!(reopened.list_pending(shards.path(), SortOrder::Lexicographic).unwrap().is_empty());
}
