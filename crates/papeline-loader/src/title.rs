//! Title Loader (C6): the one bulk-load specialisation that persists its shard
//! ledger in SQL (`papers_import_log`) instead of C1's text files, and that
//! deliberately defers the `papers`→`corpusid_mapping_title` primary key until every
//! shard has loaded.
//!
//! Mechanically this is C3 restricted to the `papers` dataset's title column, COPYing
//! straight into `corpusid_mapping_title(corpusid BIGINT, title TEXT)` rather than a
//! `temp_import`-style working table — there is no separate "finalize" pass that
//! swaps a working table into place, only the deferred `ADD PRIMARY KEY` below.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use papeline_core::db::{self, SessionTuning};
use papeline_core::machine::DbConfig;
use papeline_core::{Dataset, SortOrder};
use tokio_postgres::Client;

use crate::decode;

/// SQL for the sidecar ledger table queried with `INSERT ... ON CONFLICT DO NOTHING`
/// rather than a text ledger (§4.6).
pub const CREATE_LOG_TABLE_SQL: &str =
    "CREATE TABLE IF NOT EXISTS papers_import_log (filename TEXT PRIMARY KEY, imported_at TIMESTAMP DEFAULT NOW())";

pub const CREATE_TITLE_TABLE_SQL: &str =
    "CREATE UNLOGGED TABLE IF NOT EXISTS corpusid_mapping_title (corpusid BIGINT, title TEXT) WITH (autovacuum_enabled = false)";

pub struct TitleLoadConfig {
    pub shard_dir: PathBuf,
    pub db: DbConfig,
    pub work_mem: String,
    pub skip_index: bool,
}

#[derive(Default, Debug, Clone, Copy)]
pub struct TitleLoadReport {
    pub shards_done: usize,
    pub shards_skipped: usize,
    pub rows_loaded: u64,
}

/// Run the title loader over every `.gz` in `cfg.shard_dir` not already recorded in
/// `papers_import_log`, one shard at a time on a single connection — small-scale
/// relative to the multi-table datasets C3 otherwise handles, so the full decode/
/// insert worker pool is unnecessary here.
pub fn run(cfg: &TitleLoadConfig) -> Result<TitleLoadReport, tokio_postgres::Error> {
    let rt = db::worker_runtime().expect("failed to start title-loader runtime");
    let client = db::connect(&rt, &cfg.db)?;
    db::execute_batch(&rt, &client, CREATE_LOG_TABLE_SQL)?;
    db::execute_batch(&rt, &client, CREATE_TITLE_TABLE_SQL)?;

    let loaded = loaded_filenames(&rt, &client)?;
    let pending = match list_pending(&cfg.shard_dir, SortOrder::BySize, &loaded) {
        Ok(p) => p,
        Err(e) => {
            log::error!("title loader: failed to list {}: {e}", cfg.shard_dir.display());
            return Ok(TitleLoadReport::default());
        }
    };
    log::info!("title loader: {} shard(s) pending", pending.len());

    let tuning = rt.block_on(SessionTuning::apply(&client, &cfg.work_mem, None))?;
    let copy_sql = "COPY corpusid_mapping_title (corpusid, title) FROM STDIN (FORMAT text, DELIMITER E'\\t', NULL '')";

    let mut report = TitleLoadReport::default();
    for path in pending {
        if papeline_core::is_shutdown_requested() {
            log::info!("title loader: shutdown requested, stopping");
            break;
        }
        let Some(shard) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match load_one_shard(&rt, &client, copy_sql, &path) {
            Ok(rows) => {
                report.shards_done += 1;
                report.rows_loaded += rows;
                record_loaded(&rt, &client, shard)?;
            }
            Err(e) => {
                log::error!("title loader: {shard} failed: {e}");
                report.shards_skipped += 1;
            }
        }
    }

    rt.block_on(tuning.reset(&client))?;

    if !cfg.skip_index {
        deduplicate_and_index(&rt, &client)?;
    }

    Ok(report)
}

/// Basenames in `dir` (matching `*.gz`) not already present in `loaded` — the
/// SQL-ledger equivalent of [`papeline_core::ShardCatalogue::list_pending`].
fn list_pending(dir: &Path, order: SortOrder, loaded: &HashSet<String>) -> std::io::Result<Vec<PathBuf>> {
    let mut entries: Vec<(PathBuf, u64)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".gz") || loaded.contains(name) {
            continue;
        }
        let size = entry.metadata()?.len();
        entries.push((path, size));
    }
    match order {
        SortOrder::Lexicographic => entries.sort_by(|a, b| a.0.cmp(&b.0)),
        SortOrder::BySize => entries.sort_by_key(|(_, size)| *size),
    }
    Ok(entries.into_iter().map(|(p, _)| p).collect())
}

fn loaded_filenames(
    rt: &tokio::runtime::Runtime,
    client: &Client,
) -> Result<std::collections::HashSet<String>, tokio_postgres::Error> {
    let rows = rt.block_on(client.query("SELECT filename FROM papers_import_log", &[]))?;
    Ok(rows.into_iter().map(|r| r.get::<_, String>(0)).collect())
}

fn record_loaded(
    rt: &tokio::runtime::Runtime,
    client: &Client,
    shard: &str,
) -> Result<(), tokio_postgres::Error> {
    rt.block_on(client.execute(
        "INSERT INTO papers_import_log (filename) VALUES ($1) ON CONFLICT (filename) DO NOTHING",
        &[&shard],
    ))?;
    Ok(())
}

fn load_one_shard(
    rt: &tokio::runtime::Runtime,
    client: &Client,
    copy_sql: &str,
    path: &Path,
) -> std::io::Result<u64> {
    use std::io::{BufRead, BufReader};
    let (reader, _counter, _total) = papeline_core::gzip::open_gzip_reader(path)?;
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        if let Some(row) = decode::decode_record(trimmed, Dataset::Papers) {
            buf.extend_from_slice(&row);
        }
    }
    db::copy_in_batch(rt, client, copy_sql, &buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Deferred primary key build: keep `MIN(ctid)` per corpusid (first-write-wins),
/// then add the constraint (§4.6).
fn deduplicate_and_index(
    rt: &tokio::runtime::Runtime,
    client: &Client,
) -> Result<(), tokio_postgres::Error> {
    db::execute_batch(
        rt,
        client,
        "DELETE FROM corpusid_mapping_title a USING corpusid_mapping_title b \
         WHERE a.ctid > b.ctid AND a.corpusid = b.corpusid;",
    )?;
    db::execute_batch(
        rt,
        client,
        "ALTER TABLE corpusid_mapping_title ADD PRIMARY KEY (corpusid);",
    )?;
    db::execute_batch(rt, client, "ALTER TABLE corpusid_mapping_title SET LOGGED;")?;
    db::execute_batch(rt, client, "ANALYZE corpusid_mapping_title;")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_sql_has_no_primary_key_upfront() {
        assert!(!CREATE_TITLE_TABLE_SQL.contains("PRIMARY KEY"));
        assert!(CREATE_TITLE_TABLE_SQL.contains("UNLOGGED"));
    }

    #[test]
    fn log_table_sql_keys_on_filename() {
        assert!(CREATE_LOG_TABLE_SQL.contains("filename TEXT PRIMARY KEY"));
    }
}
