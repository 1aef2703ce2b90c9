//! Corpusid Extractor (C4.10): a thin specialisation of the bulk loader that pulls
//! only the `corpusid` column out of one or more dataset directories into a single
//! `final_delivery(corpusid BIGINT)` table, reusing C2/C3's decode/insert workers via
//! [`RowKind::CorpusidOnly`] rather than duplicating them.
//!
//! One [`ShardCatalogue`] ledger per source directory, so the same directory can be
//! re-run independently of whichever other directories feed the same table.

use std::path::PathBuf;

use papeline_core::machine::DbConfig;

use crate::pipeline::{self, LoadConfig, LoadReport, RowKind};

pub const DEFAULT_TABLE: &str = "final_delivery";

/// `CREATE TABLE ... WITH (fillfactor = 100, autovacuum_enabled = false)` — a
/// single-column table sized for a dense, append-only corpusid load.
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (corpusid BIGINT NOT NULL) \
         WITH (fillfactor = 100, autovacuum_enabled = false);"
    )
}

/// Deferred dedup + primary key, mirroring the title loader's approach (§4.4): first
/// write per corpusid wins, `ANALYZE` afterwards.
pub fn finalize_sql(table: &str) -> Vec<String> {
    let new_table = format!("{table}_new");
    vec![
        format!("CREATE TABLE {new_table} (corpusid BIGINT PRIMARY KEY) WITH (fillfactor = 100);"),
        format!(
            "INSERT INTO {new_table} (corpusid) SELECT DISTINCT corpusid FROM {table} ON CONFLICT (corpusid) DO NOTHING;"
        ),
        format!("DROP TABLE {table};"),
        format!("ALTER TABLE {new_table} RENAME TO {table};"),
        format!("ALTER TABLE {table} SET (autovacuum_enabled = true);"),
        format!("ANALYZE {table};"),
    ]
}

/// One source directory to extract corpusids from, with its own ledger name.
pub struct ExtractSource {
    pub shard_dir: PathBuf,
    pub ledger_name: String,
}

pub struct ExtractConfig {
    pub sources: Vec<ExtractSource>,
    pub logs_dir: PathBuf,
    pub table: String,
    pub db: DbConfig,
    /// Extractors default to single-threaded: the upstream shard directories
    /// typically live on one external drive, so extra decode workers don't help and
    /// just thrash the disk (see `extract_corpusid.py`'s `NUM_EXTRACTORS = 1`). Callers
    /// on faster local storage can raise this via `--extractors`.
    pub decode_workers: usize,
    pub insert_workers: usize,
    pub commit_every: usize,
}

impl ExtractConfig {
    pub const DEFAULT_DECODE_WORKERS: usize = 1;
}

/// Run the extractor over every configured source directory in turn, returning one
/// [`LoadReport`] per source.
pub fn run(cfg: &ExtractConfig) -> std::io::Result<Vec<LoadReport>> {
    let copy_sql = pipeline::copy_sql_for_corpusid_only(&cfg.table);
    let mut reports = Vec::with_capacity(cfg.sources.len());
    for source in &cfg.sources {
        if papeline_core::is_shutdown_requested() {
            log::info!("corpusid extractor: shutdown requested, stopping before {}", source.ledger_name);
            break;
        }
        let mut load_cfg = LoadConfig::new(
            RowKind::CorpusidOnly,
            copy_sql.clone(),
            source.shard_dir.clone(),
            cfg.logs_dir.clone(),
            "corpusid_extract".to_string(),
            source.ledger_name.clone(),
            cfg.db.clone(),
        );
        load_cfg.decode_workers = cfg.decode_workers.max(1);
        load_cfg.insert_workers = cfg.insert_workers.max(1);
        load_cfg.commit_every = cfg.commit_every.max(1);
        log::info!("corpusid extractor: starting {}", source.ledger_name);
        reports.push(pipeline::run(&load_cfg)?);
    }
    Ok(reports)
}
