//! Citation Graph Builder (C5): raw-edge ingest followed by five SQL-only phases that
//! fold a citation edge list into `references`/`citations` JSON arrays (with titles
//! joined in) on the main working table.
//!
//! Stage 1 (edge ingest) reuses [`papeline_loader::pipeline`]'s decode/insert worker
//! pool in [`papeline_loader::RowKind::CitationEdge`] mode rather than a bespoke
//! loader — the edge rows are just two-column COPY batches, identical in shape to
//! every other C3 load. Stages 0 and 2-6 run as plain SQL against one connection,
//! since they're index builds and set-based aggregations rather than streamed I/O.

pub mod sql;

use std::path::PathBuf;

use papeline_core::db::{self, SessionTuning};
use papeline_core::machine::DbConfig;
use papeline_core::Dataset;
use papeline_loader::pipeline::{self, LoadConfig, LoadReport, RowKind};

use sql::Direction;

pub struct GraphConfig {
    pub shard_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub ledger_name: String,
    pub db: DbConfig,
    pub raw_table: String,
    pub main_table: String,
    pub truncate_raw_first: bool,
    pub drop_raw_after: bool,
    pub maintenance_work_mem: String,
    pub decode_workers: usize,
    pub insert_workers: usize,
}

impl GraphConfig {
    pub const DEFAULT_MAINTENANCE_WORK_MEM: &'static str = "2GB";

    pub fn new(shard_dir: PathBuf, logs_dir: PathBuf, ledger_name: String, db: DbConfig, main_table: String) -> Self {
        Self {
            shard_dir,
            logs_dir,
            ledger_name,
            db,
            raw_table: "citation_raw".to_string(),
            main_table,
            truncate_raw_first: false,
            drop_raw_after: false,
            maintenance_work_mem: Self::DEFAULT_MAINTENANCE_WORK_MEM.to_string(),
            decode_workers: LoadConfig::DEFAULT_DECODE_WORKERS,
            insert_workers: LoadConfig::DEFAULT_INSERT_WORKERS,
        }
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct GraphReport {
    pub edges_loaded: LoadReportSummary,
}

#[derive(Default, Debug, Clone, Copy)]
pub struct LoadReportSummary {
    pub shards_done: usize,
    pub shards_failed: usize,
    pub rows_loaded: u64,
}

impl From<LoadReport> for LoadReportSummary {
    fn from(r: LoadReport) -> Self {
        Self {
            shards_done: r.shards_done,
            shards_failed: r.shards_failed,
            rows_loaded: r.rows_loaded,
        }
    }
}

/// Run every stage of the citation graph builder in order, returning once the main
/// table's `references`/`citations` columns are populated and the temp tables are
/// dropped. Stages 0-6 per §4.5; aborts early (without running later stages) if
/// shutdown is requested between stages, leaving the raw table and any completed
/// temp tables in place for a subsequent run to pick up.
pub fn run(cfg: &GraphConfig) -> Result<GraphReport, GraphError> {
    let rt = db::worker_runtime().map_err(GraphError::Io)?;
    let client = db::connect(&rt, &cfg.db).map_err(GraphError::Db)?;

    log::info!("citation graph: stage 0 (raw table)");
    db::execute_batch(&rt, &client, &sql::create_raw_table_sql(&cfg.raw_table)).map_err(GraphError::Db)?;
    if cfg.truncate_raw_first {
        db::execute_batch(&rt, &client, &sql::truncate_raw_table_sql(&cfg.raw_table)).map_err(GraphError::Db)?;
    }

    if papeline_core::is_shutdown_requested() {
        return Err(GraphError::ShutdownRequested);
    }

    log::info!("citation graph: stage 1 (edge ingest)");
    let copy_sql = pipeline::copy_sql_for(Dataset::Citations, &cfg.raw_table);
    let mut load_cfg = LoadConfig::new(
        RowKind::CitationEdge,
        copy_sql,
        cfg.shard_dir.clone(),
        cfg.logs_dir.clone(),
        "citation_edges".to_string(),
        cfg.ledger_name.clone(),
        cfg.db.clone(),
    );
    load_cfg.decode_workers = cfg.decode_workers.max(1);
    load_cfg.insert_workers = cfg.insert_workers.max(1);
    let edge_report = pipeline::run(&load_cfg).map_err(GraphError::Io)?;

    if papeline_core::is_shutdown_requested() {
        return Err(GraphError::ShutdownRequested);
    }

    log::info!("citation graph: stage 2 (index + analyze)");
    let tuning = rt
        .block_on(SessionTuning::apply(&client, "512MB", Some(&cfg.maintenance_work_mem)))
        .map_err(GraphError::Db)?;
    for stmt in sql::index_raw_table_sql(&cfg.raw_table) {
        db::execute_batch(&rt, &client, &stmt).map_err(GraphError::Db)?;
    }
    rt.block_on(tuning.reset(&client)).map_err(GraphError::Db)?;

    let temp_references = format!("temp_references_{}", cfg.main_table);
    let temp_citations = format!("temp_citations_{}", cfg.main_table);

    log::info!("citation graph: stage 3 (references, outgoing)");
    for stmt in sql::create_temp_aggregation_sql(&temp_references, &cfg.raw_table, &Direction::Outgoing) {
        if stmt.starts_with("--") {
            continue;
        }
        db::execute_batch(&rt, &client, &stmt).map_err(GraphError::Db)?;
    }

    log::info!("citation graph: stage 4 (citations, incoming)");
    for stmt in sql::create_temp_aggregation_sql(&temp_citations, &cfg.raw_table, &Direction::Incoming) {
        if stmt.starts_with("--") {
            continue;
        }
        db::execute_batch(&rt, &client, &stmt).map_err(GraphError::Db)?;
    }

    log::info!("citation graph: stage 5 (merge into {})", cfg.main_table);
    for stmt in sql::merge_into_main_sql(&cfg.main_table, &temp_references, &temp_citations) {
        db::execute_batch(&rt, &client, &stmt).map_err(GraphError::Db)?;
    }

    log::info!("citation graph: stage 6 (cleanup)");
    let raw_to_drop = if cfg.drop_raw_after { Some(cfg.raw_table.as_str()) } else { None };
    for stmt in sql::cleanup_sql(&temp_references, &temp_citations, raw_to_drop) {
        db::execute_batch(&rt, &client, &stmt).map_err(GraphError::Db)?;
    }

    Ok(GraphReport {
        edges_loaded: edge_report.into(),
    })
}

#[derive(Debug)]
pub enum GraphError {
    Io(std::io::Error),
    Db(tokio_postgres::Error),
    ShutdownRequested,
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Db(e) => write!(f, "{e}"),
            Self::ShutdownRequested => write!(f, "shutdown requested"),
        }
    }
}

impl std::error::Error for GraphError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_citation_raw_and_no_truncate() {
        let cfg = GraphConfig::new(
            "/tmp/shards".into(),
            "/tmp/logs".into(),
            "machine0".into(),
            DbConfig {
                host: "localhost".into(),
                port: 5432,
                database: "s2orc".into(),
                user: "postgres".into(),
                password: String::new(),
                client_encoding: "utf8".into(),
            },
            "papers".into(),
        );
        assert_eq!(cfg.raw_table, "citation_raw");
        assert!(!cfg.truncate_raw_first);
        assert!(!cfg.drop_raw_after);
    }
}
