//! `papeline import_gz_to_temp` - bulk-load one dataset's shard directory into its
//! working table (C3), optionally reclaiming shards as they complete and finalising
//! the table immediately afterwards.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use papeline_core::Dataset;
use papeline_loader::pipeline::{self, LoadConfig, RowKind};

use crate::cmd::common::{db_config, table_for_dataset};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ImportGzToTempArgs {
    /// Directory of `.gz` shards to load.
    path: PathBuf,

    /// Dataset kind this directory holds.
    #[arg(long, value_parser = parse_dataset)]
    dataset: Dataset,

    #[arg(long, default_value = "machine0")]
    machine: String,

    /// Delete each shard immediately after it's recorded done or failed.
    #[arg(long = "delete-gz")]
    delete_gz: bool,

    /// Finalise (dedup + primary key + re-index) the table once loading completes,
    /// instead of requiring a separate `init_table --finalize`-style step.
    #[arg(long = "auto-pipeline")]
    auto_pipeline: bool,
}

fn parse_dataset(s: &str) -> Result<Dataset, String> {
    s.parse().map_err(|e: papeline_core::dataset::UnknownDataset| e.to_string())
}

pub fn run(args: ImportGzToTempArgs, config: &Config) -> Result<()> {
    let db = db_config(config, &args.machine)?.clone();
    let table = table_for_dataset(config, &args.machine, args.dataset);
    let copy_sql = pipeline::copy_sql_for(args.dataset, &table);
    let ledger_name = format!("{}_{}", args.machine, args.dataset.name());

    let mut load_cfg = LoadConfig::new(
        RowKind::Dataset(args.dataset),
        copy_sql,
        args.path.clone(),
        config.paths.logs_dir.clone(),
        args.dataset.name().to_string(),
        ledger_name.clone(),
        db.clone(),
    );
    load_cfg.decode_workers = 1;

    let report = pipeline::run(&load_cfg)?;
    log::info!(
        "import_gz_to_temp: {} done, {} failed, {} rows loaded into {table}",
        report.shards_done,
        report.shards_failed,
        report.rows_loaded
    );

    if args.delete_gz {
        reclaim_done_shards(&args.path, &config.paths.logs_dir, args.dataset.name(), &ledger_name)?;
    }

    if args.auto_pipeline {
        papeline_loader::finalize::run_finalize(&db, &table, args.dataset)?;
        log::info!("import_gz_to_temp: finalised {table}");
    }

    Ok(())
}

/// Delete every shard in `dir` the ledger now records as done or failed — the same
/// policy the disk custodian applies on a timer, run here immediately on request.
fn reclaim_done_shards(dir: &std::path::Path, logs_dir: &std::path::Path, purpose: &str, ledger_name: &str) -> Result<()> {
    let catalogue = papeline_core::ShardCatalogue::open(logs_dir, purpose, ledger_name)?;
    // u64::MAX as the threshold forces the "below threshold" branch unconditionally,
    // since free space can never reach it - this call means "reclaim now", not "poll".
    let report = papeline_core::custodian::sweep_once(dir, dir, &catalogue, u64::MAX)?;
    log::info!("import_gz_to_temp: reclaimed {} shard(s), {} bytes", report.deleted, report.bytes_freed);
    Ok(())
}
