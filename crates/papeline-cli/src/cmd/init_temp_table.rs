//! `papeline init_temp_table` - create, drop, truncate, or index the per-dataset
//! working tables assigned to a machine, and manage their shard ledgers.
//!
//! One action flag is expected per invocation, mirroring `init_temp_table.py`'s
//! mutually-exclusive `--drop`/`--truncate`/`--create-indexes`/`--init-log-table`/
//! `--clear-log` switches. Each dataset a machine is assigned loads into its own table
//! (see [`papeline_loader::finalize`]) rather than one wide `temp_import` row, so this
//! command applies the chosen action to every assignment in turn.

use anyhow::{bail, Result};
use clap::Args;
use papeline_core::{db, ShardCatalogue};

use crate::cmd::common::db_config;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct InitTempTableArgs {
    /// Drop each assigned table.
    #[arg(long)]
    drop: bool,
    /// Truncate each assigned table, keeping its structure.
    #[arg(long)]
    truncate: bool,
    /// Create each assigned table (UNLOGGED, no indexes) if it doesn't already exist.
    #[arg(long = "create-indexes")]
    create_indexes: bool,
    /// Ensure the shard-ledger directory for this machine exists.
    #[arg(long = "init-log-table")]
    init_log_table: bool,
    /// Reset every assigned dataset's shard ledger.
    #[arg(long = "clear-log")]
    clear_log: bool,

    #[arg(long, default_value = "machine0")]
    machine: String,
}

pub fn run(args: InitTempTableArgs, config: &Config) -> Result<()> {
    let chosen = [args.drop, args.truncate, args.create_indexes, args.init_log_table, args.clear_log]
        .iter()
        .filter(|b| **b)
        .count();
    if chosen != 1 {
        bail!("exactly one of --drop/--truncate/--create-indexes/--init-log-table/--clear-log is required");
    }

    let assignments = config.registry.assignments(&args.machine)?.to_vec();
    if args.init_log_table || args.clear_log {
        for assignment in &assignments {
            let ledger_name = format!("{}_{}", args.machine, assignment.folder);
            let mut catalogue = ShardCatalogue::open(&config.paths.logs_dir, assignment.dataset.name(), &ledger_name)?;
            if args.clear_log {
                catalogue.reset()?;
                log::info!("init_temp_table: cleared ledger for {ledger_name}");
            } else {
                log::info!("init_temp_table: ledger ready for {ledger_name}");
            }
        }
        return Ok(());
    }

    let db_cfg = db_config(config, &args.machine)?;
    let rt = db::worker_runtime()?;
    let client = db::connect(&rt, db_cfg)?;

    for assignment in &assignments {
        if args.drop {
            let sql = format!("DROP TABLE IF EXISTS {};", assignment.table);
            db::execute_batch(&rt, &client, &sql)?;
            log::info!("init_temp_table: dropped {}", assignment.table);
        } else if args.truncate {
            let sql = format!("TRUNCATE TABLE {};", assignment.table);
            db::execute_batch(&rt, &client, &sql)?;
            log::info!("init_temp_table: truncated {}", assignment.table);
        } else if args.create_indexes {
            let sql = papeline_loader::finalize::create_unlogged_sql(&assignment.table, assignment.dataset);
            db::execute_batch(&rt, &client, &sql)?;
            log::info!("init_temp_table: created {}", assignment.table);
        }
    }

    Ok(())
}
