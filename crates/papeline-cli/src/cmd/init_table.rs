//! `papeline init_table [--finalize]` - create the working tables assigned to a
//! machine (UNLOGGED, no primary key), or, with `--finalize`, run the full
//! dedup + primary-key + re-index pass that converts them into durable tables.
//!
//! Distinct from `init_temp_table --create-indexes`, which targets one machine's
//! tables individually for drop/truncate/reset maintenance; this command is the
//! initial-create and end-of-run-finalise pair used by the main batch pipeline,
//! mirroring `init_table.py`'s `--finalize` switch.

use anyhow::Result;
use clap::Args;
use papeline_core::db;

use crate::cmd::common::{db_config, DEFAULT_MACHINE};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct InitTableArgs {
    /// Deduplicate, add the primary key, and convert each table back to LOGGED.
    /// Without this flag, tables are (re-)created UNLOGGED with no primary key,
    /// ready for a fresh bulk load.
    #[arg(long)]
    finalize: bool,

    #[arg(long, default_value_t = DEFAULT_MACHINE.to_string())]
    machine: String,
}

pub fn run(args: InitTableArgs, config: &Config) -> Result<()> {
    let db_cfg = db_config(config, &args.machine)?.clone();
    let assignments = config.registry.assignments(&args.machine)?.to_vec();

    if args.finalize {
        for assignment in &assignments {
            papeline_loader::finalize::run_finalize(&db_cfg, &assignment.table, assignment.dataset)?;
            log::info!("init_table: finalised {}", assignment.table);
        }
        return Ok(());
    }

    let rt = db::worker_runtime()?;
    let client = db::connect(&rt, &db_cfg)?;
    for assignment in &assignments {
        let sql = papeline_loader::finalize::create_unlogged_sql(&assignment.table, assignment.dataset);
        db::execute_batch(&rt, &client, &sql)?;
        log::info!("init_table: created {} (unlogged)", assignment.table);
    }
    Ok(())
}
