//! `papeline assemble_output` - run the Output Assembler (C7): stream the working
//! table's citation columns into a delivery directory of NDJSON shards plus their
//! `_part2.jsonl` side-channels, grounded in `export_to_jsonl_parallel.py`.
//!
//! Not part of the source CLI's flag-for-flag surface (the original runs this as a
//! standalone script), but it's the only producer of the files
//! `merge_citations_to_full_data` consumes, so it gets its own subcommand here
//! rather than being folded into another tool.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use papeline_assemble::AssembleConfig;

use crate::cmd::common::{db_config, table_for_dataset};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct AssembleOutputArgs {
    /// Delivery directory the assembled shards and their `_part2.jsonl` side
    /// channels are written into.
    #[arg(long = "output-dir")]
    output_dir: PathBuf,

    #[arg(long, default_value = "machine0")]
    machine: String,

    /// Lower bound (inclusive) of the corpusid range to assemble.
    #[arg(long = "min-corpusid")]
    min_corpusid: i64,

    /// Upper bound (exclusive) of the corpusid range to assemble.
    #[arg(long = "max-corpusid")]
    max_corpusid: i64,

    /// Query worker processes sharing the corpusid-range work queue.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Records per output shard before rolling to a new random-named file.
    #[arg(long = "records-per-shard")]
    records_per_shard: Option<usize>,
}

pub fn run(args: AssembleOutputArgs, config: &Config) -> Result<()> {
    let db = db_config(config, &args.machine)?.clone();
    let table = table_for_dataset(config, &args.machine, papeline_core::Dataset::S2orc);

    let mut cfg = AssembleConfig::new(db, table, args.output_dir, args.min_corpusid, args.max_corpusid);
    cfg.workers = args.workers.max(1);
    if let Some(n) = args.records_per_shard {
        cfg.records_per_shard = n.max(1);
    }

    let report = papeline_assemble::assembler::run(&cfg)?;
    log::info!(
        "assemble_output: {} record(s) written, {} skipped (empty), {} shard file(s)",
        report.records_written,
        report.records_skipped_empty,
        report.shard_files_written
    );
    Ok(())
}
