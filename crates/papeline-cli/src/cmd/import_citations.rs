//! `papeline import_citations` - run the Citation Graph Builder (C5) end to end:
//! ingest a directory of citation edge shards, then fold the resulting edge list into
//! the main working table's `references`/`citations` columns.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use papeline_graph::GraphConfig;

use crate::cmd::common::{db_config, table_for_dataset};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ImportCitationsArgs {
    /// Directory of citation-edge `.gz` shards.
    dir: PathBuf,

    #[arg(long, default_value = "machine0")]
    machine: String,

    /// Keep `citation_raw` after the merge completes (the default); accepted
    /// explicitly for parity with the source tool's flag.
    #[arg(long = "keep-raw")]
    keep_raw: bool,

    /// Truncate `citation_raw` before ingesting, for a from-scratch rebuild.
    #[arg(long)]
    truncate: bool,
}

pub fn run(args: ImportCitationsArgs, config: &Config) -> Result<()> {
    let db = db_config(config, &args.machine)?.clone();
    let main_table = table_for_dataset(config, &args.machine, papeline_core::Dataset::S2orc);
    let ledger_name = format!("{}_citation_edges", args.machine);

    let mut cfg = GraphConfig::new(args.dir, config.paths.logs_dir.clone(), ledger_name, db, main_table);
    cfg.truncate_raw_first = args.truncate;
    cfg.drop_raw_after = !args.keep_raw;

    let report = papeline_graph::run(&cfg)?;
    log::info!(
        "import_citations: {} edge shard(s) done, {} failed, {} edges loaded",
        report.edges_loaded.shards_done,
        report.edges_loaded.shards_failed,
        report.edges_loaded.rows_loaded
    );
    Ok(())
}
