//! `papeline merge_citations_to_full_data` - run the Merger (C8): fold a directory of
//! `_part2.jsonl` citation side-channels, plus the working table's payload columns,
//! into a previously assembled delivery directory, grounded in
//! `merge_citations_to_full_data.py`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use papeline_assemble::MergerConfig;

use crate::cmd::common::{db_config, table_for_dataset};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct MergeCitationsToFullDataArgs {
    /// Directory of `<name>_part2.jsonl` citation side-channel files.
    #[arg(long = "source-dir")]
    source_dir: PathBuf,

    /// Directory of previously assembled `<name>.jsonl` delivery shards, updated
    /// in place (atomically, one file at a time).
    #[arg(long = "target-dir")]
    target_dir: PathBuf,

    #[arg(long, default_value = "machine0")]
    machine: String,

    /// Payload columns pulled from the database and copied onto the target only
    /// where the target's own value is empty (§4.8 DB_FIELDS); defaults to `content`.
    #[arg(long = "db-field", value_delimiter = ',')]
    db_fields: Vec<String>,
}

pub fn run(args: MergeCitationsToFullDataArgs, config: &Config) -> Result<()> {
    let db = db_config(config, &args.machine)?.clone();
    let table = table_for_dataset(config, &args.machine, papeline_core::Dataset::S2orc);

    let mut cfg = MergerConfig::new(args.source_dir, args.target_dir, config.paths.merge_ledger.clone(), db, table);
    if !args.db_fields.is_empty() {
        cfg.db_fields = args.db_fields;
    }

    let stats = papeline_assemble::merger::run(&cfg)?;
    log::info!(
        "merge_citations_to_full_data: {} file(s) merged, {} skipped (already done), \
         {} citation update(s), {} db update(s), {} line(s) written through unparsed",
        stats.files_processed,
        stats.files_skipped_already_done,
        stats.citation_updates,
        stats.db_updates,
        stats.lines_written_through
    );
    Ok(())
}
