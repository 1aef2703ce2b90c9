//! `papeline import_papers_title` - run the Title Loader (C6) over a directory of
//! `papers` shards, populating `corpusid_mapping_title`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use papeline_loader::title::{self, TitleLoadConfig};

use crate::cmd::common::db_config;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ImportPapersTitleArgs {
    /// Directory of `papers` `.gz` shards.
    dir: PathBuf,

    #[arg(long, default_value = "machine0")]
    machine: String,

    /// Skip the deferred dedup + primary key pass (useful when loading in several
    /// separate invocations and finalising only on the last one).
    #[arg(long = "skip-index")]
    skip_index: bool,
}

pub fn run(args: ImportPapersTitleArgs, config: &Config) -> Result<()> {
    let db = db_config(config, &args.machine)?.clone();
    let cfg = TitleLoadConfig {
        shard_dir: args.dir,
        db,
        work_mem: "512MB".to_string(),
        skip_index: args.skip_index,
    };
    let report = title::run(&cfg)?;
    log::info!(
        "import_papers_title: {} done, {} skipped, {} rows loaded",
        report.shards_done,
        report.shards_skipped,
        report.rows_loaded
    );
    Ok(())
}
