//! `papeline extract_corpusid` - build the cross-dataset `final_delivery(corpusid)`
//! index (C4.10) from one or more dataset shard directories.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use papeline_loader::extractor::{self, ExtractConfig, ExtractSource};

use crate::cmd::common::{db_config, expand_dir_globs, DEFAULT_MACHINE};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ExtractCorpusidArgs {
    /// A single source directory (mutually exclusive with `--dirs`).
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Multiple source directories, each tracked with its own ledger.
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    dirs: Vec<PathBuf>,

    /// Decode workers; the source pins this at 1 to avoid thrashing a USB-attached
    /// source drive, overridable here for faster local storage.
    #[arg(long)]
    extractors: Option<usize>,

    /// Insert (COPY) workers.
    #[arg(long)]
    inserters: Option<usize>,

    /// Clear every source directory's ledger before running (equivalent to `--reset`).
    #[arg(long = "no-resume")]
    no_resume: bool,

    /// Clear every source directory's ledger before running.
    #[arg(long)]
    reset: bool,

    #[arg(long, default_value_t = DEFAULT_MACHINE.to_string())]
    machine: String,
}

pub fn run(args: ExtractCorpusidArgs, config: &Config) -> Result<()> {
    let mut raw_dirs: Vec<PathBuf> = args.dirs.clone();
    if let Some(dir) = args.dir.clone() {
        raw_dirs.push(dir);
    }
    anyhow::ensure!(!raw_dirs.is_empty(), "one of --dir or --dirs is required");

    let dirs: Vec<PathBuf> = raw_dirs.iter().flat_map(|d| expand_dir_globs(d)).collect();
    anyhow::ensure!(!dirs.is_empty(), "no directories matched {raw_dirs:?}");

    let db = db_config(config, &args.machine)?.clone();
    let reset = args.no_resume || args.reset;

    let mut sources = Vec::with_capacity(dirs.len());
    for dir in &dirs {
        let ledger_name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("source")
            .to_string();
        if reset {
            let mut catalogue = papeline_core::ShardCatalogue::open(&config.paths.logs_dir, "corpusid_extract", &ledger_name)?;
            catalogue.reset()?;
        }
        sources.push(ExtractSource {
            shard_dir: dir.clone(),
            ledger_name,
        });
    }

    let cfg = ExtractConfig {
        sources,
        logs_dir: config.paths.logs_dir.clone(),
        table: extractor::DEFAULT_TABLE.to_string(),
        db,
        decode_workers: args.extractors.unwrap_or(ExtractConfig::DEFAULT_DECODE_WORKERS),
        insert_workers: args.inserters.unwrap_or(1),
        commit_every: 4,
    };

    let reports = extractor::run(&cfg)?;
    for (source, report) in dirs.iter().zip(reports.iter()) {
        log::info!(
            "extract_corpusid: {} - {} done, {} failed, {} rows",
            source.display(),
            report.shards_done,
            report.shards_failed,
            report.rows_loaded
        );
    }
    Ok(())
}
