//! papeline - batch ingestion and assembly pipeline for the S2ORC academic corpus.
//!
//! Each subcommand is a thin wrapper around one of the library crates
//! (`papeline-loader`, `papeline-graph`, `papeline-assemble`), mirroring the source
//! project's one-script-per-tool layout while sharing a single `Config` and database
//! connection bootstrap.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "papeline")]
#[command(about = "Batch ingestion and assembly pipeline for the S2ORC academic corpus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Warnings and errors only.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./papeline.toml or the platform config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Create, drop, truncate, or index a machine's assigned working tables.
    InitTempTable(cmd::init_temp_table::InitTempTableArgs),
    /// Bulk-load one dataset's shard directory into its working table (C3).
    ImportGzToTemp(cmd::import_gz_to_temp::ImportGzToTempArgs),
    /// Ingest citation edges and fold them into references/citations arrays (C5).
    ImportCitations(cmd::import_citations::ImportCitationsArgs),
    /// Load the corpusid -> title mapping used by the citation graph builder (C6).
    ImportPapersTitle(cmd::import_papers_title::ImportPapersTitleArgs),
    /// Run the bulk loader over every folder assigned to a machine.
    BatchProcessMachine(cmd::batch_process_machine::BatchProcessMachineArgs),
    /// Build the cross-dataset corpusid index from one or more shard directories.
    ExtractCorpusid(cmd::extract_corpusid::ExtractCorpusidArgs),
    /// Create or finalise a machine's working tables.
    InitTable(cmd::init_table::InitTableArgs),
    /// Assemble delivery shards from the working table's citation columns (C7).
    AssembleOutput(cmd::assemble_output::AssembleOutputArgs),
    /// Merge citation side-channel files and database payloads into delivery shards (C8).
    MergeCitationsToFullData(cmd::merge_citations_to_full_data::MergeCitationsToFullDataArgs),
}

fn install_signal_handlers() -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        std::thread::spawn(move || {
            for sig in signals.forever() {
                log::warn!("received signal {sig}, requesting shutdown (finishing in-flight work)...");
                papeline_core::request_shutdown();
            }
        });
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(e) = install_signal_handlers() {
        log::warn!("failed to install signal handlers: {e}");
    }

    let config = match cli.config.as_ref() {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            log::error!("failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = dispatch(cli.command, &config);

    if papeline_core::is_shutdown_requested() {
        log::info!("exiting after shutdown request");
        return ExitCode::from(130);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::InitTempTable(args) => cmd::init_temp_table::run(args, config),
        Command::ImportGzToTemp(args) => cmd::import_gz_to_temp::run(args, config),
        Command::ImportCitations(args) => cmd::import_citations::run(args, config),
        Command::ImportPapersTitle(args) => cmd::import_papers_title::run(args, config),
        Command::BatchProcessMachine(args) => cmd::batch_process_machine::run(args, config),
        Command::ExtractCorpusid(args) => cmd::extract_corpusid::run(args, config),
        Command::InitTable(args) => cmd::init_table::run(args, config),
        Command::AssembleOutput(args) => cmd::assemble_output::run(args, config),
        Command::MergeCitationsToFullData(args) => cmd::merge_citations_to_full_data::run(args, config),
    }
}
