//! Papeline Core - Common infrastructure for the S2ORC ingestion pipeline
//!
//! This crate provides reusable components shared by every stage of the pipeline:
//! gzip shard reading, TSV/COPY encoding, atomic file replacement, retry/backoff,
//! progress reporting, graceful shutdown, the dataset lookup table, the shard
//! catalogue and disk custodian, the machine registry, and the Postgres connection
//! and session-tuning helpers shared by every bulk-loading component.

pub mod atomic_file;
pub mod catalogue;
pub mod custodian;
pub mod dataset;
pub mod db;
pub mod empty;
pub mod error;
pub mod gzip;
pub mod ledger;
pub mod logging;
pub mod machine;
pub mod progress;
pub mod retry;
pub mod semaphore;
pub mod shutdown;
pub mod tsv;
pub mod work_queue;

// Re-exports for convenience
pub use atomic_file::AtomicWriter;
pub use catalogue::{ShardCatalogue, SortOrder};
pub use dataset::Dataset;
pub use empty::is_empty_value;
pub use error::ShardError;
pub use gzip::{ByteCounter, GzipReader, SMALL_SHARD_THRESHOLD, open_gzip_reader};
pub use ledger::MergeLedger;
pub use logging::{IndicatifLogger, init_logging};
pub use machine::{DbConfig, FolderAssignment, MachineRegistry};
pub use progress::{ProgressContext, SharedProgress, fmt_num, upgrade_to_bar};
pub use retry::{DEFAULT_MAX_RETRIES, backoff_duration, retry_quiet, retry_with_backoff};
pub use semaphore::{Semaphore, SemaphoreGuard};
pub use shutdown::{is_shutdown_requested, request_shutdown, shutdown_flag};
pub use tsv::{clean_control_chars, tsv_escape, tsv_unescape};
pub use work_queue::WorkQueue;
