//! Bulk Loader (C3): the decode-worker / insert-worker pipeline that turns a
//! directory of gzip shards into COPYed rows, with per-shard ledger bookkeeping.
//!
//! Decode workers (`E`, 1-8) each claim whole shard files off a lock-free
//! [`WorkQueue`] and stream decoded rows as fixed-size batches onto a bounded
//! channel. Insert workers (`I`, 1-4) each own one database connection (driven by
//! a private single-threaded Tokio runtime — see [`papeline_core::db`]) and COPY
//! batches in as they arrive, committing every `commit_every` batches. A shard is
//! only marked done in the catalogue once every batch decoded from it has been
//! COPYed successfully by some insert worker, tracked centrally on the thread that
//! owns the [`ShardCatalogue`].

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};

use papeline_core::db::{self, SessionTuning};
use papeline_core::machine::DbConfig;
use papeline_core::{Dataset, ShardCatalogue, SortOrder, WorkQueue, gzip::open_gzip_reader};

use crate::decode;

/// Row encoding selected for one run: either a dataset's full COPY row, or the
/// two-column `(citingcorpusid, citedcorpusid)` edge form the citation graph
/// builder's raw-edge ingest stage reuses this pipeline for.
#[derive(Clone, Copy)]
pub enum RowKind {
    Dataset(Dataset),
    CitationEdge,
    /// Cross-dataset id extraction (C4.10): one `corpusid` column via the byte-scan
    /// fast path rather than a full JSON parse.
    CorpusidOnly,
}

impl RowKind {
    fn decode_line(self, line: &str) -> Option<Vec<u8>> {
        match self {
            Self::Dataset(d) => decode::decode_record(line, d),
            Self::CitationEdge => decode::decode_edge(line),
            Self::CorpusidOnly => decode::decode_corpusid_only(line),
        }
    }
}

/// Build the `COPY <table> (<columns>) FROM STDIN ...` statement for a dataset's
/// temp-table load, matching the column list [`decode::decode_record`] produces.
pub fn copy_sql_for(dataset: Dataset, table: &str) -> String {
    let columns = match dataset {
        Dataset::Authors => "authorid, payload",
        Dataset::PublicationVenues => "publicationvenueid, payload",
        Dataset::Papers => "corpusid, title",
        Dataset::PaperIds => "corpusid",
        Dataset::S2orc | Dataset::S2orcV2 => "corpusid, content",
        Dataset::EmbeddingsSpecterV1 | Dataset::EmbeddingsSpecterV2 => "corpusid, vector",
        Dataset::Abstracts => "corpusid, abstract",
        Dataset::Tldrs => "corpusid, tldr",
        Dataset::Citations => "citingcorpusid, citedcorpusid",
    };
    format!("COPY {table} ({columns}) FROM STDIN (FORMAT text, DELIMITER E'\\t', NULL '')")
}

/// The `COPY <table> (corpusid) FROM STDIN ...` statement used by the corpusid-only
/// extractor regardless of source dataset.
pub fn copy_sql_for_corpusid_only(table: &str) -> String {
    format!("COPY {table} (corpusid) FROM STDIN (FORMAT text, DELIMITER E'\\t', NULL '')")
}

pub struct LoadConfig {
    pub row_kind: RowKind,
    pub copy_sql: String,
    pub shard_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub ledger_purpose: String,
    pub ledger_name: String,
    pub db: DbConfig,
    pub decode_workers: usize,
    pub insert_workers: usize,
    pub batch_rows: usize,
    pub commit_every: usize,
    pub work_mem: String,
    pub maintenance_work_mem: Option<String>,
}

impl LoadConfig {
    pub const DEFAULT_DECODE_WORKERS: usize = 1;
    pub const DEFAULT_INSERT_WORKERS: usize = 1;
    pub const DEFAULT_BATCH_ROWS: usize = 500_000;
    pub const DEFAULT_COMMIT_EVERY: usize = 4;
    pub const DEFAULT_WORK_MEM: &'static str = "512MB";

    pub fn new(
        row_kind: RowKind,
        copy_sql: String,
        shard_dir: PathBuf,
        logs_dir: PathBuf,
        ledger_purpose: String,
        ledger_name: String,
        db: DbConfig,
    ) -> Self {
        Self {
            row_kind,
            copy_sql,
            shard_dir,
            logs_dir,
            ledger_purpose,
            ledger_name,
            db,
            decode_workers: Self::DEFAULT_DECODE_WORKERS,
            insert_workers: Self::DEFAULT_INSERT_WORKERS,
            batch_rows: Self::DEFAULT_BATCH_ROWS,
            commit_every: Self::DEFAULT_COMMIT_EVERY,
            work_mem: Self::DEFAULT_WORK_MEM.to_string(),
            maintenance_work_mem: None,
        }
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct LoadReport {
    pub shards_done: usize,
    pub shards_failed: usize,
    pub rows_loaded: u64,
}

enum DecodeMsg {
    Batch {
        shard: String,
        bytes: Vec<u8>,
    },
    ShardDone {
        shard: String,
        total_batches: usize,
    },
    ShardFailed {
        shard: String,
        error: String,
    },
}

enum ProgressMsg {
    BatchComplete(String),
    ShardDone(String, usize),
    Failed(String, String),
}

/// Run one bulk-load pass over every pending shard in `cfg.shard_dir`, returning
/// once every shard has been decoded and either fully COPYed or recorded failed.
pub fn run(cfg: &LoadConfig) -> std::io::Result<LoadReport> {
    let mut catalogue = ShardCatalogue::open(&cfg.logs_dir, &cfg.ledger_purpose, &cfg.ledger_name)?;
    let pending = catalogue.list_pending(&cfg.shard_dir, SortOrder::BySize)?;
    log::info!("{}: {} shard(s) pending", cfg.ledger_name, pending.len());
    let queue = Arc::new(WorkQueue::new(pending));

    let channel_capacity = (cfg.insert_workers.max(1)) * 4;
    let (data_tx, data_rx) = mpsc::sync_channel::<DecodeMsg>(channel_capacity);
    let data_rx = Arc::new(Mutex::new(data_rx));
    let (progress_tx, progress_rx) = mpsc::channel::<ProgressMsg>();

    let mut insert_handles = Vec::with_capacity(cfg.insert_workers.max(1));
    for worker_id in 0..cfg.insert_workers.max(1) {
        let data_rx = Arc::clone(&data_rx);
        let progress_tx = progress_tx.clone();
        let db_cfg = cfg.db.clone();
        let copy_sql = cfg.copy_sql.clone();
        let work_mem = cfg.work_mem.clone();
        let maintenance_work_mem = cfg.maintenance_work_mem.clone();
        let commit_every = cfg.commit_every.max(1);
        insert_handles.push(std::thread::spawn(move || {
            insert_worker(
                worker_id,
                data_rx,
                progress_tx,
                &db_cfg,
                &copy_sql,
                &work_mem,
                maintenance_work_mem.as_deref(),
                commit_every,
            )
        }));
    }
    drop(progress_tx);

    let mut decode_handles = Vec::with_capacity(cfg.decode_workers.max(1));
    for worker_id in 0..cfg.decode_workers.max(1) {
        let queue = Arc::clone(&queue);
        let data_tx = data_tx.clone();
        let row_kind = cfg.row_kind;
        let batch_rows = cfg.batch_rows.max(1);
        decode_handles.push(std::thread::spawn(move || {
            decode_worker(worker_id, &queue, &data_tx, row_kind, batch_rows)
        }));
    }
    drop(data_tx);

    let mut report = LoadReport::default();
    let mut pending_shards: HashMap<String, (usize, Option<usize>)> = HashMap::new();

    for msg in progress_rx {
        match msg {
            ProgressMsg::BatchComplete(shard) => {
                let entry = pending_shards.entry(shard.clone()).or_insert((0, None));
                entry.0 += 1;
                finalize_if_complete(&shard, &mut pending_shards, &mut catalogue, &mut report);
            }
            ProgressMsg::ShardDone(shard, total_batches) => {
                let entry = pending_shards.entry(shard.clone()).or_insert((0, None));
                entry.1 = Some(total_batches);
                finalize_if_complete(&shard, &mut pending_shards, &mut catalogue, &mut report);
            }
            ProgressMsg::Failed(shard, error) => {
                pending_shards.remove(&shard);
                if let Err(e) = catalogue.mark_failed(&shard, &error) {
                    log::error!("failed to record {shard} as failed: {e}");
                }
                report.shards_failed += 1;
            }
        }
    }

    for h in decode_handles {
        let _ = h.join();
    }
    let mut rows_loaded = 0u64;
    for h in insert_handles {
        rows_loaded += h.join().unwrap_or(0);
    }
    report.rows_loaded = rows_loaded;

    Ok(report)
}

fn finalize_if_complete(
    shard: &str,
    pending_shards: &mut HashMap<String, (usize, Option<usize>)>,
    catalogue: &mut ShardCatalogue,
    report: &mut LoadReport,
) {
    let done = matches!(pending_shards.get(shard), Some((received, Some(total))) if received == total);
    if done {
        pending_shards.remove(shard);
        if let Err(e) = catalogue.mark_done(shard) {
            log::error!("failed to record {shard} as done: {e}");
        }
        report.shards_done += 1;
    }
}

fn decode_worker(
    worker_id: usize,
    queue: &WorkQueue<PathBuf>,
    data_tx: &SyncSender<DecodeMsg>,
    row_kind: RowKind,
    batch_rows: usize,
) {
    while let Some(path) = queue.next() {
        if papeline_core::is_shutdown_requested() {
            log::info!("decode worker {worker_id}: shutdown requested, stopping");
            break;
        }
        let Some(shard) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if let Err(e) = decode_shard_file(path, row_kind, batch_rows, data_tx, &shard) {
            let _ = data_tx.send(DecodeMsg::ShardFailed {
                shard,
                error: e.to_string(),
            });
        }
    }
}

fn decode_shard_file(
    path: &Path,
    row_kind: RowKind,
    batch_rows: usize,
    data_tx: &SyncSender<DecodeMsg>,
    shard: &str,
) -> std::io::Result<()> {
    let (reader, _counter, _total) = open_gzip_reader(path)?;
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut rows_in_batch = 0usize;
    let mut batches_sent = 0usize;
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        match row_kind.decode_line(trimmed) {
            Some(row) => {
                buf.extend_from_slice(&row);
                rows_in_batch += 1;
            }
            None => log::warn!("{shard}: skipping malformed or incomplete line"),
        }
        if rows_in_batch >= batch_rows {
            flush_batch(data_tx, shard, &mut buf);
            batches_sent += 1;
            rows_in_batch = 0;
        }
    }
    if rows_in_batch > 0 {
        flush_batch(data_tx, shard, &mut buf);
        batches_sent += 1;
    }

    let _ = data_tx.send(DecodeMsg::ShardDone {
        shard: shard.to_string(),
        total_batches: batches_sent,
    });
    Ok(())
}

fn flush_batch(data_tx: &SyncSender<DecodeMsg>, shard: &str, buf: &mut Vec<u8>) {
    let bytes = std::mem::take(buf);
    let _ = data_tx.send(DecodeMsg::Batch {
        shard: shard.to_string(),
        bytes,
    });
}

fn insert_worker(
    worker_id: usize,
    data_rx: Arc<Mutex<Receiver<DecodeMsg>>>,
    progress_tx: Sender<ProgressMsg>,
    db_cfg: &DbConfig,
    copy_sql: &str,
    work_mem: &str,
    maintenance_work_mem: Option<&str>,
    commit_every: usize,
) -> u64 {
    let rt = match db::worker_runtime() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("insert worker {worker_id}: failed to start runtime: {e}");
            return 0;
        }
    };
    let mut client = match db::connect(&rt, db_cfg) {
        Ok(c) => c,
        Err(e) => {
            log::error!("insert worker {worker_id}: failed to connect: {e}");
            return 0;
        }
    };
    let mut tuning = match rt.block_on(SessionTuning::apply(&client, work_mem, maintenance_work_mem)) {
        Ok(t) => t,
        Err(e) => {
            log::error!("insert worker {worker_id}: failed to apply session tuning: {e}");
            return 0;
        }
    };
    if let Err(e) = db::execute_batch(&rt, &client, "BEGIN;") {
        log::error!("insert worker {worker_id}: failed to begin transaction: {e}");
    }

    let mut rows_total = 0u64;
    let mut batches_since_commit = 0usize;

    loop {
        let msg = {
            let rx = data_rx.lock().unwrap_or_else(|p| p.into_inner());
            rx.recv()
        };
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        match msg {
            DecodeMsg::Batch { shard, bytes } => match db::copy_in_batch(&rt, &client, copy_sql, &bytes) {
                Ok(copied) => {
                    rows_total += copied;
                    batches_since_commit += 1;
                    if batches_since_commit >= commit_every {
                        if let Err(e) = db::execute_batch(&rt, &client, "COMMIT; BEGIN;") {
                            log::error!("insert worker {worker_id}: periodic commit failed: {e}");
                        }
                        batches_since_commit = 0;
                    }
                    let _ = progress_tx.send(ProgressMsg::BatchComplete(shard));
                }
                Err(e) => {
                    log::error!("insert worker {worker_id}: COPY into {shard} failed: {e}");
                    let _ = progress_tx.send(ProgressMsg::Failed(shard, e.to_string()));
                    // The failed COPY left the connection in an aborted-transaction state
                    // (§4.3: "a connection-level rollback, the connection is
                    // re-established, and the batch is abandoned"). Roll back, then drop
                    // and re-establish the connection rather than trust a ROLLBACK alone
                    // to recover it, and re-apply the session tuning that was lost with it.
                    let _ = db::execute_batch(&rt, &client, "ROLLBACK;");
                    match db::connect(&rt, db_cfg) {
                        Ok(new_client) => {
                            client = new_client;
                            match rt.block_on(SessionTuning::apply(&client, work_mem, maintenance_work_mem)) {
                                Ok(t) => tuning = t,
                                Err(e) => {
                                    log::error!("insert worker {worker_id}: failed to re-apply session tuning after reconnect: {e}");
                                }
                            }
                            if let Err(e) = db::execute_batch(&rt, &client, "BEGIN;") {
                                log::error!("insert worker {worker_id}: failed to begin transaction after reconnect: {e}");
                            }
                            batches_since_commit = 0;
                        }
                        Err(e) => {
                            log::error!("insert worker {worker_id}: failed to reconnect after COPY error: {e}");
                            break;
                        }
                    }
                }
            },
            DecodeMsg::ShardDone { shard, total_batches } => {
                let _ = progress_tx.send(ProgressMsg::ShardDone(shard, total_batches));
            }
            DecodeMsg::ShardFailed { shard, error } => {
                let _ = progress_tx.send(ProgressMsg::Failed(shard, error));
            }
        }
    }

    if let Err(e) = db::execute_batch(&rt, &client, "COMMIT;") {
        log::error!("insert worker {worker_id}: final commit failed: {e}");
    }
    if let Err(e) = rt.block_on(tuning.reset(&client)) {
        log::error!("insert worker {worker_id}: failed to reset session tuning: {e}");
    }

    rows_total
}
