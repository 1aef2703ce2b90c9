//! Output Assembler (C7): emits NDJSON shard files from the working table, one
//! record per corpusid that has at least one of `citations`/`references` populated.
//!
//! A manager thread partitions the corpusid range into `(start, end)` chunks on a
//! [`WorkQueue`]; worker threads each own a database connection, pull chunks off the
//! queue, query and assemble records, and send completed lines to a single writer
//! thread. Writing is serialised deliberately — the destination is modelled on the
//! source pipeline's USB-attached HDD, where concurrent writers from multiple
//! processes would turn sequential writes into random ones.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use papeline_core::machine::DbConfig;
use papeline_core::{is_empty_value, AtomicWriter, WorkQueue};
use rand::Rng;
use serde_json::{Map, Value};
use tokio::runtime::Runtime;
use tokio_postgres::Client;

pub const DEFAULT_RECORDS_PER_SHARD: usize = 50_000;
pub const DEFAULT_RANGE_SIZE: i64 = 1_000_000;
/// Fields pulled per corpusid, in query column order. `detailsOfCitations`/
/// `detailsOfReference` are not among them — those are JSONL-only fields the C8
/// merger produces from its own CITATION_FIELDS; the working table never carries
/// them (see `temp_import`'s schema, §6.1, and `finalize::columns_for`).
pub const OUTPUT_FIELDS: &[&str] = &["citations", "references"];

pub struct AssembleConfig {
    pub db: DbConfig,
    pub table: String,
    pub output_dir: PathBuf,
    pub records_per_shard: usize,
    pub range_size: i64,
    pub min_corpusid: i64,
    pub max_corpusid: i64,
    pub workers: usize,
}

impl AssembleConfig {
    pub fn new(db: DbConfig, table: String, output_dir: PathBuf, min_corpusid: i64, max_corpusid: i64) -> Self {
        Self {
            db,
            table,
            output_dir,
            records_per_shard: DEFAULT_RECORDS_PER_SHARD,
            range_size: DEFAULT_RANGE_SIZE,
            min_corpusid,
            max_corpusid,
            workers: 1,
        }
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct AssembleReport {
    pub records_written: u64,
    pub records_skipped_empty: u64,
    pub shard_files_written: usize,
}

/// Build the `SELECT` that retrieves one range of corpusids and their citation
/// columns, quoting `"references"` since it's a reserved word.
pub fn select_sql(table: &str) -> String {
    format!(
        "SELECT corpusid, citations, \"references\" \
         FROM {table} WHERE corpusid >= $1 AND corpusid < $2 ORDER BY corpusid"
    )
}

/// Split `[min, max)` into ascending `(start, end)` chunks of at most `range_size`.
pub fn partition_ranges(min_corpusid: i64, max_corpusid: i64, range_size: i64) -> Vec<(i64, i64)> {
    if max_corpusid <= min_corpusid || range_size <= 0 {
        return Vec::new();
    }
    let mut ranges = Vec::new();
    let mut start = min_corpusid;
    while start < max_corpusid {
        let end = (start + range_size).min(max_corpusid);
        ranges.push((start, end));
        start = end;
    }
    ranges
}

/// Build the assembled record for one DB row, or `None` if both `citations` and
/// `references` are empty (§4.7: "a corpusid with neither ... is skipped"). The
/// working table never carries `detailsOfCitations`/`detailsOfReference` — those are
/// filled in later by the C8 merger from its own side-channel, not assembled here.
pub fn assemble_record(corpusid: i64, citations: Option<&str>, references: Option<&str>) -> Option<Value> {
    let citations_v = citations.and_then(|s| serde_json::from_str::<Value>(s).ok());
    let references_v = references.and_then(|s| serde_json::from_str::<Value>(s).ok());

    if is_empty_value(citations_v.as_ref()) && is_empty_value(references_v.as_ref()) {
        return None;
    }

    let mut record = Map::new();
    record.insert("corpusid".to_string(), Value::from(corpusid));
    record.insert("citations".to_string(), citations_v.unwrap_or(Value::Array(vec![])));
    record.insert("references".to_string(), references_v.unwrap_or(Value::Array(vec![])));
    Some(Value::Object(record))
}

/// Pick an unused random 8-hex-character basename (without extension) in `dir`,
/// rejecting collisions (§4.7).
pub fn unused_shard_name(dir: &Path) -> std::io::Result<String> {
    let mut rng = rand::thread_rng();
    loop {
        let candidate: u32 = rng.gen();
        let name = format!("{candidate:08x}");
        if !dir.join(format!("{name}.jsonl")).exists() {
            return Ok(name);
        }
    }
}

enum WriterMsg {
    Line(String),
}

/// Run the assembler: spawn `cfg.workers` query workers over the corpusid ranges and
/// one serialised writer that rolls shards at `records_per_shard`, writing each
/// record to both the main shard file and its `_part2.jsonl` citation side-channel.
pub fn run(cfg: &AssembleConfig) -> std::io::Result<AssembleReport> {
    std::fs::create_dir_all(&cfg.output_dir)?;
    let ranges = partition_ranges(cfg.min_corpusid, cfg.max_corpusid, cfg.range_size);
    log::info!("assembler: {} range(s) over [{}, {})", ranges.len(), cfg.min_corpusid, cfg.max_corpusid);
    let queue = Arc::new(WorkQueue::new(ranges));

    let (tx, rx) = mpsc::channel::<WriterMsg>();

    let output_dir = cfg.output_dir.clone();
    let records_per_shard = cfg.records_per_shard.max(1);
    let writer_handle = std::thread::spawn(move || run_writer(rx, &output_dir, records_per_shard));

    let mut worker_handles = Vec::with_capacity(cfg.workers.max(1));
    for worker_id in 0..cfg.workers.max(1) {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        let db = cfg.db.clone();
        let table = cfg.table.clone();
        worker_handles.push(std::thread::spawn(move || query_worker(worker_id, &queue, &tx, &db, &table)));
    }
    drop(tx);

    for h in worker_handles {
        let _ = h.join();
    }

    writer_handle.join().unwrap_or_default()
}

fn query_worker(worker_id: usize, queue: &WorkQueue<(i64, i64)>, tx: &Sender<WriterMsg>, db: &DbConfig, table: &str) {
    let rt = match papeline_core::db::worker_runtime() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("assemble worker {worker_id}: failed to start runtime: {e}");
            return;
        }
    };
    let client = match papeline_core::db::connect(&rt, db) {
        Ok(c) => c,
        Err(e) => {
            log::error!("assemble worker {worker_id}: failed to connect: {e}");
            return;
        }
    };
    let sql = select_sql(table);

    while let Some(&(start, end)) = queue.next() {
        if papeline_core::is_shutdown_requested() {
            log::info!("assemble worker {worker_id}: shutdown requested, stopping");
            break;
        }
        match query_range(&rt, &client, &sql, start, end) {
            Ok(lines) => {
                for line in lines {
                    if tx.send(WriterMsg::Line(line)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => log::error!("assemble worker {worker_id}: range [{start}, {end}) failed: {e}"),
        }
    }
}

fn query_range(rt: &Runtime, client: &Client, sql: &str, start: i64, end: i64) -> Result<Vec<String>, tokio_postgres::Error> {
    let rows = rt.block_on(client.query(sql, &[&start, &end]))?;
    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        let corpusid: i64 = row.get(0);
        let citations: Option<String> = row.get(1);
        let references: Option<String> = row.get(2);
        if let Some(record) = assemble_record(corpusid, citations.as_deref(), references.as_deref()) {
            if let Ok(line) = serde_json::to_string(&record) {
                lines.push(line);
            }
        }
    }
    Ok(lines)
}

fn run_writer(rx: mpsc::Receiver<WriterMsg>, output_dir: &Path, records_per_shard: usize) -> std::io::Result<AssembleReport> {
    let mut report = AssembleReport::default();
    let mut current: Option<(AtomicWriter, AtomicWriter, usize)> = None;

    for msg in rx {
        let WriterMsg::Line(line) = msg;
        if current.is_none() {
            let name = unused_shard_name(output_dir)?;
            let main = AtomicWriter::create(output_dir.join(format!("{name}.jsonl")))?;
            let part2 = AtomicWriter::create(output_dir.join(format!("{name}_part2.jsonl")))?;
            current = Some((main, part2, 0));
            report.shard_files_written += 1;
        }
        let (main, part2, count) = current.as_mut().unwrap();
        main.write_line(&line)?;
        part2.write_line(&line)?;
        *count += 1;
        report.records_written += 1;

        if *count >= records_per_shard {
            let (main, part2, _) = current.take().unwrap();
            main.finish()?;
            part2.finish()?;
        }
    }

    if let Some((main, part2, _)) = current {
        main.finish()?;
        part2.finish()?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partition_ranges_covers_whole_span_without_overlap() {
        let ranges = partition_ranges(0, 25, 10);
        assert_eq!(ranges, vec![(0, 10), (10, 20), (20, 25)]);
    }

    #[test]
    fn partition_ranges_empty_for_degenerate_span() {
        assert!(partition_ranges(10, 10, 5).is_empty());
        assert!(partition_ranges(10, 5, 5).is_empty());
    }

    #[test]
    fn assemble_record_skipped_when_both_empty() {
        let record = assemble_record(1, Some("[]"), Some("[]"));
        assert!(record.is_none());
    }

    #[test]
    fn assemble_record_kept_when_citations_present() {
        let record = assemble_record(1, Some("[1,2]"), Some("[]")).unwrap();
        assert_eq!(record["corpusid"], json!(1));
        assert_eq!(record["citations"], json!([1, 2]));
        assert_eq!(record["references"], json!([]));
    }

    #[test]
    fn assemble_record_treats_null_columns_as_empty_arrays() {
        let record = assemble_record(1, None, Some("[9]")).unwrap();
        assert_eq!(record["citations"], json!([]));
        assert_eq!(record["references"], json!([9]));
    }

    #[test]
    fn unused_shard_name_is_eight_hex_chars() {
        let dir = tempfile::TempDir::new().unwrap();
        let name = unused_shard_name(dir.path()).unwrap();
        assert_eq!(name.len(), 8);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn run_writer_rolls_to_a_new_shard_after_the_limit() {
        let dir = tempfile::TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..5 {
            tx.send(WriterMsg::Line(format!("{{\"corpusid\":{i}}}"))).unwrap();
        }
        drop(tx);
        let report = run_writer(rx, dir.path(), 2).unwrap();
        assert_eq!(report.records_written, 5);
        assert_eq!(report.shard_files_written, 3);

        let mut jsonl_files = 0;
        let mut part2_files = 0;
        for entry in std::fs::read_dir(dir.path()).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            if name.ends_with("_part2.jsonl") {
                part2_files += 1;
            } else if name.ends_with(".jsonl") {
                jsonl_files += 1;
            }
        }
        assert_eq!(jsonl_files, 3);
        assert_eq!(part2_files, 3);
    }
}
