//! Merger (C8): three-way merge of a citation side-channel file, a batched database
//! lookup, and a previously-assembled target file, grounded in
//! `merge_citations_to_full_data.py`.
//!
//! For each `(SRC/<name>_part2.jsonl, TGT/<name>.jsonl)` pair: the citation fields
//! from SRC always overwrite TGT when present and non-empty; the database fields only
//! fill in where TGT's existing value is empty. A line TGT can't parse even after
//! control-character cleaning is written through unchanged rather than dropped,
//! preserving line count and ordering (§4.8).

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use papeline_core::machine::DbConfig;
use papeline_core::{clean_control_chars, is_empty_value, AtomicWriter, MergeLedger};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tokio::runtime::Runtime;
use tokio_postgres::Client;

/// Fields copied from SRC to TGT unconditionally when the source value is non-empty.
pub const CITATION_FIELDS: &[&str] = &["citations", "references", "detailsOfCitations", "detailsOfReference"];

/// Fields copied from the database to TGT only when TGT's own value is empty.
pub const DEFAULT_DB_FIELDS: &[&str] = &["content"];

pub const DEFAULT_BATCH_SIZE: usize = 5_000;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MergerConfig {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub db: DbConfig,
    pub db_table: String,
    pub db_fields: Vec<String>,
    pub batch_size: usize,
    pub max_retries: u32,
}

impl MergerConfig {
    pub fn new(source_dir: PathBuf, target_dir: PathBuf, ledger_path: PathBuf, db: DbConfig, db_table: String) -> Self {
        Self {
            source_dir,
            target_dir,
            ledger_path,
            db,
            db_table,
            db_fields: DEFAULT_DB_FIELDS.iter().map(|s| s.to_string()).collect(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: papeline_core::DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct MergeStats {
    pub files_processed: usize,
    pub files_skipped_already_done: usize,
    pub lines_written_through: u64,
    pub citation_updates: u64,
    pub db_updates: u64,
}

/// Copy `fields` from `source` onto `target` when the source value is present and
/// non-empty, and (unless `skip_if_target_not_empty`) regardless of the target's
/// current value. Returns how many fields were actually changed.
pub fn update_record_fields(
    target: &mut Map<String, Value>,
    source: &Map<String, Value>,
    fields: &[&str],
    skip_if_target_not_empty: bool,
) -> usize {
    let mut updated = 0;
    for field in fields {
        let Some(src_value) = source.get(*field) else {
            continue;
        };
        if is_empty_value(Some(src_value)) {
            continue;
        }
        if skip_if_target_not_empty && !is_empty_value(target.get(*field)) {
            continue;
        }
        target.insert(field.to_string(), src_value.clone());
        updated += 1;
    }
    updated
}

fn corpusid_of(value: &Value) -> Option<i64> {
    value.get("corpusid").and_then(Value::as_i64)
}

/// Parse one JSONL line, retrying once through [`clean_control_chars`] if the raw
/// bytes don't parse as-is.
fn parse_lenient(line: &str) -> Option<Value> {
    serde_json::from_str(line)
        .ok()
        .or_else(|| serde_json::from_str(&clean_control_chars(line)).ok())
}

/// Read every line of `path`, returning a corpusid-keyed map of records whose
/// citation fields are non-empty. Lines that fail to parse even after cleaning are
/// logged and skipped (SRC has no "pass the line through" requirement — it only
/// feeds the in-memory update map).
fn load_source_updates(path: &Path) -> std::io::Result<FxHashMap<i64, Map<String, Value>>> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = FxHashMap::default();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(value) = parse_lenient(&line) else {
            log::warn!("{}: line {} unparseable even after cleaning, skipping", path.display(), lineno + 1);
            continue;
        };
        let Some(obj) = value.as_object() else {
            continue;
        };
        let has_citation_data = CITATION_FIELDS.iter().any(|f| !is_empty_value(obj.get(*f)));
        if !has_citation_data {
            continue;
        }
        if let Some(corpusid) = corpusid_of(&value) {
            out.insert(corpusid, obj.clone());
        }
    }
    Ok(out)
}

/// Batched `SELECT corpusid, <db_fields> FROM <table> WHERE corpusid IN (...)`,
/// retried with exponential backoff on connection-level errors (§4.8 step 3).
fn load_db_updates(
    rt: &Runtime,
    client: &Client,
    table: &str,
    fields: &[String],
    ids: &[i64],
    max_retries: u32,
) -> Result<FxHashMap<i64, Map<String, Value>>, tokio_postgres::Error> {
    let col_list = fields.join(", ");
    let sql = format!("SELECT corpusid, {col_list} FROM {table} WHERE corpusid = ANY($1)");

    let rows = papeline_core::retry_quiet(
        "merger db lookup",
        max_retries,
        |_e: &tokio_postgres::Error| true,
        || rt.block_on(client.query(&sql, &[&ids])),
    )?;

    let mut out = FxHashMap::default();
    out.reserve(rows.len());
    for row in rows {
        let corpusid: i64 = row.get(0);
        let mut obj = Map::new();
        for (i, field) in fields.iter().enumerate() {
            let text: Option<String> = row.get(i + 1);
            let value = match text {
                Some(t) => serde_json::from_str(&t).unwrap_or(Value::String(t)),
                None => Value::Null,
            };
            if !is_empty_value(Some(&value)) {
                obj.insert(field.clone(), value);
            }
        }
        out.insert(corpusid, obj);
    }
    Ok(out)
}

/// Run the full three-stage merge for one `(source, target)` pair, writing the
/// result atomically over `target` and returning how many lines/records were
/// touched.
pub fn process_file_pair(
    rt: &Runtime,
    client: &Client,
    cfg: &MergerConfig,
    source: &Path,
    target: &Path,
) -> std::io::Result<MergeStats> {
    let mut stats = MergeStats::default();

    let source_updates = load_source_updates(source)?;
    let ids: Vec<i64> = source_updates.keys().copied().collect();

    let mut db_updates: FxHashMap<i64, Map<String, Value>> = FxHashMap::default();
    for chunk in ids.chunks(cfg.batch_size.max(1)) {
        match load_db_updates(rt, client, &cfg.db_table, &cfg.db_fields, chunk, cfg.max_retries) {
            Ok(batch) => db_updates.extend(batch),
            Err(e) => log::error!("{}: db lookup batch failed: {e}", source.display()),
        }
    }

    let mut writer = AtomicWriter::create(target)?;
    let file = std::fs::File::open(target)?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(value) = parse_lenient(&line) else {
            writer.write_line(&line)?;
            stats.lines_written_through += 1;
            continue;
        };
        let Value::Object(mut obj) = value else {
            writer.write_line(&line)?;
            stats.lines_written_through += 1;
            continue;
        };

        if let Some(corpusid) = obj.get("corpusid").and_then(Value::as_i64) {
            if let Some(src) = source_updates.get(&corpusid) {
                let n = update_record_fields(&mut obj, src, CITATION_FIELDS, false);
                if n > 0 {
                    stats.citation_updates += 1;
                }
            }
            let db_field_refs: Vec<&str> = cfg.db_fields.iter().map(String::as_str).collect();
            if let Some(db_rec) = db_updates.get(&corpusid) {
                let n = update_record_fields(&mut obj, db_rec, &db_field_refs, true);
                if n > 0 {
                    stats.db_updates += 1;
                }
            }
        }

        let line_out = serde_json::to_string(&Value::Object(obj))?;
        writer.write_line(&line_out)?;
    }
    writer.finish()?;
    stats.files_processed = 1;
    Ok(stats)
}

/// A single Postgres connection configured for merger use, with a bounded connect
/// timeout (§7: fail fast on an unreachable database).
pub fn connect(rt: &Runtime, db: &DbConfig) -> Result<Client, papeline_core::db::ConnectError> {
    papeline_core::db::connect_with_timeout(rt, db, CONNECTION_TIMEOUT)
}

/// Source basenames to merge: every `*_part2.jsonl` in `source_dir` not already
/// recorded done in `ledger`, paired with its target file (same basename, minus the
/// `_part2` suffix, under `target_dir`).
fn pending_pairs(source_dir: &Path, target_dir: &Path, ledger: &MergeLedger) -> std::io::Result<Vec<(PathBuf, PathBuf)>> {
    let done = ledger
        .all_done()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let mut pairs = Vec::new();
    for entry in std::fs::read_dir(source_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = name.strip_suffix("_part2.jsonl") else {
            continue;
        };
        if done.contains(name) {
            continue;
        }
        pairs.push((path.clone(), target_dir.join(format!("{stem}.jsonl"))));
    }
    pairs.sort();
    Ok(pairs)
}

/// Run the merge over every pending `(source, target)` pair in `cfg.source_dir` /
/// `cfg.target_dir`, skipping pairs the ledger already marks done and recording each
/// pair done only after its atomic replacement completes (§4.8, §4.9's
/// "mark done only after the write is durable" ordering).
pub fn run(cfg: &MergerConfig) -> std::io::Result<MergeStats> {
    let ledger = MergeLedger::open(&cfg.ledger_path).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let pairs = pending_pairs(&cfg.source_dir, &cfg.target_dir, &ledger)?;
    log::info!("merger: {} pair(s) pending", pairs.len());

    let rt = papeline_core::db::worker_runtime()?;
    let client = connect(&rt, &cfg.db).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let mut stats = MergeStats::default();
    for (source, target) in pairs {
        if papeline_core::is_shutdown_requested() {
            log::info!("merger: shutdown requested, stopping");
            break;
        }
        let Some(source_name) = source.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if !target.exists() {
            log::warn!("merger: no target file for {source_name}, skipping");
            stats.files_skipped_already_done += 1;
            continue;
        }
        match process_file_pair(&rt, &client, cfg, &source, &target) {
            Ok(file_stats) => {
                stats.files_processed += file_stats.files_processed;
                stats.lines_written_through += file_stats.lines_written_through;
                stats.citation_updates += file_stats.citation_updates;
                stats.db_updates += file_stats.db_updates;
                if let Err(e) = ledger.mark_done(&source_name) {
                    log::error!("merger: failed to record {source_name} as done: {e}");
                }
            }
            Err(e) => log::error!("merger: {source_name} failed: {e}"),
        }
    }
    Ok(stats)
}
