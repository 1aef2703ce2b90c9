//! Shard Catalogue (C1): per-(directory, dataset) done/failed/pending bookkeeping.
//!
//! `done` and `failed` are disjoint sets persisted as append-only text ledgers;
//! `pending` is never stored — it's inferred as every `.gz` basename in the directory
//! minus what the ledgers already claim. Callers must serialise access themselves;
//! concurrent appends from multiple processes to the same ledger pair are not supported.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Deterministic ordering for [`ShardCatalogue::list_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending lexicographic by basename (the default).
    Lexicographic,
    /// Ascending by file size, to surface small shards first.
    BySize,
}

pub struct ShardCatalogue {
    progress_path: PathBuf,
    failed_path: PathBuf,
    done: HashSet<String>,
    failed: HashMap<String, String>,
}

impl ShardCatalogue {
    /// Open (creating if absent) the progress/failed ledgers for one (purpose, name)
    /// pair under `logs_dir`, e.g. `logs_dir/<purpose>/<name>_progress.txt`.
    pub fn open(logs_dir: &Path, purpose: &str, name: &str) -> io::Result<Self> {
        let dir = logs_dir.join(purpose);
        fs::create_dir_all(&dir)?;
        let progress_path = dir.join(format!("{name}_progress.txt"));
        let failed_path = dir.join(format!("{name}_failed.txt"));

        let done = read_ledger_names(&progress_path)?;
        let failed = read_failed_ledger(&failed_path)?;

        Ok(Self {
            progress_path,
            failed_path,
            done,
            failed,
        })
    }

    /// Basenames in `dir` (matching `*.gz`) that are neither done nor failed.
    pub fn list_pending(&self, dir: &Path, order: SortOrder) -> io::Result<Vec<PathBuf>> {
        let mut entries: Vec<(PathBuf, u64)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".gz") {
                continue;
            }
            if self.done.contains(name) || self.failed.contains_key(name) {
                continue;
            }
            let size = entry.metadata()?.len();
            entries.push((path, size));
        }

        match order {
            SortOrder::Lexicographic => entries.sort_by(|a, b| a.0.cmp(&b.0)),
            SortOrder::BySize => entries.sort_by_key(|(_, size)| *size),
        }

        Ok(entries.into_iter().map(|(p, _)| p).collect())
    }

    /// Record `basename` as done. Flushes and fsyncs before returning.
    pub fn mark_done(&mut self, basename: &str) -> io::Result<()> {
        append_line(&self.progress_path, basename)?;
        self.done.insert(basename.to_string());
        Ok(())
    }

    /// Record `basename` as failed with a free-text `error` reason.
    pub fn mark_failed(&mut self, basename: &str, error: &str) -> io::Result<()> {
        let sanitized = error.replace('\n', " ").replace('|', "/");
        append_line(&self.failed_path, &format!("{basename} | error={sanitized}"))?;
        self.failed.insert(basename.to_string(), sanitized);
        Ok(())
    }

    /// Truncate both ledgers and clear in-memory state.
    pub fn reset(&mut self) -> io::Result<()> {
        File::create(&self.progress_path)?;
        File::create(&self.failed_path)?;
        self.done.clear();
        self.failed.clear();
        Ok(())
    }

    /// Truncate only the failed ledger, leaving `done` untouched. Used by callers
    /// that want a failed shard to be eligible for `list_pending` again on a retry
    /// pass, without losing progress already recorded as done.
    pub fn reset_failed(&mut self) -> io::Result<()> {
        File::create(&self.failed_path)?;
        self.failed.clear();
        Ok(())
    }

    pub fn done(&self) -> &HashSet<String> {
        &self.done
    }

    pub fn failed(&self) -> &HashMap<String, String> {
        &self.failed
    }

    pub fn is_done(&self, basename: &str) -> bool {
        self.done.contains(basename)
    }

    pub fn is_failed(&self, basename: &str) -> bool {
        self.failed.contains_key(basename)
    }
}

fn append_line(path: &Path, body: &str) -> io::Result<()> {
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "[{timestamp}] {body}")?;
    file.sync_all()
}

/// Parse a ledger line of the form `[timestamp] name` or `[timestamp] name | error=...`,
/// returning the basename. Malformed lines are skipped with a warning.
fn parse_ledger_line(line: &str) -> Option<(&str, Option<&str>)> {
    let rest = line.strip_prefix('[')?;
    let (_, after_bracket) = rest.split_once(']')?;
    let after_bracket = after_bracket.trim_start();
    if after_bracket.is_empty() {
        return None;
    }
    match after_bracket.split_once('|') {
        Some((name, detail)) => {
            let name = name.trim();
            let detail = detail.trim().strip_prefix("error=").unwrap_or(detail.trim());
            if name.is_empty() {
                None
            } else {
                Some((name, Some(detail)))
            }
        }
        None => Some((after_bracket.trim(), None)),
    }
}

fn read_ledger_names(path: &Path) -> io::Result<HashSet<String>> {
    let mut out = HashSet::new();
    if !path.exists() {
        return Ok(out);
    }
    let reader = BufReader::new(File::open(path)?);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_ledger_line(&line) {
            Some((name, _)) => {
                out.insert(name.to_string());
            }
            None => log::warn!("{}: skipping malformed ledger line {}", path.display(), lineno + 1),
        }
    }
    Ok(out)
}

fn read_failed_ledger(path: &Path) -> io::Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    if !path.exists() {
        return Ok(out);
    }
    let reader = BufReader::new(File::open(path)?);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_ledger_line(&line) {
            Some((name, detail)) => {
                out.insert(name.to_string(), detail.unwrap_or_default().to_string());
            }
            None => log::warn!("{}: skipping malformed ledger line {}", path.display(), lineno + 1),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, size: usize) {
        fs::write(dir.join(name), vec![0u8; size]).unwrap();
    }

    #[test]
    fn fresh_catalogue_has_no_done_or_failed() {
        let logs = TempDir::new().unwrap();
        let cat = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        assert!(cat.done().is_empty());
        assert!(cat.failed().is_empty());
    }

    #[test]
    fn mark_done_persists_across_reopen() {
        let logs = TempDir::new().unwrap();
        let mut cat = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        cat.mark_done("shard_0001.gz").unwrap();
        drop(cat);

        let cat2 = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        assert!(cat2.is_done("shard_0001.gz"));
    }

    #[test]
    fn mark_failed_records_reason() {
        let logs = TempDir::new().unwrap();
        let mut cat = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        cat.mark_failed("bad.gz", "truncated gzip").unwrap();
        assert!(cat.is_failed("bad.gz"));
        assert_eq!(cat.failed().get("bad.gz").unwrap(), "truncated gzip");
    }

    #[test]
    fn list_pending_excludes_done_and_failed() {
        let logs = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        touch(data.path(), "a.gz", 10);
        touch(data.path(), "b.gz", 10);
        touch(data.path(), "c.gz", 10);

        let mut cat = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        cat.mark_done("a.gz").unwrap();
        cat.mark_failed("b.gz", "oops").unwrap();

        let pending = cat.list_pending(data.path(), SortOrder::Lexicographic).unwrap();
        assert_eq!(pending, vec![data.path().join("c.gz")]);
    }

    #[test]
    fn list_pending_by_size_ascending() {
        let logs = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        touch(data.path(), "big.gz", 1000);
        touch(data.path(), "small.gz", 10);

        let cat = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        let pending = cat.list_pending(data.path(), SortOrder::BySize).unwrap();
        assert_eq!(pending, vec![data.path().join("small.gz"), data.path().join("big.gz")]);
    }

    #[test]
    fn reset_clears_both_ledgers() {
        let logs = TempDir::new().unwrap();
        let mut cat = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        cat.mark_done("a.gz").unwrap();
        cat.mark_failed("b.gz", "x").unwrap();
        cat.reset().unwrap();
        assert!(cat.done().is_empty());
        assert!(cat.failed().is_empty());

        let reopened = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        assert!(reopened.done().is_empty());
    }

    #[test]
    fn reset_failed_clears_only_the_failed_ledger() {
        let logs = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        touch(data.path(), "a.gz", 10);
        touch(data.path(), "b.gz", 10);

        let mut cat = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        cat.mark_done("a.gz").unwrap();
        cat.mark_failed("b.gz", "oops").unwrap();
        cat.reset_failed().unwrap();

        assert!(cat.is_done("a.gz"));
        assert!(cat.failed().is_empty());
        let pending = cat.list_pending(data.path(), SortOrder::Lexicographic).unwrap();
        assert_eq!(pending, vec![data.path().join("b.gz")]);

        let reopened = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        assert!(reopened.is_done("a.gz"));
        assert!(reopened.failed().is_empty());
    }

    #[test]
    fn malformed_line_is_skipped() {
        let logs = TempDir::new().unwrap();
        let dir = logs.path().join("s2orc");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("machine0_progress.txt"), "not a valid line\n[2024-01-01 00:00:00] good.gz\n").unwrap();

        let cat = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        assert!(cat.is_done("good.gz"));
        assert_eq!(cat.done().len(), 1);
    }

    #[test]
    fn ledger_consistency_invariant() {
        let logs = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        touch(data.path(), "a.gz", 10);
        touch(data.path(), "b.gz", 10);
        touch(data.path(), "c.gz", 10);

        let mut cat = ShardCatalogue::open(logs.path(), "s2orc", "machine0").unwrap();
        cat.mark_done("a.gz").unwrap();
        cat.mark_failed("b.gz", "x").unwrap();

        let pending = cat.list_pending(data.path(), SortOrder::Lexicographic).unwrap();
        assert_eq!(cat.done().len() + cat.failed().len() + pending.len(), 3);
    }
}
