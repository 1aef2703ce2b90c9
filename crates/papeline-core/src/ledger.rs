//! Progress Ledger (C9), SQLite form: used by the merger (C8) instead of C1's text
//! ledger. A unit (a `_part2.jsonl` source basename) appears at most once, keyed by
//! filename; absence means never attempted or interrupted before commit.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;

pub struct MergeLedger {
    conn: Connection,
}

impl MergeLedger {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS merge_progress (
                filename TEXT PRIMARY KEY,
                updated_at TEXT NOT NULL
            )",
        )?;
        Ok(Self { conn })
    }

    /// In-memory ledger, for tests that don't want a filesystem dependency.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS merge_progress (
                filename TEXT PRIMARY KEY,
                updated_at TEXT NOT NULL
            )",
        )?;
        Ok(Self { conn })
    }

    pub fn is_done(&self, filename: &str) -> rusqlite::Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM merge_progress WHERE filename = ?1",
                [filename],
                |_| Ok(()),
            )
            .map(|_| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(other),
            })
    }

    /// Mark `filename` done. Called only after the target shard's atomic replacement
    /// has completed (invariant 5 of the data model).
    pub fn mark_done(&self, filename: &str) -> rusqlite::Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO merge_progress (filename, updated_at) VALUES (?1, ?2)
             ON CONFLICT(filename) DO UPDATE SET updated_at = excluded.updated_at",
            rusqlite::params![filename, now],
        )?;
        Ok(())
    }

    pub fn all_done(&self) -> rusqlite::Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT filename FROM merge_progress")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect()
    }
}
