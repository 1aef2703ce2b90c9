//! Bulk Loader finalisation (`--finalize` mode, §4.3): after every shard in a
//! directory has drained, deduplicate the UNLOGGED working table, add its primary
//! key, and convert it back to a durable LOGGED table.
//!
//! Three SQL steps, run once per table, strictly after every decode/insert worker
//! has exited (see the Concurrency & Resource Model's ordering guarantees):
//! 1. `T_new` is created with the same columns plus the primary-key constraint.
//! 2. `INSERT INTO T_new SELECT DISTINCT ... FROM T ON CONFLICT DO NOTHING` — first
//!    write wins among duplicates.
//! 3. `T` is dropped, `T_new` is renamed to `T`, and `ANALYZE`d.

use papeline_core::db::{self};
use papeline_core::machine::DbConfig;
use papeline_core::{Dataset, db::worker_runtime};

/// Column definitions (name, SQL type) for one dataset's working table, in COPY
/// column order — matches [`crate::pipeline::copy_sql_for`].
pub fn columns_for(dataset: Dataset) -> Vec<(&'static str, &'static str)> {
    match dataset {
        Dataset::Authors => vec![("authorid", "BIGINT"), ("payload", "TEXT")],
        Dataset::PublicationVenues => vec![("publicationvenueid", "BIGINT"), ("payload", "TEXT")],
        Dataset::Papers => vec![("corpusid", "BIGINT"), ("title", "TEXT")],
        Dataset::PaperIds => vec![("corpusid", "BIGINT")],
        Dataset::S2orc | Dataset::S2orcV2 => vec![("corpusid", "BIGINT"), ("content", "TEXT")],
        Dataset::EmbeddingsSpecterV1 | Dataset::EmbeddingsSpecterV2 => {
            vec![("corpusid", "BIGINT"), ("vector", "TEXT")]
        }
        Dataset::Abstracts => vec![("corpusid", "BIGINT"), ("abstract", "TEXT")],
        Dataset::Tldrs => vec![("corpusid", "BIGINT"), ("tldr", "TEXT")],
        Dataset::Citations => vec![("citingcorpusid", "BIGINT"), ("citedcorpusid", "BIGINT")],
    }
}

/// `CREATE TABLE ... UNLOGGED ... WITH (autovacuum_enabled = false)` for a fresh
/// bulk-load target, with no primary key and no secondary indexes (§4.3).
pub fn create_unlogged_sql(table: &str, dataset: Dataset) -> String {
    let cols: Vec<String> = columns_for(dataset)
        .into_iter()
        .map(|(name, ty)| format!("{name} {ty}"))
        .collect();
    format!(
        "CREATE UNLOGGED TABLE IF NOT EXISTS {table} ({}) WITH (autovacuum_enabled = false);",
        cols.join(", ")
    )
}

/// Build the three-step finalisation SQL for `table`, keyed by `dataset`'s primary
/// key column (`None` for `citations`, whose finalisation only adds the secondary
/// index and re-enables autovacuum/LOGGED — no dedup, duplicates are the point).
pub fn finalize_sql(table: &str, dataset: Dataset) -> Vec<String> {
    match dataset.primary_key_column() {
        Some(pk) => {
            let cols: Vec<&str> = columns_for(dataset).into_iter().map(|(n, _)| n).collect();
            let col_list = cols.join(", ");
            let new_table = format!("{table}_new");
            vec![
                format!(
                    "CREATE TABLE {new_table} ({}, PRIMARY KEY ({pk}));",
                    columns_for(dataset)
                        .into_iter()
                        .map(|(n, t)| format!("{n} {t}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                format!(
                    "INSERT INTO {new_table} ({col_list}) SELECT DISTINCT ON ({pk}) {col_list} FROM {table} ON CONFLICT ({pk}) DO NOTHING;"
                ),
                format!("DROP TABLE {table};"),
                format!("ALTER TABLE {new_table} RENAME TO {table};"),
                format!("ALTER TABLE {table} SET LOGGED;"),
                format!("ALTER TABLE {table} SET (autovacuum_enabled = true);"),
                format!("ANALYZE {table};"),
            ]
        }
        None => vec![
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_citing ON {table} (citingcorpusid);"
            ),
            format!("ALTER TABLE {table} SET LOGGED;"),
            format!("ALTER TABLE {table} SET (autovacuum_enabled = true);"),
            format!("ANALYZE {table};"),
        ],
    }
}

/// Run finalisation against a live connection, one statement at a time (rather than
/// one `batch_execute` call) so a failure midway reports which step failed.
pub fn run_finalize(db: &DbConfig, table: &str, dataset: Dataset) -> Result<(), tokio_postgres::Error> {
    let rt = worker_runtime().expect("failed to start finalisation runtime");
    let client = db::connect(&rt, db)?;
    for stmt in finalize_sql(table, dataset) {
        log::info!("finalize {table}: {stmt}");
        db::execute_batch(&rt, &client, &stmt)?;
    }
    Ok(())
}
