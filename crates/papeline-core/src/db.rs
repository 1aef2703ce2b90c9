//! Database connection bootstrap, scoped session tuning, and the sync/async bridge
//! for the `COPY ... FROM STDIN` protocol.
//!
//! `tokio-postgres`'s connection and COPY-in APIs are async; the rest of this codebase's
//! worker pool is synchronous (native OS threads, bounded `std::sync::mpsc` channels —
//! see the Design Notes on process-level parallelism). Each worker thread owns a small
//! single-threaded `tokio::runtime::Runtime` used only to drive its one connection.

use std::time::Duration;

use bytes::Bytes;
use futures_util::SinkExt;
use tokio::runtime::{Builder, Runtime};
use tokio_postgres::{Client, NoTls};

use crate::machine::DbConfig;

/// Build a minimal single-threaded runtime for one worker's database connection.
pub fn worker_runtime() -> std::io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

/// Connect to `cfg`, spawning the connection's IO-driving task on `rt`.
pub fn connect(rt: &Runtime, cfg: &DbConfig) -> Result<Client, tokio_postgres::Error> {
    rt.block_on(async {
        let (client, connection) = tokio_postgres::connect(&cfg.connection_string(), NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("database connection error: {e}");
            }
        });
        Ok(client)
    })
}

/// A guarded block of session-level tuning (`SET synchronous_commit = OFF`, large
/// `work_mem`, optionally large `maintenance_work_mem`) — every exit path of the caller
/// must invoke [`reset`](SessionTuning::reset) to restore defaults before the connection
/// is returned to any pool or reused for unrelated work.
pub struct SessionTuning {
    maintenance_work_mem: bool,
}

impl SessionTuning {
    pub async fn apply(
        client: &Client,
        work_mem: &str,
        maintenance_work_mem: Option<&str>,
    ) -> Result<Self, tokio_postgres::Error> {
        client
            .batch_execute(&format!(
                "SET synchronous_commit = OFF; SET work_mem = '{work_mem}';"
            ))
            .await?;
        if let Some(mw) = maintenance_work_mem {
            client
                .batch_execute(&format!("SET maintenance_work_mem = '{mw}';"))
                .await?;
        }
        Ok(Self {
            maintenance_work_mem: maintenance_work_mem.is_some(),
        })
    }

    pub async fn reset(self, client: &Client) -> Result<(), tokio_postgres::Error> {
        client
            .batch_execute("RESET synchronous_commit; RESET work_mem;")
            .await?;
        if self.maintenance_work_mem {
            client.batch_execute("RESET maintenance_work_mem;").await?;
        }
        Ok(())
    }
}

/// Stream one already-TSV-encoded batch through `COPY <copy_sql> FROM STDIN`, blocking
/// the calling (synchronous) worker thread until the copy completes. Returns the number
/// of rows the server reports as inserted.
pub fn copy_in_batch(
    rt: &Runtime,
    client: &Client,
    copy_sql: &str,
    batch: &[u8],
) -> Result<u64, tokio_postgres::Error> {
    rt.block_on(async {
        let mut sink = client.copy_in(copy_sql).await?;
        sink.send(Bytes::copy_from_slice(batch)).await?;
        sink.finish().await
    })
}

/// Execute a plain statement synchronously on `rt`, for DDL/finalisation steps that
/// don't need streaming.
pub fn execute_batch(
    rt: &Runtime,
    client: &Client,
    sql: &str,
) -> Result<(), tokio_postgres::Error> {
    rt.block_on(client.batch_execute(sql))
}

/// Connect with a bounded timeout, used at process start where a slow/unreachable
/// database should fail fast rather than hang (§7 kind 5, "Programmer" — fail fast).
pub fn connect_with_timeout(
    rt: &Runtime,
    cfg: &DbConfig,
    timeout: Duration,
) -> Result<Client, ConnectError> {
    rt.block_on(async {
        let attempt = tokio::time::timeout(timeout, async {
            let (client, connection) =
                tokio_postgres::connect(&cfg.connection_string(), NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    log::error!("database connection error: {e}");
                }
            });
            Ok::<_, tokio_postgres::Error>(client)
        })
        .await;

        match attempt {
            Ok(inner) => inner.map_err(ConnectError::from),
            Err(_) => Err(ConnectError::Timeout),
        }
    })
}

#[derive(Debug)]
pub enum ConnectError {
    Timeout,
    Db(tokio_postgres::Error),
}

impl From<tokio_postgres::Error> for ConnectError {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Db(e)
    }
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "connection timed out"),
            Self::Db(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for ConnectError {}
