//! Common error type for shard decode/bulk-load pipelines

/// Error from decoding or bulk-loading a single shard.
#[derive(Debug)]
pub enum ShardError {
    Io(std::io::Error),
    Db(tokio_postgres::Error),
}

impl std::fmt::Display for ShardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Db(e) => write!(f, "DB: {e}"),
        }
    }
}

impl std::error::Error for ShardError {}

impl From<std::io::Error> for ShardError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<tokio_postgres::Error> for ShardError {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Db(e)
    }
}

impl ShardError {
    /// Whether the failure is worth retrying: disk-full never recovers on its
    /// own, everything else (connection reset, transient DB error) might.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
            Self::Db(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn shard_error_io_storage_full_not_retryable() {
        let err = ShardError::Io(std::io::Error::new(ErrorKind::StorageFull, "disk full"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn shard_error_io_other_retryable() {
        let err = ShardError::Io(std::io::Error::new(ErrorKind::BrokenPipe, "pipe"));
        assert!(err.is_retryable());
    }

    #[test]
    fn shard_error_display_io() {
        let err = ShardError::Io(std::io::Error::new(ErrorKind::NotFound, "not found"));
        let msg = format!("{err}");
        assert!(msg.contains("IO:"));
    }
}
