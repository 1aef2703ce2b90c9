//! Local gzip shard reading: small-file fast path vs. large-buffer streaming.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::MultiGzDecoder;

/// Shards at or below this size are decompressed fully into memory before iterating.
/// Above it, a buffered streaming reader is used instead to bound peak memory.
pub const SMALL_SHARD_THRESHOLD: u64 = 500 * 1024 * 1024;

/// Buffer size for the streaming (large-shard) reader.
const STREAM_BUF_SIZE: usize = 64 * 1024 * 1024;

/// Shared byte counter for progress tracking (counts compressed bytes consumed).
pub type ByteCounter = Arc<AtomicU64>;

/// A reader over one decompressed `.gz` shard, either fully in memory or streamed.
pub enum GzipReader {
    InMemory(Cursor<Vec<u8>>),
    Streaming(BufReader<MultiGzDecoder<CountingReader<File>>>),
}

impl Read for GzipReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::InMemory(c) => c.read(buf),
            Self::Streaming(r) => r.read(buf),
        }
    }
}

/// Reader wrapper that tracks bytes read from the underlying (compressed) source.
pub struct CountingReader<R> {
    inner: R,
    count: ByteCounter,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Open a `.gz` shard, choosing the in-memory or streaming path by file size.
///
/// Returns the reader, a byte counter tracking compressed-bytes progress (useful
/// for the small-shard path too, updated to the full size immediately), and the
/// total compressed size for progress-bar sizing.
pub fn open_gzip_reader(path: &Path) -> io::Result<(GzipReader, ByteCounter, u64)> {
    let file = File::open(path)?;
    let total = file.metadata()?.len();
    let counter = Arc::new(AtomicU64::new(0));

    if total <= SMALL_SHARD_THRESHOLD {
        let mut compressed = Vec::with_capacity(total as usize);
        let mut f = file;
        f.read_to_end(&mut compressed)?;
        counter.store(total, Ordering::Relaxed);
        let mut decoder = MultiGzDecoder::new(Cursor::new(compressed));
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok((
            GzipReader::InMemory(Cursor::new(decompressed)),
            counter,
            total,
        ))
    } else {
        let counting = CountingReader {
            inner: file,
            count: counter.clone(),
        };
        let decoder = MultiGzDecoder::new(counting);
        let reader = BufReader::with_capacity(STREAM_BUF_SIZE, decoder);
        Ok((GzipReader::Streaming(reader), counter, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{BufRead, Write};
    use tempfile::TempDir;

    fn write_gz(path: &Path, lines: &[&str]) {
        let file = File::create(path).unwrap();
        let mut enc = GzEncoder::new(file, Compression::default());
        for line in lines {
            writeln!(enc, "{line}").unwrap();
        }
        enc.finish().unwrap();
    }

    #[test]
    fn reads_small_shard_in_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shard.gz");
        write_gz(&path, &["one", "two", "three"]);

        let (reader, counter, total) = open_gzip_reader(&path).unwrap();
        assert!(matches!(reader, GzipReader::InMemory(_)));
        assert!(total > 0);
        assert_eq!(counter.load(Ordering::Relaxed), total);

        let mut buf = BufReader::new(reader);
        let mut line = String::new();
        buf.read_line(&mut line).unwrap();
        assert_eq!(line, "one\n");
    }

    #[test]
    fn empty_shard_yields_no_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.gz");
        write_gz(&path, &[]);

        let (reader, _counter, _total) = open_gzip_reader(&path).unwrap();
        let mut buf = BufReader::new(reader);
        let mut line = String::new();
        assert_eq!(buf.read_line(&mut line).unwrap(), 0);
    }

    #[test]
    fn missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.gz");
        assert!(open_gzip_reader(&path).is_err());
    }
}
