//! Atomic file replacement: write a temp file in the same directory, then rename
//! over the destination. Used by the output assembler, the merger, and the ledgers.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// A buffered writer to a temp file that renames itself into place on `finish()`.
/// Dropping without calling `finish()` leaves the temp file behind uncommitted.
pub struct AtomicWriter {
    writer: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl AtomicWriter {
    /// Create a temp file `.tmp_<final-name>` alongside `final_path`, in the same
    /// directory so the closing rename is guaranteed atomic (same filesystem).
    pub fn create(final_path: impl Into<PathBuf>) -> io::Result<Self> {
        let final_path = final_path.into();
        let dir = final_path.parent().unwrap_or_else(|| Path::new("."));
        let name = final_path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no filename"))?;
        let tmp_path = dir.join(format!(".tmp_{}", name.to_string_lossy()));

        let file = File::create(&tmp_path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(4 * 1024 * 1024, file),
            tmp_path,
            final_path,
        })
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")
    }

    /// Flush, fsync, and rename into place.
    pub fn finish(mut self) -> io::Result<PathBuf> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(self.final_path)
    }

    /// Abort: remove the temp file without touching the destination.
    pub fn abort(self) {
        let _ = fs::remove_file(&self.tmp_path);
    }
}

impl Write for AtomicWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
