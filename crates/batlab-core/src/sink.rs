//! Append-only run log writer.
//!
//! # Storage Format
//!
//! Each run is two files in the data directory:
//! - `<run_id>.jsonl`: one [`TelemetrySample`] per line
//! - `<run_id>.meta.json`: [`RunMetadata`], written before the first tick
//!
//! Records are buffered and flushed every `flush_every` records, so an abrupt
//! kill loses at most that many ticks. Lines are only ever appended.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::sample::{RunMetadata, TelemetrySample};

/// Default number of records between flushes.
pub const DEFAULT_FLUSH_EVERY: u64 = 10;

/// Sidecar path for a log: `X.jsonl` -> `X.meta.json`.
pub fn sidecar_path(log_path: &Path) -> PathBuf {
    log_path.with_extension("meta.json")
}

/// Write the metadata sidecar as pretty JSON.
pub fn write_metadata(path: &Path, meta: &RunMetadata) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(meta)?;
    fs::write(path, json + "\n")?;
    Ok(())
}

/// Appends samples to a run log.
pub struct SampleSink {
    path: PathBuf,
    writer: BufWriter<File>,
    flush_every: u64,
    written: u64,
}

impl SampleSink {
    /// Open `path` for appending, creating it and its directory if needed.
    pub fn create(path: &Path, flush_every: u64) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            flush_every: flush_every.max(1),
            written: 0,
        })
    }

    /// Append one record.
    pub fn append(&mut self, sample: &TelemetrySample) -> Result<(), SinkError> {
        let line = sample.to_json_line()?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        if self.written % self.flush_every == 0 {
            self.writer.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush, sync to disk and close. Returns the number of records written.
    pub fn finish(mut self) -> Result<u64, SinkError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(self.written)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
