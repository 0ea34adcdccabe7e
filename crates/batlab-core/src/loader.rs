//! Run discovery and log parsing.
//!
//! Logs may still be growing while they are read: a final line without a
//! trailing newline is a write in progress and is ignored. Lines that fail
//! to parse are counted and skipped; they never fail the run.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LoadError;
use crate::identity::{RunIdentity, parse_run_id};
use crate::sample::{RunMetadata, TelemetrySample};
use crate::sink::sidecar_path;
use crate::stats::AnalysisConfig;

/// Log file extension.
pub const LOG_EXTENSION: &str = "jsonl";

/// One run read back from disk.
#[derive(Debug, Clone)]
pub struct LoadedRun {
    pub path: PathBuf,
    pub identity: RunIdentity,
    pub metadata: Option<RunMetadata>,
    /// Parsed records in file order.
    pub samples: Vec<TelemetrySample>,
    /// Complete lines that did not parse.
    pub malformed_lines: usize,
}

impl LoadedRun {
    /// `base` with the nominal interval taken from the recorded sampling rate.
    pub fn analysis_config(&self, base: AnalysisConfig) -> AnalysisConfig {
        base.with_sampling_hz(self.metadata.as_ref().and_then(|m| m.sampling_hz))
    }
}

/// All `*.jsonl` logs in `dir`, sorted by name (chronological for run ids).
pub fn discover_runs(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    let mut logs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == LOG_EXTENSION))
        .collect();
    logs.sort();
    Ok(logs)
}

/// Load one run: identity from the sidecar (or file name) plus its records.
pub fn load_run(path: &Path) -> Result<LoadedRun, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);
    let (samples, malformed_lines) = parse_records(&content);
    if malformed_lines > 0 {
        log::debug!("{}: skipped {malformed_lines} malformed lines", path.display());
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let metadata = read_sidecar(&sidecar_path(path));
    let identity = match &metadata {
        Some(meta) => identity_from_metadata(meta, &stem),
        None => parse_run_id(&stem),
    };

    Ok(LoadedRun {
        path: path.to_path_buf(),
        identity,
        metadata,
        samples,
        malformed_lines,
    })
}

/// Parse complete lines; returns `(records, malformed line count)`.
pub fn parse_records(content: &str) -> (Vec<TelemetrySample>, usize) {
    let complete = match content.rfind('\n') {
        Some(end) => &content[..end],
        None => "",
    };

    let mut samples = Vec::new();
    let mut malformed = 0;
    for line in complete.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match TelemetrySample::from_json_line(line) {
            Ok(sample) => samples.push(sample),
            Err(e) => {
                log::trace!("malformed record {line:?}: {e}");
                malformed += 1;
            }
        }
    }
    (samples, malformed)
}

fn read_sidecar(path: &Path) -> Option<RunMetadata> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            log::debug!("no sidecar {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(meta) => Some(meta),
        Err(e) => {
            log::debug!("unreadable sidecar {}: {e}; using file name", path.display());
            None
        }
    }
}

fn identity_from_metadata(meta: &RunMetadata, stem: &str) -> RunIdentity {
    RunIdentity {
        run_id: if meta.run_id.is_empty() {
            stem.to_string()
        } else {
            meta.run_id.clone()
        },
        config: meta.config.clone(),
        workload: meta.workload.clone().filter(|w| !w.is_empty()),
        os: meta.os.clone(),
    }
}
