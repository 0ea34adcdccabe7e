//! Run identifiers.
//!
//! A run id is `<timestamp>_<host>_<os>_<config>[_<workload>]`, for example
//! `2025-01-15T10:30:45Z_thinkpad_Linux_powersave_idle`. The same string is
//! the log's file stem, so identity can be recovered from the file name when
//! the metadata sidecar is missing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Separator between run-id fields.
pub const RUN_ID_SEPARATOR: char = '_';

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Identity of one logging run. Created once at start, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub run_id: String,
    pub config: String,
    pub workload: Option<String>,
    pub os: String,
}

impl RunIdentity {
    pub fn new(
        started: DateTime<Utc>,
        host: &str,
        os: &str,
        config: &str,
        workload: Option<&str>,
    ) -> Self {
        Self {
            run_id: generate_run_id(started, host, os, config, workload),
            config: config.to_string(),
            workload: workload.map(str::to_string),
            os: os.to_string(),
        }
    }

    /// Workload label, or the empty string.
    pub fn workload_label(&self) -> &str {
        self.workload.as_deref().unwrap_or("")
    }
}

/// Build a run id. The host is sanitized so it cannot introduce separators.
pub fn generate_run_id(
    started: DateTime<Utc>,
    host: &str,
    os: &str,
    config: &str,
    workload: Option<&str>,
) -> String {
    let ts = started.format(TIMESTAMP_FORMAT);
    let host = sanitize_token(host);
    match workload {
        Some(w) => format!("{ts}_{host}_{os}_{config}_{w}"),
        None => format!("{ts}_{host}_{os}_{config}"),
    }
}

/// Recover identity from a log file stem.
///
/// Four tokens mean no workload; five mean the last is the workload. Any
/// other shape keeps the stem as run id and labels the rest `unknown`.
pub fn parse_run_id(stem: &str) -> RunIdentity {
    let parts: Vec<&str> = stem.split(RUN_ID_SEPARATOR).collect();
    match parts.as_slice() {
        [_, _, os, config] => RunIdentity {
            run_id: stem.to_string(),
            config: (*config).to_string(),
            workload: None,
            os: (*os).to_string(),
        },
        [_, _, os, config, workload] => RunIdentity {
            run_id: stem.to_string(),
            config: (*config).to_string(),
            workload: Some((*workload).to_string()),
            os: (*os).to_string(),
        },
        _ => RunIdentity {
            run_id: stem.to_string(),
            config: "unknown".to_string(),
            workload: None,
            os: "unknown".to_string(),
        },
    }
}

/// Reject labels that would make the run id ambiguous.
pub fn validate_label(kind: &'static str, label: &str) -> Result<(), ConfigError> {
    let ok = !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidLabel {
            kind,
            label: label.to_string(),
        })
    }
}

fn sanitize_token(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
