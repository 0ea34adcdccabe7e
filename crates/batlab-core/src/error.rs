//! Error types for acquisition, persistence and analysis.
//!
//! Acquisition errors ([`SourceError`]) never escape a tick: the resolver
//! absorbs them by falling through its chain. Analysis errors
//! ([`AnalysisError`]) become per-run exclusions in a report.

use thiserror::Error;

/// Why a single battery reader produced no value this tick.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source exists but reported nothing usable (missing fields, no battery).
    #[error("{reader} unavailable: {reason}")]
    Unavailable { reader: &'static str, reason: String },

    /// The battery is on AC power; discharge data would be contaminated.
    #[error("{reader} reports the battery is charging")]
    Charging { reader: &'static str },

    /// The source needs elevated privilege.
    #[error("permission denied reading {reader}")]
    PermissionDenied { reader: &'static str, hint: &'static str },

    /// The command or filesystem node backing the source is absent.
    #[error("{tool} not found")]
    ToolMissing { tool: &'static str },

    /// A field was present but could not be converted.
    #[error("failed to parse {field}: {value:?}")]
    Parse { field: &'static str, value: String },
}

impl SourceError {
    pub(crate) fn unavailable<S: Into<String>>(reader: &'static str, reason: S) -> Self {
        Self::Unavailable {
            reader,
            reason: reason.into(),
        }
    }

    /// Map an I/O failure from a source's backing command or file.
    pub(crate) fn from_io(
        reader: &'static str,
        tool: &'static str,
        hint: &'static str,
        err: &std::io::Error,
    ) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::ToolMissing { tool },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { reader, hint },
            _ => Self::unavailable(reader, err.to_string()),
        }
    }
}

/// Failure writing a run log or its sidecar.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure opening a run log. Per-line parse failures are not errors.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a run was excluded from a summary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("insufficient samples: {valid} valid, {required} required")]
    InsufficientSamples { valid: usize, required: usize },

    #[error("log contains no samples")]
    NoSamples,
}

/// Invalid user-supplied logging configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "invalid {kind} label {label:?}: use letters, digits and hyphens only (underscore separates run-id fields)"
    )]
    InvalidLabel { kind: &'static str, label: String },

    #[error("sampling frequency {0} Hz outside supported range 0.01-10.0")]
    FrequencyOutOfRange(f64),
}

/// Failure starting or running a logging session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("no battery source produced a reading")]
    NoSources,
}
