//! Error types for vmgate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vmgate_sys::ParseError;

/// The check could not produce a verdict at all.
///
/// Unmet requirements are never errors; they are reported as
/// [`Failure`](crate::Failure)s inside the verdict.
#[derive(Debug, Error)]
pub enum CapabilityCheckError {
    #[error("cannot read cpu info {}: {source}", .path.display())]
    CpuInfoUnreadable { path: PathBuf, source: io::Error },

    #[error("invalid cpu info {}: {source}", .path.display())]
    Parse { path: PathBuf, source: ParseError },

    #[error("no requirement policy for {arch}{}", .vendor.as_deref().map(|v| format!(" ({v})")).unwrap_or_default())]
    UnsupportedArch { arch: String, vendor: Option<String> },
}

/// Main error type for vmgate operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("capability check: {0}")]
    Check(#[from] CapabilityCheckError),

    #[error("serialize verdict: {0}")]
    Json(#[from] serde_json::Error),

    #[error("write report: {0}")]
    Io(#[from] io::Error),
}

/// Result type for vmgate operations.
pub type Result<T> = std::result::Result<T, Error>;
