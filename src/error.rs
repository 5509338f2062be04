use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the harness itself (never by the tests it runs).
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The dependency service never became healthy.
    #[error("setup failed for {service}: {reason}")]
    Setup { service: String, reason: String },

    /// A single suite invocation exceeded its bound.
    #[error("{target} timed out after {}s", limit.as_secs())]
    InvocationTimeout { target: String, limit: Duration },

    /// A subprocess could not be started or awaited.
    #[error("failed to invoke {target}: {message}")]
    Invocation { target: String, message: String },

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        source: serde_json::Error,
        path: PathBuf,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to write report {path}: {source}")]
    Report {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, HarnessError>;
