//! Error types for the benchmark.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that can occur while preparing, running or evaluating a benchmark.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error reading or writing a CSV table.
    #[error("CSV error: {0}")]
    Csv(String),

    /// Error during JSON/YAML serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration or model registry.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed input table.
    #[error("Input error: {0}")]
    Input(String),

    /// The upstream LLM call failed (network, non-2xx status, malformed payload).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Credentials are missing or were rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The LLM call did not finish in time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The response did not follow the section marker grammar.
    #[error("Failed to parse LLM response: {0}")]
    Parse(String),

    /// Embedding model failed to load or run.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Chart rendering failed.
    #[error("Chart error: {0}")]
    Chart(String),
}

impl BenchError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BenchError::Io { .. } => "io",
            BenchError::Csv(_) => "csv",
            BenchError::Serialization(_) => "serialization",
            BenchError::Config(_) => "config",
            BenchError::Input(_) => "input",
            BenchError::Provider(_) => "provider",
            BenchError::Auth(_) => "auth",
            BenchError::Timeout(_) => "timeout",
            BenchError::Parse(_) => "parse",
            BenchError::Embedding(_) => "embedding",
            BenchError::Chart(_) => "chart",
        }
    }

    /// Whether the error only affects a single (model, case) row.
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            BenchError::Provider(_)
                | BenchError::Auth(_)
                | BenchError::Timeout(_)
                | BenchError::Parse(_)
        )
    }

    /// Classify a transport error, given the timeout the client was built with.
    pub fn from_request(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            BenchError::Timeout(timeout)
        } else {
            BenchError::Provider(err.to_string())
        }
    }
}

impl From<csv::Error> for BenchError {
    fn from(err: csv::Error) -> Self {
        BenchError::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::Serialization(err.to_string())
    }
}
