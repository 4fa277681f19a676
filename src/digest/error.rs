// Errors raised by the digest pipeline

use thiserror::Error;

/// Errors that can occur while building a regression digest
#[derive(Error, Debug)]
pub enum DigestError {
    #[error("Unknown metric kind: '{0}'")]
    UnknownMetricKind(String),

    #[error("Malformed run timestamp: '{0}' (expected YYYY-MM-DD HH:MM:SS [+ZZZZ])")]
    MalformedTimestamp(String),

    #[error("Test type contains control characters: {0:?}")]
    InvalidTestType(String),

    #[error("Invalid percent change '{value}' for metric '{metric}'")]
    InvalidPercent { metric: String, value: String },

    #[error("Digest template has no insertion marker (three consecutive newlines)")]
    MissingTemplateMarker,

    #[error("Invalid ledger entry pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Ledger IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for digest operations
pub type Result<T> = std::result::Result<T, DigestError>;
