// Errors raised while ingesting nightly results

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Malformed results path {path}: {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("Report {0} has no stats")]
    NoStats(String),

    #[error("Report {path} has no successful {phase} results")]
    MissingPhase { path: String, phase: String },

    #[error("Report {path} is missing '{column}' for the {phase} phase")]
    MissingColumn {
        path: String,
        phase: String,
        column: String,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid report {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, IngestError>;

pub(crate) fn io_error(path: &std::path::Path, source: std::io::Error) -> IngestError {
    IngestError::Io {
        path: path.display().to_string(),
        source,
    }
}
