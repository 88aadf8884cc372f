//! Error types for export conversion
//!
//! [`ConvertError`] is always fatal: it unwinds through the stack machine and
//! aborts the run. Recoverable problems are not errors, they are
//! [`Diagnostic`](crate::convert::Diagnostic)s reported on the side.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal conversion error
#[derive(Debug, Error)]
pub enum ConvertError {
    /// An element appeared where the export format does not allow one
    #[error("schema violation: unexpected element <{element}> in {position}")]
    SchemaViolation {
        element: String,
        position: &'static str,
    },

    /// A type identifier did not match any known vendor prefix
    #[error("unexpected {kind} type '{raw}'")]
    UnclassifiedType { kind: &'static str, raw: String },

    /// The document ended inside markup or with elements still open
    #[error("truncated document: {detail}")]
    Truncated { detail: String },

    /// A close tag arrived with no matching open element
    #[error("unbalanced close tag </{name}>")]
    UnbalancedClose { name: String },

    /// Markup was not valid UTF-8
    #[error("invalid UTF-8 at byte offset {offset}")]
    InvalidUtf8 { offset: u64 },

    /// Reading the export failed
    #[error("read error: {0}")]
    Read(#[source] std::io::Error),

    /// File system I/O errors while writing artifacts
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing an artifact failed
    #[error("JSON error for path '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Writing a CSV artifact failed
    #[error("CSV error for path '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Configuration loading or validation errors
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ConvertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;
