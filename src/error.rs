use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Binary decoding
// ---------------------------------------------------------------------------

/// Failure while decoding a binary stream. Always fatal to the current read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of stream: needed {requested} bytes, {remaining} remaining")]
    UnexpectedEndOfStream { requested: usize, remaining: usize },

    #[error("unsupported format version tag {tag}")]
    UnsupportedFormatVersion { tag: i64 },

    #[error("structural count mismatch in {context}: declared {declared}, found {found}")]
    StructuralCountMismatch {
        context: &'static str,
        declared: i64,
        found: i64,
    },
}

// ---------------------------------------------------------------------------
// Dataset schema
// ---------------------------------------------------------------------------

/// A dataset that does not satisfy the canonical schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("required array '{0}' is missing")]
    MissingArray(&'static str),

    #[error("array '{array}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        array: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("array buffer holds {found} values but shape {shape:?} needs {expected}")]
    DataLength {
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },

    #[error("participation data is incomplete: amplitude, phase and participation modes must all be present")]
    IncompleteParticipation,

    #[error("invalid mode label: {0}")]
    InvalidLabel(String),

    #[error("mode index {index} is out of range for {len} modes")]
    ModeOutOfRange { index: usize, len: usize },
}

// ---------------------------------------------------------------------------
// Importers
// ---------------------------------------------------------------------------

/// Structured import failure: kind, message and the offending file.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}, line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{path}: {message}")]
    Layout { path: PathBuf, message: String },

    #[error("{path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("{path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("imported data from {path} is inconsistent: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    #[error("unknown tool '{0}' (expected 'hawcstab2' or 'bladed-lin')")]
    UnknownTool(String),
}

impl ImportError {
    /// The file the failure refers to, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            ImportError::Io { path, .. }
            | ImportError::Parse { path, .. }
            | ImportError::Layout { path, .. }
            | ImportError::Decode { path, .. }
            | ImportError::Csv { path, .. }
            | ImportError::Schema { path, .. } => Some(path),
            ImportError::UnknownTool(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DbError {
    #[error("dataset '{name}' of tool '{tool}' not found")]
    NotFound { tool: String, name: String },

    #[error("tool '{0}' has no datasets")]
    ToolNotFound(String),

    #[error("corrupt container {path}: {reason}")]
    CorruptContainer { path: PathBuf, reason: String },

    #[error("dataset rejected: {0}")]
    InvalidDataset(#[from] SchemaError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("cannot encode metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Either failure of [`crate::state::AppState::import`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Database(#[from] DbError),
}
