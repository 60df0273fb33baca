//! Error types for Nereus operations.
//!
//! Errors are categorized into two main types:
//!
//! - **`Error`**: Errors that fail one operation (a query, a single-file write, a config load)
//! - **`IngestError`**: File-level errors that are collected while a batch keeps going
//!
//! Failures are always scoped to one file or one query. Nothing here poisons
//! the store as a whole.
//!
//! ## Error Categorization
//!
//! `IngestErrorKind` separates input problems (the source file or its
//! extractor) from internal problems (disk or store).

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Nereus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Nereus operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or arguments
    #[error("configuration error: {0}")]
    Config(String),

    /// The extractor could not produce records for a file
    #[error("extraction failed for {}: {message}", path.display())]
    Extraction {
        /// File that failed
        path: PathBuf,
        /// Extractor diagnostic
        message: String,
    },

    /// A relation endpoint names a symbol that is neither in the batch nor in the store
    #[error("unresolved relation endpoint: {0}")]
    UnresolvedEndpoint(String),

    /// A store write for one file failed after its retry
    #[error("transaction failed for {}: {source}", path.display())]
    Transaction {
        /// File whose write failed
        path: PathBuf,
        /// Last underlying failure
        #[source]
        source: Box<Error>,
    },

    /// The queried symbol or file is not in the graph
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal invariant broken (poisoned lock, worker panic)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error encountered while ingesting a specific file.
///
/// Collected during batch ingestion. The batch continues with the remaining
/// files and reports every failure at the end.
#[derive(Debug, Clone)]
pub struct IngestError {
    /// Path to the file that failed
    pub path: PathBuf,
    /// Category of the error
    pub kind: IngestErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.path.display(),
            self.message,
            self.kind
        )
    }
}

impl std::error::Error for IngestError {}

/// Categorization of ingestion errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestErrorKind {
    // Input problems
    /// The extractor rejected the file or produced malformed output
    ExtractionFailed,

    /// No extractor is registered for the file's extension
    UnsupportedLanguage,

    /// The path lies outside the workspace or is not a valid file path
    InvalidPath,

    // Internal problems
    /// Could not read the file from disk
    IoError,

    /// The store transaction failed twice
    TransactionFailed,
}

impl std::fmt::Display for IngestErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtractionFailed => write!(f, "extraction failed"),
            Self::UnsupportedLanguage => write!(f, "unsupported language"),
            Self::InvalidPath => write!(f, "invalid path"),
            Self::IoError => write!(f, "I/O error"),
            Self::TransactionFailed => write!(f, "transaction failed"),
        }
    }
}

impl IngestErrorKind {
    /// Returns `true` if the problem lies with the source file or its extractor.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::ExtractionFailed | Self::UnsupportedLanguage | Self::InvalidPath
        )
    }

    /// Returns `true` if the problem lies with the disk or the store.
    #[must_use]
    pub fn is_internal_error(&self) -> bool {
        matches!(self, Self::IoError | Self::TransactionFailed)
    }
}

impl IngestError {
    /// Create a new ingestion error.
    #[must_use]
    pub fn new(path: PathBuf, kind: IngestErrorKind, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            message: message.into(),
        }
    }

    /// Create an unsupported language error.
    #[must_use]
    pub fn unsupported_language(path: PathBuf) -> Self {
        let ext = path
            .extension()
            .map_or_else(|| "none".to_string(), |e| e.to_string_lossy().to_string());
        Self::new(
            path,
            IngestErrorKind::UnsupportedLanguage,
            format!("no extractor for extension: {ext}"),
        )
    }

    /// Classify a per-file [`Error`] into a collected ingestion error.
    #[must_use]
    pub fn from_error(path: PathBuf, error: &Error) -> Self {
        let kind = match error {
            Error::Extraction { .. } => IngestErrorKind::ExtractionFailed,
            Error::Config(_) => IngestErrorKind::InvalidPath,
            Error::Io(_) => IngestErrorKind::IoError,
            Error::Database(_)
            | Error::UnresolvedEndpoint(_)
            | Error::Transaction { .. }
            | Error::NotFound(_)
            | Error::Internal(_) => IngestErrorKind::TransactionFailed,
        };
        Self::new(path, kind, error.to_string())
    }
}
