//! Error taxonomy for the virtual filesystem core.
//!
//! Each concern (crypto, streaming, archive analysis, catalog, filesystem
//! surface) owns its own error enum; this module re-exports them and ties
//! them together under [`NzbFsError`] for call sites that need a single
//! error type (e.g. the filesystem surface's `read`/`seek`/`open`).

use std::fmt;

pub use crate::archive::analyzer::ArchiveError;
pub use crate::crypto::keys::KeyError;
pub use crate::reader::decrypt::DecryptError;
pub use crate::reader::usenet::UsenetReadError;
pub use crate::reader::virtual_file::VirtualFileError;

/// Context attached to an error: what was being done, and to which file.
///
/// A small, cheaply cloned struct carrying optional breadcrumbs, rendered
/// only when an error actually occurs.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub path: Option<String>,
    pub operation: Option<&'static str>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.operation, &self.path) {
            (Some(op), Some(path)) => write!(f, "{op} on {path}"),
            (Some(op), None) => write!(f, "{op}"),
            (None, Some(path)) => write!(f, "on {path}"),
            (None, None) => write!(f, "(no context)"),
        }
    }
}

/// Top-level error for the read path and import path.
///
/// State, capability, and import-time kinds from spec §7 that don't
/// already live in a submodule error enum are flattened here directly.
#[derive(thiserror::Error, Debug)]
pub enum NzbFsError {
    #[error("virtual file not initialized for {context}")]
    VirtualFileNotInitialized { context: ErrorContext },

    #[error("no NZB data available for {context}")]
    NoNzbData { context: ErrorContext },

    #[error("no connection pool available for {context}")]
    NoConnectionPool { context: ErrorContext },

    #[error("cannot read directory at {context}")]
    CannotReadDirectory { context: ErrorContext },

    #[error("not a directory: {context}")]
    NotADirectory { context: ErrorContext },

    #[error("operation not supported: {0}")]
    WriteNotSupported(&'static str),

    #[error("truncate not supported")]
    TruncateNotSupported,

    #[error("read_at not supported on virtual files (use the streaming range reader)")]
    ReadAtNotSupported,

    #[error("decryption error: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("usenet read error: {0}")]
    UsenetRead(#[from] UsenetReadError),

    #[error("virtual file error: {0}")]
    VirtualFile(#[from] VirtualFileError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("deadline exceeded for {context}")]
    DeadlineExceeded { context: ErrorContext },
}
