// Error types for the resolve -> select -> fetch -> finalize pipeline

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::diagnostics::BlockingReason;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Empty or malformed URL
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The media source could not produce a catalog for the URL
    #[error("Lookup failed for {url}: {message}")]
    LookupFailure {
        url: String,
        message: String,
        reason: Option<BlockingReason>,
    },

    /// The catalog has no stream satisfying the requested format
    #[error("No matching stream: {0}")]
    NoMatchingStream(String),

    /// The selected stream could not be written to disk
    #[error("Transfer failed: {0}")]
    TransferFailure(String),

    /// The destination directory could not be prepared
    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The download finished but the mp3 rename did not.
    /// `downloaded` still points at the intact file.
    #[error("Rename of {} failed: {source}", .downloaded.display())]
    RenameFailure {
        downloaded: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download cancelled")]
    Cancelled,
}

/// Coarse classification shown by the shell next to the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    LookupFailure,
    NoMatchingStream,
    TransferFailure,
    Filesystem,
    RenameFailure,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid-input",
            Self::LookupFailure => "lookup-failed",
            Self::NoMatchingStream => "stream-not-found",
            Self::TransferFailure => "transfer-failed",
            Self::Filesystem => "filesystem-error",
            Self::RenameFailure => "rename-failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::LookupFailure { .. } => ErrorKind::LookupFailure,
            Self::NoMatchingStream(_) => ErrorKind::NoMatchingStream,
            Self::TransferFailure(_) => ErrorKind::TransferFailure,
            Self::Filesystem { .. } => ErrorKind::Filesystem,
            Self::RenameFailure { .. } => ErrorKind::RenameFailure,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Build a lookup failure, classifying raw tool output on the way
    pub fn lookup(url: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let reason = super::diagnostics::diagnose_error(&message);
        Self::LookupFailure {
            url: url.to_string(),
            message,
            reason,
        }
    }

    /// Suggestion text for lookup failures with a known blocking reason
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::LookupFailure {
                reason: Some(reason),
                ..
            } => Some(reason.suggestion()),
            _ => None,
        }
    }

    /// CLI flags that may get a blocked lookup through
    pub fn retry_hints(&self) -> Vec<&'static str> {
        match self {
            Self::LookupFailure {
                reason: Some(reason),
                ..
            } => reason.retry_hints(),
            _ => Vec::new(),
        }
    }
}
