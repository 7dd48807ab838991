use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

/// Closed set of reasons a single send can fail.
///
/// The send primitive classifies its failure once, at the transport boundary,
/// so retry decisions dispatch on this tag instead of inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused/reset, TLS handshake failure, DNS failure
    Connection,
    /// The transport gave up waiting on the server
    Timeout,
    /// 4xx reply from the server
    TemporaryRejection,
    /// Recipient address could not be parsed or was refused as malformed
    InvalidAddress,
    /// 5xx reply from the server
    PermanentRejection,
    /// Credentials refused
    Authentication,
    /// The message itself could not be rendered or built
    Message,
    /// The run was cancelled before this record finished
    Cancelled,
    /// Anything the classifier did not recognise
    Unclassified,
}

impl ErrorKind {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Unknown failures are treated as permanent so they never loop.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Timeout | Self::TemporaryRejection
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::TemporaryRejection => "temporary_rejection",
            Self::InvalidAddress => "invalid_address",
            Self::PermanentRejection => "permanent_rejection",
            Self::Authentication => "authentication",
            Self::Message => "message",
            Self::Cancelled => "cancelled",
            Self::Unclassified => "unclassified",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified send failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct SendError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "run cancelled before the record was sent")
    }
}

/// Invalid run parameters, detected before any dispatch starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than 0")]
    NotPositive { field: &'static str },
    #[error("{field} must be between 0 and 1, got {value}")]
    OutOfRange { field: &'static str, value: String },
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("file configured for {field} not found at '{}'", path.display())]
    FileNotFound { field: &'static str, path: PathBuf },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failures while reading a contact source.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("contact file not found at: {}", .0.display())]
    NotFound(PathBuf),
    #[error("contact file is empty: {}", .0.display())]
    Empty(PathBuf),
    #[error("data is missing required columns {missing:?}; must include 'Name', 'Company', and 'Email'")]
    MissingColumns { missing: Vec<&'static str> },
    #[error("no valid contact data extracted from {}", .0.display())]
    NoRecords(PathBuf),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reasons a single contact row is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("email is empty")]
    MissingEmail,
    #[error("invalid email: {0}")]
    InvalidEmail(String),
}
