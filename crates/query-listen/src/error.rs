use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Canonical status codes a sync engine reports for a failed listen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    NotFound,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    Unavailable,
    Internal,
    Unauthenticated,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
            Self::InvalidArgument => "invalid-argument",
            Self::NotFound => "not-found",
            Self::PermissionDenied => "permission-denied",
            Self::ResourceExhausted => "resource-exhausted",
            Self::FailedPrecondition => "failed-precondition",
            Self::Aborted => "aborted",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ListenError
// ---------------------------------------------------------------------------

/// A subscription failure reported by the sync engine.
///
/// Delivered to the user callback as the final event of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Listen failed ({code}): {message}")]
pub struct ListenError {
    pub code: ErrorCode,
    pub message: String,
}

impl ListenError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Outcome delivered to listeners: a payload or a terminal error.
pub type ListenResult<T> = std::result::Result<T, ListenError>;

// ---------------------------------------------------------------------------
// ClientError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Client has been terminated")]
    Terminated,

    #[error(transparent)]
    Listen(#[from] ListenError),

    #[error("Failed to start dispatch executor: {0}")]
    Executor(#[from] std::io::Error),
}

/// Convenience alias: the default error type is `ClientError`.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
