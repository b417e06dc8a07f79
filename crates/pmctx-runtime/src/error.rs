use crate::transport::TransportError;
use pmctx_types::{ContextHandle, Timeval};
use std::fmt;
use std::time::Duration;

/// Result type for pmctx-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types returned by context operations
#[derive(Debug)]
pub enum Error {
    /// Handle does not name a live context
    NoSuchContext(ContextHandle),

    /// This thread has no current context
    NoContext,

    /// Malformed target string or attributes
    BadSpecification(String),

    /// Initial connection to a live source failed
    ConnectFailed(String),

    /// Reconnect attempted before the backoff delay elapsed
    TooSoonToRetry { wait: Duration },

    /// Reconnect attempted and failed; next attempt allowed after `retry_in`
    ReconnectFailed { reason: String, retry_in: Duration },

    /// Context table could not grow
    OutOfMemory,

    /// Every handle value has been issued
    HandlesExhausted,

    /// Archive open/read/seek failure
    LogFile(pmctx_archive::Error),

    /// Two archives in a chain start at the same instant
    OverlappingArchives {
        existing: String,
        conflicting: String,
        start: Timeval,
    },

    /// Operation not permitted once more than one thread uses the registry
    ThreadingRestriction(String),

    /// Operation needs a live host context
    NotHost(ContextHandle),

    /// Operation needs an archive context
    NotArchive(ContextHandle),

    /// Configuration error
    Config(String),

    /// IO operation failed
    Io(std::io::Error),
}

impl Error {
    /// True for the errors a reconnect loop should wait out.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::TooSoonToRetry { .. } | Error::ReconnectFailed { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoSuchContext(handle) => write!(f, "No such context: {}", handle),
            Error::NoContext => write!(f, "No current context"),
            Error::BadSpecification(msg) => write!(f, "Bad specification: {}", msg),
            Error::ConnectFailed(msg) => write!(f, "Connection failed: {}", msg),
            Error::TooSoonToRetry { wait } => write!(
                f,
                "Too soon to retry connection (wait another {}s)",
                wait.as_secs()
            ),
            Error::ReconnectFailed { reason, retry_in } => write!(
                f,
                "Reconnect failed: {} (next attempt in {}s)",
                reason,
                retry_in.as_secs()
            ),
            Error::OutOfMemory => write!(f, "Out of memory growing the context table"),
            Error::HandlesExhausted => write!(f, "No more context handles available"),
            Error::LogFile(err) => write!(f, "Archive error: {}", err),
            Error::OverlappingArchives {
                existing,
                conflicting,
                start,
            } => write!(
                f,
                "Archives {} and {} overlap (both start at {})",
                existing, conflicting, start
            ),
            Error::ThreadingRestriction(msg) => write!(f, "Threading restriction: {}", msg),
            Error::NotHost(handle) => write!(f, "Context {} is not a host context", handle),
            Error::NotArchive(handle) => {
                write!(f, "Context {} is not an archive context", handle)
            }
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::LogFile(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<pmctx_archive::Error> for Error {
    fn from(err: pmctx_archive::Error) -> Self {
        Error::LogFile(err)
    }
}

impl From<pmctx_types::Error> for Error {
    fn from(err: pmctx_types::Error) -> Self {
        match err {
            pmctx_types::Error::BadSpecification(msg) => Error::BadSpecification(msg),
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::TooSoon(wait) => Error::TooSoonToRetry { wait },
            TransportError::Failed(msg) => Error::ConnectFailed(msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}
