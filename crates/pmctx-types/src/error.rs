use std::fmt;

/// Result type for pmctx-types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types raised while parsing client-supplied values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed target string or attribute list
    BadSpecification(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadSpecification(msg) => write!(f, "Bad specification: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
