use std::fmt;

/// Result type for pmctx-archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the archive file layer
#[derive(Debug)]
pub enum Error {
    /// IO operation failed
    Io(std::io::Error),

    /// No archive files exist under this name
    NotFound(String),

    /// Label record missing, truncated, or inconsistent with its siblings
    BadLabel(String),

    /// Metadata record could not be decoded
    BadMetadata(String),

    /// Archive has no usable data volume
    MissingVolume(String),

    /// Directory traversal error
    WalkDir(walkdir::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::NotFound(name) => write!(f, "No such archive: {}", name),
            Error::BadLabel(msg) => write!(f, "Bad archive label: {}", msg),
            Error::BadMetadata(msg) => write!(f, "Bad archive metadata: {}", msg),
            Error::MissingVolume(msg) => write!(f, "Missing archive volume: {}", msg),
            Error::WalkDir(err) => write!(f, "Directory traversal error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::NotFound(_)
            | Error::BadLabel(_)
            | Error::BadMetadata(_)
            | Error::MissingVolume(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::WalkDir(err)
    }
}
