use std::io;

use http::StatusCode;

/// Failure modes of [`crate::range::ByteRangeParser`].
#[derive(Debug, thiserror::Error)]
pub enum RangeError {
    #[error("unsupported range unit")]
    UnsupportedUnits,
    #[error("malformed range header")]
    Malformed,
    #[error("range start {start} is at or past content length {len}")]
    StartOutOfRange { start: u64, len: u64 },
    #[error("range end {end} precedes start {start}")]
    InvertedRange { start: u64, end: u64 },
}

/// Every fallible outcome surfaced by the static-file serving core.
#[derive(Debug, thiserror::Error)]
pub enum StaticFileError {
    #[error("path contains a NUL byte")]
    NulByte,

    #[error("rewritten path escapes the configured root")]
    PathTraversal,

    #[error("{0}")]
    Range(#[from] RangeError),

    #[error("no such file or directory")]
    NotFound,

    #[error("access to this path is not permitted")]
    Forbidden,

    #[error("directory listing requested but index generation is disabled")]
    DirectoryIndexRequired,

    #[error("permission denied while creating compressed sidecar")]
    NoCreatePermission,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StaticFileError {
    /// Maps an error kind to the HTTP status the handler should emit.
    ///
    /// Kept as a single source of truth so the handler and the CLI's
    /// error-to-response glue never disagree.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StaticFileError::NulByte => StatusCode::BAD_REQUEST,
            StaticFileError::PathTraversal => StatusCode::INTERNAL_SERVER_ERROR,
            StaticFileError::Range(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            StaticFileError::NotFound => StatusCode::NOT_FOUND,
            StaticFileError::Forbidden => StatusCode::FORBIDDEN,
            StaticFileError::DirectoryIndexRequired => StatusCode::FORBIDDEN,
            StaticFileError::NoCreatePermission => StatusCode::INTERNAL_SERVER_ERROR,
            StaticFileError::Io(err) => match err.kind() {
                io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
                io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, StaticFileError>;
