use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed archive stream: {0}")]
    Decode(#[source] io::Error),

    #[error("archive source failed: {0}")]
    Upstream(#[source] io::Error),

    #[error("unsafe entry path '{entry}': {reason}")]
    UnsafePath { entry: PathBuf, reason: &'static str },

    #[error("entry '{path}' ended after {written} of {expected} bytes")]
    Truncated {
        path: PathBuf,
        expected: u64,
        written: u64,
    },

    #[error("failed to create directory: {path}: {source}")]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error("failed to extract '{path}': {source}")]
    ExtractionFailed { path: PathBuf, source: io::Error },
}

/// Where an extraction failure originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The archive bytes themselves are malformed or unsafe.
    Decode,
    /// The byte source failed before the archive ended.
    Upstream,
    /// The local filesystem refused an operation.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode(_) | Error::UnsafePath { .. } | Error::Truncated { .. } => {
                ErrorKind::Decode
            }
            Error::Upstream(_) => ErrorKind::Upstream,
            Error::DirectoryCreationFailed { .. } | Error::ExtractionFailed { .. } => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
