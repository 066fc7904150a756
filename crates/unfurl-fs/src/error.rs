use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid install target '{path}': {reason}")]
    InvalidTarget { path: PathBuf, reason: &'static str },

    #[error("failed to rename '{from}' to '{to}': {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// The staged tree could not be moved into place, but the previous
    /// target was moved back under its original name.
    #[error("failed to move '{staging}' into '{target}': {source} (previous contents restored)")]
    CommitFailed {
        staging: PathBuf,
        target: PathBuf,
        source: io::Error,
    },

    /// The staged tree could not be moved into place and the previous target
    /// could not be moved back. Its contents remain at `backup`.
    #[error(
        "failed to move staged tree into '{target}': {source}; restoring the previous contents also failed: {restore_error}; they remain at '{backup}'"
    )]
    RestoreFailed {
        target: PathBuf,
        backup: PathBuf,
        source: io::Error,
        restore_error: io::Error,
    },

    #[error("failed to remove '{path}': {source}")]
    Remove { path: PathBuf, source: io::Error },
}

impl Error {
    /// True when the previous target no longer lives under its original name.
    pub fn is_data_loss_risk(&self) -> bool {
        matches!(self, Self::RestoreFailed { .. })
    }

    /// Path that needs manual attention, if any.
    pub fn at_risk_path(&self) -> Option<&PathBuf> {
        match self {
            Self::RestoreFailed { backup, .. } => Some(backup),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
