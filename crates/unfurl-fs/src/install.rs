//! Move a staged directory into place, keeping the previous one recoverable.
//!
//! The sequence is the classic rename dance:
//!
//! 1. `target` -> `backup` (only when `target` exists)
//! 2. `staging` -> `target`
//! 3. remove `backup`
//!
//! If step 2 fails, `backup` is renamed back to `target`. Renames are not
//! transactional, so that last rename can itself fail; that case is reported
//! as [`Error::RestoreFailed`] and names the path still holding the previous
//! contents.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Suffix appended to the target to form the staging path.
pub const STAGING_SUFFIX: &str = ".tmp";

/// Suffix appended to the target to form the backup path.
pub const BACKUP_SUFFIX: &str = "~";

/// The three paths involved in one install.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallPlan {
    target: PathBuf,
    staging: PathBuf,
    backup: PathBuf,
}

impl InstallPlan {
    /// Plan an install of `target` using [`STAGING_SUFFIX`] and [`BACKUP_SUFFIX`].
    pub fn for_target(target: impl Into<PathBuf>) -> Result<Self> {
        Self::with_suffixes(target, STAGING_SUFFIX, BACKUP_SUFFIX)
    }

    pub fn with_suffixes(
        target: impl Into<PathBuf>,
        staging_suffix: &str,
        backup_suffix: &str,
    ) -> Result<Self> {
        let raw = target.into();
        if !matches!(raw.components().next_back(), Some(Component::Normal(_))) {
            return Err(Error::InvalidTarget {
                path: raw,
                reason: "path must end in a directory name",
            });
        }
        for suffix in [staging_suffix, backup_suffix] {
            if suffix.is_empty() || suffix.chars().any(std::path::is_separator) {
                return Err(Error::InvalidTarget {
                    path: raw,
                    reason: "suffixes must be non-empty and contain no separator",
                });
            }
        }
        if staging_suffix == backup_suffix {
            return Err(Error::InvalidTarget {
                path: raw,
                reason: "staging and backup suffixes must differ",
            });
        }

        // Rebuilding from components drops a trailing separator, so the
        // suffix lands on the name instead of creating a child entry.
        let target: PathBuf = raw.components().collect();
        let staging = with_suffix(&target, staging_suffix);
        let backup = with_suffix(&target, backup_suffix);

        Ok(Self {
            target,
            staging,
            backup,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Filesystem operations the install transaction relies on.
pub trait DirOps {
    fn exists(&self, path: &Path) -> bool;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_tree(&self, path: &Path) -> io::Result<bool>;
}

/// [`DirOps`] backed by `std::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDirOps;

impl DirOps for StdDirOps {
    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_tree(&self, path: &Path) -> io::Result<bool> {
        crate::remove_tree(path)
    }
}

/// States of the install transaction, as reported in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallState {
    NoPriorTarget,
    PriorTargetBackedUp,
    Committed,
    Failed,
    Restored,
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallState::NoPriorTarget => write!(f, "no-prior-target"),
            InstallState::PriorTargetBackedUp => write!(f, "prior-target-backed-up"),
            InstallState::Committed => write!(f, "committed"),
            InstallState::Failed => write!(f, "failed"),
            InstallState::Restored => write!(f, "restored"),
        }
    }
}

/// Successful install results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Nothing lived at the target before.
    Fresh,
    /// A previous target was replaced. `backup_removed` is false when the
    /// backup could not be deleted afterwards.
    Replaced { backup_removed: bool },
}

/// Install `plan.staging()` at `plan.target()` using the real filesystem.
pub fn install(plan: &InstallPlan) -> Result<InstallOutcome> {
    install_with(plan, &StdDirOps)
}

pub fn install_with<O: DirOps + ?Sized>(plan: &InstallPlan, ops: &O) -> Result<InstallOutcome> {
    let InstallPlan {
        target,
        staging,
        backup,
    } = plan;

    if !ops.exists(target) {
        debug!(state = %InstallState::NoPriorTarget, target = %target.display());
        if ops.exists(backup) {
            warn!(
                backup = %backup.display(),
                "leftover backup from an earlier install is left untouched"
            );
        }

        ops.rename(staging, target).map_err(|source| {
            debug!(state = %InstallState::Failed, staging = %staging.display());
            Error::Rename {
                from: staging.clone(),
                to: target.clone(),
                source,
            }
        })?;

        info!(state = %InstallState::Committed, target = %target.display());
        return Ok(InstallOutcome::Fresh);
    }

    if ops.exists(backup) {
        warn!(backup = %backup.display(), "removing stale backup");
        ops.remove_tree(backup).map_err(|source| Error::Remove {
            path: backup.clone(),
            source,
        })?;
    }

    ops.rename(target, backup).map_err(|source| Error::Rename {
        from: target.clone(),
        to: backup.clone(),
        source,
    })?;
    debug!(state = %InstallState::PriorTargetBackedUp, backup = %backup.display());

    let source = match ops.rename(staging, target) {
        Ok(()) => {
            let backup_removed = match ops.remove_tree(backup) {
                Ok(_) => true,
                Err(e) => {
                    warn!(backup = %backup.display(), error = %e, "failed to delete old directory");
                    false
                }
            };
            info!(state = %InstallState::Committed, target = %target.display());
            return Ok(InstallOutcome::Replaced { backup_removed });
        }
        Err(source) => source,
    };

    match ops.rename(backup, target) {
        Ok(()) => {
            if let Err(e) = ops.remove_tree(staging) {
                warn!(staging = %staging.display(), error = %e, "failed to delete staged directory");
            }
            info!(state = %InstallState::Restored, target = %target.display());
            Err(Error::CommitFailed {
                staging: staging.clone(),
                target: target.clone(),
                source,
            })
        }
        Err(restore_error) => {
            error!(
                state = %InstallState::Failed,
                backup = %backup.display(),
                "previous contents could not be moved back into place"
            );
            Err(Error::RestoreFailed {
                target: target.clone(),
                backup: backup.clone(),
                source,
                restore_error,
            })
        }
    }
}
