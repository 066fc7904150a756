//! Filesystem side of an unfurl run: moving a staged tree into place and
//! removing trees on cleanup.

mod error;
mod install;
mod remove;

pub use error::{Error, Result};
pub use install::{
    BACKUP_SUFFIX, DirOps, InstallOutcome, InstallPlan, InstallState, STAGING_SUFFIX, StdDirOps,
    install, install_with,
};
pub use remove::remove_tree;
