use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::decode::{ArchiveEntry, Decoder, Payload};
use crate::entry::{EntryKind, ExtractReport, ExtractedEntry};
use crate::error::{Error, Result};
use crate::options::{ExtractEvent, ExtractOptions};
use crate::sanitize::{resolve, strip_components};

const DEFAULT_FILE_MODE: u32 = 0o644;

/// Materializes a gzip-compressed tar stream under a destination root.
pub struct Extractor {
    destination: PathBuf,
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(destination: impl Into<PathBuf>, options: ExtractOptions) -> Self {
        Self {
            destination: destination.into(),
            options,
        }
    }

    /// Read `source` to its end, writing entries as they arrive.
    ///
    /// Nothing is buffered beyond the entry being copied. On failure, and
    /// when `remove_on_fail` is set, everything this run created is removed
    /// before the error is returned.
    pub fn extract<R: Read>(&self, source: R) -> Result<ExtractReport> {
        let mut rollback = Rollback::new(&self.destination);
        match self.run(source, &mut rollback) {
            Ok(report) => {
                info!(
                    destination = %self.destination.display(),
                    files = report.files(),
                    bytes = report.total_bytes,
                    "extraction complete"
                );
                Ok(report)
            }
            Err(err) => {
                if self.options.remove_on_fail && rollback.undo() {
                    self.options.emit(ExtractEvent::RolledBack {
                        path: absolute(&self.destination),
                    });
                }
                Err(err)
            }
        }
    }

    fn run<R: Read>(&self, source: R, rollback: &mut Rollback) -> Result<ExtractReport> {
        let mut decoder = Decoder::new(source);
        let mut report = ExtractReport::default();

        rollback.track(&self.destination);
        create_dir(&self.destination)?;

        decoder.for_each_entry(|entry| {
            let relative = strip_components(&entry.path, self.options.strip_components)?;
            match (entry.kind, relative) {
                (EntryKind::Directory, relative) => {
                    let target = resolve(&self.destination, relative.as_deref());
                    rollback.track(&target);
                    create_dir(&target)?;
                    report.entries.push(ExtractedEntry {
                        original_path: entry.path,
                        target_path: target,
                        kind: EntryKind::Directory,
                        size: 0,
                        mode: entry.mode,
                    });
                }
                (EntryKind::File, None) => {
                    warn!(
                        path = %entry.path.display(),
                        strip = self.options.strip_components,
                        "skipping file with no path left after stripping"
                    );
                    report.skipped += 1;
                }
                (EntryKind::File, Some(relative)) => {
                    let target = self.destination.join(relative);
                    rollback.track(&target);
                    let written = self.write_file(entry, &target, &mut report)?;
                    report.total_bytes += written;
                }
            }
            Ok(())
        })?;

        report.skipped += decoder.skipped();
        decoder.finish()?;
        Ok(report)
    }

    fn write_file(
        &self,
        entry: ArchiveEntry<'_>,
        target: &Path,
        report: &mut ExtractReport,
    ) -> Result<u64> {
        let ArchiveEntry {
            path,
            size,
            mode,
            mut payload,
            ..
        } = entry;

        if let Some(parent) = target.parent() {
            create_dir(parent)?;
        }

        let written = copy_into(&mut payload, target, mode)?;
        if written != size {
            return Err(Error::Truncated {
                path: path.clone(),
                expected: size,
                written,
            });
        }

        debug!(path = %target.display(), bytes = written, "wrote file");
        self.options.emit(ExtractEvent::FileWritten {
            path: absolute(target),
            bytes: written,
        });
        report.entries.push(ExtractedEntry {
            original_path: path,
            target_path: target.to_path_buf(),
            kind: EntryKind::File,
            size: written,
            mode,
        });
        Ok(written)
    }
}

fn copy_into(payload: &mut Payload<'_>, target: &Path, mode: Option<u32>) -> Result<u64> {
    let mut file = open_for_write(target, mode).map_err(|source| Error::ExtractionFailed {
        path: target.to_path_buf(),
        source,
    })?;
    payload.copy_to(&mut file, target)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| Error::DirectoryCreationFailed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn open_for_write(path: &Path, mode: Option<u32>) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode.unwrap_or(DEFAULT_FILE_MODE) & 0o7777)
        .open(path)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path, _mode: Option<u32>) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Remembers what an extraction run created so a failed run can undo it.
///
/// If the destination root did not exist beforehand the whole root is
/// owned by the run. Otherwise only top-level children that appeared
/// during the run are. Pre-existing files that the run overwrote are not
/// restored and stay behind with whatever was written into them.
struct Rollback {
    root: PathBuf,
    root_existed: bool,
    created: Vec<PathBuf>,
}

impl Rollback {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            root_existed: root.symlink_metadata().is_ok(),
            created: Vec::new(),
        }
    }

    /// Call before creating `path`.
    fn track(&mut self, path: &Path) {
        if !self.root_existed {
            return;
        }
        let Some(first) = path
            .strip_prefix(&self.root)
            .ok()
            .and_then(|rel| rel.components().next())
        else {
            return;
        };
        let child = self.root.join(first);
        if !self.created.contains(&child) && child.symlink_metadata().is_err() {
            self.created.push(child);
        }
    }

    /// Remove everything tracked. Returns true when something was removed
    /// and the run left nothing behind. Failures are logged and never
    /// replace the original error.
    fn undo(self) -> bool {
        let owned = if self.root_existed {
            self.created
        } else {
            vec![self.root]
        };

        let mut clean = true;
        let mut removed = 0usize;
        for path in &owned {
            match unfurl_fs::remove_tree(path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove partially extracted path");
                    clean = false;
                }
            }
        }
        if removed == 0 {
            return false;
        }
        if clean {
            info!(paths = removed, "removed partially extracted files");
        }
        clean
    }
}
