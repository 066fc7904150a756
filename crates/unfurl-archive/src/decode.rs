//! Sequential gzip + tar decoding over an arbitrary byte source.

use std::cell::Cell;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use flate2::read::GzDecoder;
use tracing::warn;

use crate::entry::EntryKind;
use crate::error::{Error, Result};

/// Records whether the byte source itself has failed, so that decode
/// errors caused by a broken source are reported as upstream failures.
#[derive(Clone, Default)]
pub(crate) struct SourceHealth(Rc<Cell<bool>>);

impl SourceHealth {
    fn mark_failed(&self) {
        self.0.set(true);
    }

    pub(crate) fn classify(&self, err: io::Error) -> Error {
        if self.0.get() {
            Error::Upstream(err)
        } else {
            Error::Decode(err)
        }
    }
}

struct Tracked<R> {
    inner: R,
    health: SourceHealth,
}

impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|e| {
            if e.kind() != io::ErrorKind::Interrupted {
                self.health.mark_failed();
            }
        })
    }
}

/// An entry header plus its payload reader, valid until the next entry.
pub struct ArchiveEntry<'a> {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    pub mode: Option<u32>,
    pub payload: Payload<'a>,
}

pub struct Payload<'a> {
    reader: &'a mut dyn Read,
    health: &'a SourceHealth,
}

impl Payload<'_> {
    /// Copy the payload into `out`, keeping read and write failures apart.
    pub fn copy_to<W: Write>(&mut self, out: &mut W, path: &Path) -> Result<u64> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut written = 0u64;
        loop {
            let n = match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.health.classify(e)),
            };
            out.write_all(&buf[..n])
                .map_err(|source| Error::ExtractionFailed {
                    path: path.to_path_buf(),
                    source,
                })?;
            written += n as u64;
        }
        Ok(written)
    }
}

pub(crate) struct Decoder<R: Read> {
    archive: tar::Archive<GzDecoder<Tracked<R>>>,
    health: SourceHealth,
    skipped: usize,
}

impl<R: Read> Decoder<R> {
    pub(crate) fn new(source: R) -> Self {
        let health = SourceHealth::default();
        let tracked = Tracked {
            inner: source,
            health: health.clone(),
        };
        Self {
            archive: tar::Archive::new(GzDecoder::new(tracked)),
            health,
            skipped: 0,
        }
    }

    /// Entries of unsupported kinds seen so far.
    pub(crate) fn skipped(&self) -> usize {
        self.skipped
    }

    /// Visit directory and regular file entries in archive order.
    pub(crate) fn for_each_entry<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(ArchiveEntry<'_>) -> Result<()>,
    {
        let health = &self.health;
        let entries = self.archive.entries().map_err(|e| health.classify(e))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| health.classify(e))?;
            let header = entry.header();
            let entry_type = header.entry_type();
            let mode = header.mode().ok();
            let size = entry.size();
            // Pre-ustar archives mark directories only by a trailing slash.
            let legacy_dir = header.as_ustar().is_none()
                && entry_type.is_file()
                && entry.path_bytes().ends_with(b"/");
            let path = entry.path().map_err(|e| health.classify(e))?.into_owned();

            let kind = if entry_type.is_dir() || legacy_dir {
                EntryKind::Directory
            } else if entry_type.is_file() {
                EntryKind::File
            } else {
                warn!(path = %path.display(), kind = ?entry_type, "skipping unsupported entry");
                self.skipped += 1;
                continue;
            };

            visit(ArchiveEntry {
                path,
                kind,
                size,
                mode,
                payload: Payload {
                    reader: &mut entry,
                    health,
                },
            })?;
        }
        Ok(())
    }

    /// Consume the rest of the stream after the end-of-archive marker.
    ///
    /// This verifies the gzip trailer and lets the producer run to
    /// completion instead of stalling on a reader that went away.
    pub(crate) fn finish(self) -> Result<()> {
        let Decoder {
            archive, health, ..
        } = self;
        let mut decoder = archive.into_inner();
        io::copy(&mut decoder, &mut io::sink()).map_err(|e| health.classify(e))?;
        let mut source = decoder.into_inner();
        io::copy(&mut source, &mut io::sink()).map_err(|e| health.classify(e))?;
        Ok(())
    }
}
