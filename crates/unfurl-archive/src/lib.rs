//! Streaming extraction of gzip-compressed tar archives.
//!
//! The [`Extractor`] pulls bytes from any [`std::io::Read`], decodes entries
//! in archive order and writes them beneath a destination root. It never
//! needs the whole archive at once and never seeks.
//!
//! Entry paths are sanitized before anything touches the disk: segments
//! that climb out of the destination or absolute paths abort the run.
//! A configurable number of leading segments can be dropped.

mod decode;
pub mod entry;
mod error;
mod extract;
pub mod options;
mod sanitize;

pub use decode::{ArchiveEntry, Payload};
pub use entry::{EntryKind, ExtractReport, ExtractedEntry};
pub use error::{Error, ErrorKind, Result};
pub use extract::Extractor;
pub use options::{EventCallback, ExtractEvent, ExtractOptions};
pub use sanitize::{resolve, strip_components};
