//! Streaming archive installer.
//!
//! Downloads a gzip-compressed tar archive over HTTP, unpacks it while the
//! bytes are still arriving, and swaps the result into place with a
//! backup-and-restore rename sequence.

pub mod app;
pub mod cli;
pub mod logging;
pub mod pipeline;
pub mod signal;

pub use pipeline::{DEFAULT_BUFFER_CHUNKS, DownloadExtractor, PipelineError};
