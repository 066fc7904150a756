use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};
use unfurl_archive::{ErrorKind, ExtractOptions, ExtractReport, Extractor};
use unfurl_fetch::{FetchError, Fetcher, HttpClient, pipe};

/// Chunks buffered between the download and the extractor.
pub const DEFAULT_BUFFER_CHUNKS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] unfurl_archive::Error),

    #[error("pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Downloads an archive and unpacks it while it is still arriving.
///
/// The fetch runs as a task on the runtime and the extraction on a
/// blocking thread; the two are joined by a bounded conduit.
pub struct DownloadExtractor<C: HttpClient> {
    fetcher: Arc<Fetcher<C>>,
    url: String,
    out_path: PathBuf,
    options: ExtractOptions,
    buffer_chunks: usize,
}

impl<C: HttpClient + 'static> DownloadExtractor<C> {
    pub fn new(fetcher: Fetcher<C>, url: impl Into<String>, out_path: impl Into<PathBuf>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            url: url.into(),
            out_path: out_path.into(),
            options: ExtractOptions::default(),
            buffer_chunks: DEFAULT_BUFFER_CHUNKS,
        }
    }

    /// Drop this many leading path segments from every entry.
    pub fn omit_top_dirs(mut self, count: usize) -> Self {
        self.options.strip_components = count;
        self
    }

    pub fn remove_on_fail(mut self, enabled: bool) -> Self {
        self.options.remove_on_fail = enabled;
        self
    }

    /// Replace the extraction options wholesale.
    pub fn extract_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    pub fn buffer_chunks(mut self, chunks: usize) -> Self {
        self.buffer_chunks = chunks;
        self
    }

    /// Run the download and the extraction to completion.
    ///
    /// When extraction stops because the download failed, the download's
    /// error is reported, since it names the root cause.
    pub async fn run(&self) -> Result<ExtractReport, PipelineError> {
        let (writer, reader) = pipe(self.buffer_chunks);

        let fetcher = Arc::clone(&self.fetcher);
        let url = self.url.clone();
        let fetch = tokio::spawn(async move { fetcher.fetch_into(&url, writer).await });

        let extractor = Extractor::new(self.out_path.clone(), self.options.clone());
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(reader)).await;

        if let Ok(Err(err)) = &extracted
            && err.kind() != ErrorKind::Upstream
        {
            // The reader is gone; a download still waiting on the network
            // would otherwise only notice on its next send.
            fetch.abort();
        }
        let fetched = fetch.await;

        match extracted? {
            Ok(report) => {
                let bytes = fetched??;
                info!(url = %self.url, bytes, files = report.files(), "archive unpacked");
                Ok(report)
            }
            Err(err) => {
                match fetched {
                    Ok(Err(fetch_err)) if err.kind() == ErrorKind::Upstream => {
                        return Err(PipelineError::Fetch(fetch_err));
                    }
                    Ok(Err(fetch_err)) => {
                        debug!(error = %fetch_err, "download stopped after extraction failed");
                    }
                    _ => {}
                }
                Err(PipelineError::Extract(err))
            }
        }
    }
}
