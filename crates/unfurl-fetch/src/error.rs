//! Error types for unfurl-fetch.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{url} answered with HTTP status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("{url} returned no response body")]
    EmptyBody { url: String },

    #[error("transfer from {url} did not finish within {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("archive reader stopped consuming the download")]
    ReaderClosed,
}

impl FetchError {
    pub(crate) fn network<E>(url: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FetchError::Network {
            url: url.to_owned(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
