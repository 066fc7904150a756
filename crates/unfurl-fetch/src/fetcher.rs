use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::conduit::{ConduitWriter, UpstreamError};
use crate::error::{FetchError, Result};
use crate::http::{BodyStream, HttpClient};
use crate::options::FetchOptions;

/// Streams HTTP response bodies into a conduit.
pub struct Fetcher<C: HttpClient> {
    client: C,
    options: FetchOptions,
}

impl<C: HttpClient> Fetcher<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            options: FetchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    /// Send the request and validate the response head.
    ///
    /// Non-2xx statuses and bodiless responses are rejected before any
    /// bytes are handed to the caller.
    pub async fn open(&self, url: &str) -> Result<Download<C::Error>> {
        let deadline = self
            .options
            .timeout
            .map(|timeout| Deadline::after(url, timeout));

        debug!(url, "requesting archive");
        let response = within(deadline.as_ref(), self.client.get(url, &self.options.headers))
            .await?
            .map_err(|e| FetchError::network(url, e))?;

        if !(200..300).contains(&response.status) {
            return Err(FetchError::BadStatus {
                url: url.to_owned(),
                status: response.status,
            });
        }

        let body = response.body.ok_or_else(|| FetchError::EmptyBody {
            url: url.to_owned(),
        })?;

        info!(url, size = ?response.content_length, "download started");
        Ok(Download {
            url: url.to_owned(),
            body,
            deadline,
        })
    }

    /// Download `url` into `writer` and close it.
    ///
    /// The conduit is closed normally on success and closed with an
    /// [`UpstreamError`] carrying the failure text otherwise, so the
    /// reading side always terminates.
    pub async fn fetch_into(&self, url: &str, mut writer: ConduitWriter) -> Result<u64> {
        let result = match self.open(url).await {
            Ok(download) => download.pump(&mut writer).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) | Err(FetchError::ReaderClosed) => writer.close(),
            Err(e) => {
                writer
                    .close_with_error(UpstreamError::new(e.to_string()))
                    .await
            }
        }
        result
    }
}

/// An accepted response whose body has not been consumed yet.
pub struct Download<E> {
    url: String,
    body: BodyStream<E>,
    deadline: Option<Deadline>,
}

impl<E> Download<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Forward every body chunk into `writer`, in order.
    ///
    /// Returns the number of bytes forwarded. The writer is left open.
    pub async fn pump(mut self, writer: &mut ConduitWriter) -> Result<u64> {
        let mut transferred = 0u64;

        while let Some(chunk) = within(self.deadline.as_ref(), self.body.next()).await? {
            let chunk = chunk.map_err(|e| FetchError::network(&self.url, e))?;
            transferred += chunk.len() as u64;
            writer
                .send(chunk)
                .await
                .map_err(|_| FetchError::ReaderClosed)?;
        }

        debug!(url = %self.url, bytes = transferred, "download finished");
        Ok(transferred)
    }
}

struct Deadline {
    url: String,
    at: Instant,
    timeout: Duration,
}

impl Deadline {
    fn after(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_owned(),
            at: Instant::now() + timeout,
            timeout,
        }
    }
}

async fn within<F: Future>(deadline: Option<&Deadline>, fut: F) -> Result<F::Output> {
    match deadline {
        Some(d) => tokio::time::timeout_at(d.at, fut)
            .await
            .map_err(|_| FetchError::Timeout {
                url: d.url.clone(),
                timeout: d.timeout,
            }),
        None => Ok(fut.await),
    }
}
