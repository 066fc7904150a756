use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Body stream yielded by an [`HttpClient`].
pub type BodyStream<E> = BoxStream<'static, Result<Bytes, E>>;

/// Response head plus the streaming body, if the server sent one.
pub struct HttpResponse<E> {
    pub status: u16,
    pub content_length: Option<u64>,
    /// `None` when the response carries no body at all (e.g. 204).
    pub body: Option<BodyStream<E>>,
}

impl<E> std::fmt::Debug for HttpResponse<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("body", &self.body.as_ref().map(|_| "<stream>"))
            .finish()
    }
}

/// Asynchronous HTTP client abstraction.
///
/// Implementations follow redirects themselves and report the final
/// status; the [`Fetcher`](crate::Fetcher) decides what counts as success.
pub trait HttpClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issue a GET and return as soon as the response head is available.
    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<HttpResponse<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;

    /// Production HTTP client implementation using reqwest.
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new() -> Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder()
                .user_agent(concat!("unfurl/", env!("CARGO_PKG_VERSION")))
                .build()?;
            Ok(Self { client })
        }

        pub fn from_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn get(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> Result<HttpResponse<Self::Error>, Self::Error> {
            let mut request = self.client.get(url);

            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = request.send().await?;
            let status = response.status();
            let content_length = response.content_length();

            let body: Option<BodyStream<Self::Error>> =
                if status == reqwest::StatusCode::NO_CONTENT || content_length == Some(0) {
                    None
                } else {
                    Some(Box::pin(response.bytes_stream()))
                };

            Ok(HttpResponse {
                status: status.as_u16(),
                content_length,
                body,
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
