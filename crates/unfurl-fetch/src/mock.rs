//! In-memory [`HttpClient`] serving canned responses.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use futures_util::{StreamExt, stream};

use crate::http::{BodyStream, HttpClient, HttpResponse};

#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct MockError(pub String);

#[derive(Clone, Debug)]
enum Step {
    Data(Bytes),
    Fail(String),
}

/// A canned response for one URL.
#[derive(Clone, Debug)]
pub struct MockResponse {
    status: u16,
    body: Option<Vec<Step>>,
    stall: bool,
}

impl MockResponse {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::chunked([body])
    }

    pub fn chunked<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            status: 200,
            body: Some(chunks.into_iter().map(|c| Step::Data(c.into())).collect()),
            stall: false,
        }
    }

    /// A response with the given status and an empty body.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Some(Vec::new()),
            stall: false,
        }
    }

    pub fn no_body(status: u16) -> Self {
        Self {
            status,
            body: None,
            stall: false,
        }
    }

    /// Fail the body stream after the chunks queued so far.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.body
            .get_or_insert_with(Vec::new)
            .push(Step::Fail(message.into()));
        self
    }

    /// Never finish the body stream.
    pub fn then_stall(mut self) -> Self {
        self.stall = true;
        self
    }

    fn content_length(&self) -> Option<u64> {
        let steps = self.body.as_ref()?;
        if self.stall {
            return None;
        }
        steps
            .iter()
            .map(|s| match s {
                Step::Data(b) => Some(b.len() as u64),
                Step::Fail(_) => None,
            })
            .sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Routes exact URLs to canned responses; anything else fails like an
/// unreachable host.
#[derive(Default)]
pub struct MockClient {
    routes: HashMap<String, MockResponse>,
    requests: Mutex<Vec<MockRequest>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: impl Into<String>, response: MockResponse) -> Self {
        self.routes.insert(url.into(), response);
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl HttpClient for MockClient {
    type Error = MockError;

    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse<Self::Error>, Self::Error> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(MockRequest {
                url: url.to_owned(),
                headers: headers.to_vec(),
            });
        }

        let response = self
            .routes
            .get(url)
            .cloned()
            .ok_or_else(|| MockError(format!("no route to {url}")))?;

        let content_length = response.content_length();
        let stall = response.stall;
        let body = response.body.map(|steps| {
            let items = stream::iter(steps.into_iter().map(|step| match step {
                Step::Data(bytes) => Ok(bytes),
                Step::Fail(message) => Err(MockError(message)),
            }));
            let body: BodyStream<MockError> = if stall {
                Box::pin(items.chain(stream::pending()))
            } else {
                Box::pin(items)
            };
            body
        });

        Ok(HttpResponse {
            status: response.status,
            content_length,
            body,
        })
    }
}
