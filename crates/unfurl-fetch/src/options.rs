use std::time::Duration;

/// Request configuration for a [`Fetcher`](crate::Fetcher).
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Deadline covering the request and every wait on the body stream.
    pub timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
}

impl FetchOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}
