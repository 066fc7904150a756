//! HTTP streaming into a bounded, blocking-readable conduit.
//!
//! A [`Fetcher`] issues a GET through an [`HttpClient`], validates the
//! response head and forwards body chunks into a [`ConduitWriter`]. The
//! matching [`ConduitReader`] is a plain [`std::io::Read`] that a
//! synchronous consumer drains on a blocking thread. The conduit holds a
//! fixed number of chunks, so a slow consumer throttles the download.

pub mod conduit;
mod error;
mod fetcher;
mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod options;

pub use conduit::{Closed, ConduitReader, ConduitWriter, UpstreamError, pipe};
pub use error::{FetchError, Result};
pub use fetcher::{Download, Fetcher};
pub use http::{BodyStream, BoxStream, HttpClient, HttpResponse};
pub use options::FetchOptions;

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
