//! # Transport
//!
//! ## Design
//!
//! Loaders never talk to an HTTP client directly: they go through [`Fetcher`],
//! which offers the two consumption shapes the loaders need (whole body and
//! fragment stream). Retry and redirect policy stay inside the implementation.
//!
//! ## Implementation
//!
//! - Trait methods return `Send` futures so loaders can run on spawned tasks
//!   and tier fetches can run concurrently.
//! - [`HttpFetcher`] is the production implementation over `reqwest`.

mod http;

use std::future::Future;

use bytes::Bytes;

use crate::error::LoadError;

pub use http::{HttpChunkStream, HttpFetcher};

/// Fetch primitive consumed by the loaders.
pub trait Fetcher: Clone + Send + Sync + 'static {
    type Stream: ChunkStream;

    /// Fetch the complete body of `url`.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Bytes, LoadError>> + Send;

    /// Open `url` as a stream of body fragments.
    fn open_stream(&self, url: &str) -> impl Future<Output = Result<Self::Stream, LoadError>> + Send;
}

/// Body fragments in arrival order.
pub trait ChunkStream: Send {
    /// Next fragment, or `None` once the body is complete.
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Bytes>, LoadError>> + Send;
}

/// Strip query and fragment from a URL before it reaches the logs.
///
/// Tier and signed URLs carry credentials in the query string.
pub fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = parsed.path();

    format!("{}://{}{}{}", parsed.scheme(), host, port, path)
}
