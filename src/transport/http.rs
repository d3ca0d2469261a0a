//! # HTTP fetcher
//!
//! ## Design
//!
//! `reqwest`-backed [`Fetcher`]. One client is built per worker and reused for
//! every request, tier and stream.
//!
//! ## Implementation
//!
//! - Non-2xx responses fail with [`LoadError::Http`]; no retries here.
//! - `max_encoded_bytes` is checked against Content-Length up front and again
//!   while reading, since the header may be absent or wrong.
//! - Whole-body fetches use the request timeout; streams use the first-byte and
//!   per-chunk timeouts instead, as a slow progressive stream is legitimate.

use std::time::Duration;

use bytes::{Bytes, BytesMut};

use super::{ChunkStream, Fetcher, redact_url_for_log};
use crate::config::LoaderConfig;
use crate::error::LoadError;

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    request_timeout: Duration,
    first_byte_timeout: Duration,
    chunk_timeout: Duration,
    max_encoded_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &LoaderConfig) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| LoadError::Network(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            request_timeout: config.request_timeout(),
            first_byte_timeout: config.stream_first_byte_timeout(),
            chunk_timeout: config.stream_chunk_timeout(),
            max_encoded_bytes: config.max_encoded_bytes,
        })
    }

    async fn send(&self, url: &str, timeout: Option<Duration>) -> Result<reqwest::Response, LoadError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| LoadError::InvalidRequest(format!("malformed url: {}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(LoadError::InvalidRequest(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        log::debug!("📡 GET {}", redact_url_for_log(url));

        let mut request = self.client.get(parsed);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_reqwest_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("request failed").to_string(),
            });
        }

        if let Some(size) = Self::content_length(&response) {
            if size > self.max_encoded_bytes {
                return Err(Self::too_large(size, self.max_encoded_bytes));
            }
        }

        Ok(response)
    }

    fn content_length(response: &reqwest::Response) -> Option<u64> {
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|cl| cl.to_str().ok())
            .and_then(|cl| cl.parse::<u64>().ok())
    }

    fn too_large(size: u64, limit: u64) -> LoadError {
        LoadError::ResourceLimit(format!(
            "encoded body too large: {:.2} MB (limit {:.2} MB)",
            size as f64 / 1024.0 / 1024.0,
            limit as f64 / 1024.0 / 1024.0
        ))
    }

    fn map_reqwest_error(e: reqwest::Error, url: &str) -> LoadError {
        let msg = e.to_string().replace(url, &redact_url_for_log(url));

        if e.is_timeout() {
            LoadError::Timeout(format!("request timed out: {}", msg))
        } else if e.is_connect() {
            LoadError::Network(format!("cannot connect: {}", msg))
        } else {
            LoadError::Network(format!("request failed: {}", msg))
        }
    }
}

impl Fetcher for HttpFetcher {
    type Stream = HttpChunkStream;

    async fn fetch(&self, url: &str) -> Result<Bytes, LoadError> {
        let mut response = self.send(url, Some(self.request_timeout)).await?;

        let initial_capacity = Self::content_length(&response)
            .map(|len| len.min(self.max_encoded_bytes) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = BytesMut::with_capacity(initial_capacity);

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::map_reqwest_error(e, url))?
        {
            let total = (buffer.len() + chunk.len()) as u64;
            if total > self.max_encoded_bytes {
                return Err(Self::too_large(total, self.max_encoded_bytes));
            }
            buffer.extend_from_slice(&chunk);
        }

        log::debug!("✅ fetched {} bytes from {}", buffer.len(), redact_url_for_log(url));
        Ok(buffer.freeze())
    }

    async fn open_stream(&self, url: &str) -> Result<HttpChunkStream, LoadError> {
        let response = self.send(url, None).await?;

        Ok(HttpChunkStream {
            response,
            url: url.to_string(),
            received: 0,
            received_first_chunk: false,
            first_byte_timeout: self.first_byte_timeout,
            chunk_timeout: self.chunk_timeout,
            max_encoded_bytes: self.max_encoded_bytes,
        })
    }
}

/// Streamed response body.
pub struct HttpChunkStream {
    response: reqwest::Response,
    url: String,
    received: u64,
    received_first_chunk: bool,
    first_byte_timeout: Duration,
    chunk_timeout: Duration,
    max_encoded_bytes: u64,
}

impl ChunkStream for HttpChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, LoadError> {
        let after_first = self.received_first_chunk;
        let read_timeout = if after_first {
            self.chunk_timeout
        } else {
            self.first_byte_timeout
        };

        let next = tokio::time::timeout(read_timeout, self.response.chunk())
            .await
            .map_err(|_| {
                if after_first {
                    LoadError::Timeout("stream chunk read timed out".to_string())
                } else {
                    LoadError::Timeout("no first byte before timeout".to_string())
                }
            })?
            .map_err(|e| HttpFetcher::map_reqwest_error(e, &self.url))?;

        let Some(chunk) = next else {
            log::debug!("✅ stream complete - {} bytes", self.received);
            return Ok(None);
        };

        self.received_first_chunk = true;
        self.received = self.received.saturating_add(chunk.len() as u64);
        if self.received > self.max_encoded_bytes {
            return Err(HttpFetcher::too_large(self.received, self.max_encoded_bytes));
        }

        Ok(Some(chunk))
    }
}
