//! # Loaders
//!
//! ## Design
//!
//! Three ways to turn a remote encoded image into decoded frames, all sharing
//! one [`LoadContext`] (fetcher, decoder handle, result emitter, config):
//!
//! - `single`: whole body, one decode, one result
//! - `streamed`: re-decode the growing buffer on every fragment
//! - `tiered`: one request per resolution level, emitted in level order
//!
//! ## Implementation
//!
//! Loaders return `Result<(), LoadError>` and only emit frames. Failures are
//! turned into a single failure message by [`LoadContext::dispatch`], so a
//! request reports at most one error whichever loader ran.

mod single;
mod streamed;
mod tiered;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::config::LoaderConfig;
use crate::decoder::{DecodedFrame, Decoder, DecoderHandle};
use crate::error::LoadError;
use crate::protocol::{DecodeFailure, DecodeRequest, DecodeResult, LoadMethod, WorkerMessage};
use crate::transport::{Fetcher, redact_url_for_log};

pub use single::load_single;
pub use streamed::load_streamed;
pub use tiered::load_tiered;

/// Sends results back to the caller.
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl Emitter {
    pub fn new(tx: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Emit one decoded frame; the pixel buffer moves to the receiver.
    pub fn frame(
        &self,
        request: &DecodeRequest,
        frame: DecodedFrame,
        fetch_time: Option<Duration>,
        level: Option<u32>,
    ) {
        self.send(WorkerMessage::Frame(DecodeResult {
            url: request.url.clone(),
            instance: request.instance.clone(),
            frame_info: frame.frame_info,
            buffer: frame.pixels,
            encoded_size: frame.encoded_size,
            fetch_time,
            decode_time: frame.decode_time,
            level,
            decomposition_data: frame.level_sizes,
        }));
    }

    pub fn failure(&self, url: &str, error: &LoadError) {
        self.send(WorkerMessage::Failure(DecodeFailure::new(url, error)));
    }

    fn send(&self, message: WorkerMessage) {
        if self.tx.send(message).is_err() {
            log::debug!("result receiver closed, dropping message");
        }
    }
}

/// Everything a loader needs for one request.
pub struct LoadContext<F, D> {
    pub fetcher: F,
    pub decoder: DecoderHandle<D>,
    pub emitter: Emitter,
    pub config: Arc<LoaderConfig>,
}

impl<F: Clone, D> Clone for LoadContext<F, D> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            decoder: self.decoder.clone(),
            emitter: self.emitter.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<F: Fetcher, D: Decoder> LoadContext<F, D> {
    pub fn new(fetcher: F, decoder: DecoderHandle<D>, emitter: Emitter, config: Arc<LoaderConfig>) -> Self {
        Self {
            fetcher,
            decoder,
            emitter,
            config,
        }
    }

    /// Route `request` to its loader and report a failure exactly once.
    pub async fn dispatch(&self, request: DecodeRequest) {
        let started = Instant::now();
        let method = request.load_method;
        log::info!(
            "🚀 {} load - URL: {}",
            method.as_str(),
            redact_url_for_log(&request.url)
        );

        let result = match method {
            LoadMethod::Single => load_single(self, &request).await,
            LoadMethod::Streamed => load_streamed(self, &request).await,
            LoadMethod::Tiered => load_tiered(self, &request).await,
        };

        match result {
            Ok(()) => log::info!(
                "✅ {} load finished - URL: {} total={}ms",
                method.as_str(),
                redact_url_for_log(&request.url),
                started.elapsed().as_millis()
            ),
            Err(err) => {
                log::warn!(
                    "⚠️ {} load failed - URL: {} [{}/{}] {}",
                    method.as_str(),
                    redact_url_for_log(&request.url),
                    err.stage(),
                    err.code(),
                    err
                );
                self.emitter.failure(&request.url, &err);
            }
        }
    }
}
