//! # Dispatch
//!
//! ## Design
//!
//! The decoder is built asynchronously, and requests may arrive before it is
//! ready. Requests therefore go into an ordered queue; a single dispatcher
//! task waits for the decoder once, then hands queued and later requests to
//! their loaders in arrival order. Nothing is dropped while waiting.
//!
//! ## Implementation
//!
//! ```text
//! submit() ──▶ mpsc queue ──▶ dispatcher: await init (once)
//!                                   │
//!                                   └─▶ spawn LoadContext::dispatch(request) per request
//! ```
//!
//! - Readiness is published on a `watch` channel so callers can also await it.
//! - If the decoder fails to initialize, every request gets a `worker` failure.
//! - Each request runs as its own task; decode passes stay serialized by the
//!   decoder handle's lock.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::LoaderConfig;
use crate::decoder::{Decoder, DecoderHandle};
use crate::error::LoadError;
use crate::loader::{Emitter, LoadContext};
use crate::protocol::{DecodeRequest, WorkerMessage};
use crate::transport::{Fetcher, redact_url_for_log};

/// Decoder initialization state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

/// Handle to a running worker.
pub struct Worker {
    requests: mpsc::UnboundedSender<DecodeRequest>,
    emitter: Emitter,
    readiness: watch::Receiver<Readiness>,
    dispatcher: JoinHandle<()>,
}

impl Worker {
    /// Start a worker whose decoder comes from `init`.
    ///
    /// Returns the worker and the receiver for every result it produces.
    pub fn start<F, D, I>(
        fetcher: F,
        config: LoaderConfig,
        init: I,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerMessage>)
    where
        F: Fetcher,
        D: Decoder,
        I: Future<Output = Result<D, LoadError>> + Send + 'static,
    {
        let (emitter, results) = Emitter::channel();
        let (requests, queue) = mpsc::unbounded_channel();
        let (ready_tx, readiness) = watch::channel(Readiness::Pending);

        let dispatcher = tokio::spawn(run_dispatcher(
            fetcher,
            Arc::new(config),
            init,
            emitter.clone(),
            queue,
            ready_tx,
        ));

        let worker = Self {
            requests,
            emitter,
            readiness,
            dispatcher,
        };
        (worker, results)
    }

    /// Queue a request. Safe to call before the decoder is ready.
    pub fn submit(&self, request: DecodeRequest) -> Result<(), LoadError> {
        self.requests
            .send(request)
            .map_err(|_| LoadError::Worker("dispatcher has stopped".to_string()))
    }

    /// Parse one JSON request line and queue it.
    ///
    /// A line that does not parse but still names a `url` gets one
    /// `invalid_request` failure for that url; anything else is logged and
    /// skipped.
    pub fn submit_line(&self, line: &str) -> Result<(), LoadError> {
        match DecodeRequest::from_json(line) {
            Ok(request) => self.submit(request),
            Err(err) => {
                match DecodeRequest::url_of_rejected(line) {
                    Some(url) => {
                        log::warn!("⚠️ rejected request - URL: {} {}", redact_url_for_log(&url), err);
                        self.emitter.failure(&url, &err);
                    }
                    None => log::warn!("⚠️ skipping request line: {}", err),
                }
                Ok(())
            }
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.borrow().clone()
    }

    /// Wait for decoder initialization to settle.
    pub async fn wait_ready(&self) -> Result<(), LoadError> {
        let mut readiness = self.readiness.clone();
        let state = readiness
            .wait_for(|state| *state != Readiness::Pending)
            .await
            .map_err(|_| LoadError::Worker("dispatcher has stopped".to_string()))?
            .clone();

        match state {
            Readiness::Failed(reason) => Err(LoadError::Worker(reason)),
            _ => Ok(()),
        }
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn shutdown(self) -> Result<(), LoadError> {
        drop(self.requests);
        self.dispatcher
            .await
            .map_err(|e| LoadError::Worker(format!("dispatcher task failed: {}", e)))
    }
}

async fn run_dispatcher<F, D, I>(
    fetcher: F,
    config: Arc<LoaderConfig>,
    init: I,
    emitter: Emitter,
    mut queue: mpsc::UnboundedReceiver<DecodeRequest>,
    ready_tx: watch::Sender<Readiness>,
) where
    F: Fetcher,
    D: Decoder,
    I: Future<Output = Result<D, LoadError>> + Send + 'static,
{
    let decoder = match init.await {
        Ok(decoder) => {
            log::info!("decoder ready, {} request(s) queued", queue.len());
            ready_tx.send_replace(Readiness::Ready);
            decoder
        }
        Err(err) => {
            log::error!("decoder initialization failed: {}", err);
            ready_tx.send_replace(Readiness::Failed(err.to_string()));
            let err = LoadError::Worker(format!("decoder unavailable: {}", err));
            while let Some(request) = queue.recv().await {
                emitter.failure(&request.url, &err);
            }
            return;
        }
    };

    let decoder = DecoderHandle::with_level_ceiling(decoder, config.max_decomposition_levels);
    let ctx = LoadContext::new(fetcher, decoder, emitter, config);
    let mut in_flight = JoinSet::new();

    while let Some(request) = queue.recv().await {
        log::debug!("dispatching {}", redact_url_for_log(&request.url));
        let ctx = ctx.clone();
        in_flight.spawn(async move { ctx.dispatch(request).await });

        while let Some(finished) = in_flight.try_join_next() {
            if let Err(err) = finished {
                log::error!("request task failed: {}", err);
            }
        }
    }

    while let Some(finished) = in_flight.join_next().await {
        if let Err(err) = finished {
            log::error!("request task failed: {}", err);
        }
    }
}
