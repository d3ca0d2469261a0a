//! Shared test doubles: an in-memory fetcher and a scriptable decoder.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use progressive_loader::{ChunkStream, Decoder, Fetcher, FrameInfo, LoadError, WorkerMessage};
use tokio::sync::mpsc;

/// First byte every mock bitstream must start with.
pub const MAGIC: u8 = 0xA5;
/// A tier containing this byte fails the decode pass.
pub const POISON: u8 = 0xEE;

/// `len` bytes of a valid mock bitstream head.
pub fn header_bytes(len: usize) -> Bytes {
    let mut bytes = vec![0x11; len];
    if let Some(first) = bytes.first_mut() {
        *first = MAGIC;
    }
    Bytes::from(bytes)
}

pub fn filler(len: usize) -> Bytes {
    Bytes::from(vec![0x22; len])
}

pub fn poisoned(len: usize) -> Bytes {
    let mut bytes = vec![0x22; len];
    bytes[len / 2] = POISON;
    Bytes::from(bytes)
}

#[derive(Clone)]
struct Route {
    body: Result<Bytes, LoadError>,
    delay: Duration,
    fragments: Vec<Result<Bytes, LoadError>>,
}

#[derive(Default)]
struct FetchLog {
    routes: HashMap<String, Route>,
    calls: Vec<String>,
    completed: Vec<String>,
}

/// In-memory fetcher recording call and completion order.
#[derive(Clone, Default)]
pub struct MockFetcher {
    log: Arc<Mutex<FetchLog>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self, url: &str, body: Bytes) -> &Self {
        self.route(url, Ok(body), Duration::ZERO)
    }

    pub fn delayed(&self, url: &str, body: Bytes, delay: Duration) -> &Self {
        self.route(url, Ok(body), delay)
    }

    pub fn failing(&self, url: &str, error: LoadError) -> &Self {
        self.route(url, Err(error), Duration::ZERO)
    }

    pub fn stream(&self, url: &str, fragments: Vec<Result<Bytes, LoadError>>) -> &Self {
        let mut log = self.log.lock().expect("fetch log poisoned");
        log.routes.insert(
            url.to_string(),
            Route {
                body: Ok(Bytes::new()),
                delay: Duration::ZERO,
                fragments,
            },
        );
        drop(log);
        self
    }

    fn route(&self, url: &str, body: Result<Bytes, LoadError>, delay: Duration) -> &Self {
        let mut log = self.log.lock().expect("fetch log poisoned");
        log.routes.insert(
            url.to_string(),
            Route {
                body,
                delay,
                fragments: Vec::new(),
            },
        );
        drop(log);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().expect("fetch log poisoned").calls.clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.log.lock().expect("fetch log poisoned").completed.clone()
    }

    fn begin(&self, url: &str) -> Result<Route, LoadError> {
        let mut log = self.log.lock().expect("fetch log poisoned");
        log.calls.push(url.to_string());
        log.routes.get(url).cloned().ok_or_else(|| LoadError::Http {
            status: 404,
            message: "Not Found".to_string(),
        })
    }
}

impl Fetcher for MockFetcher {
    type Stream = MockStream;

    async fn fetch(&self, url: &str) -> Result<Bytes, LoadError> {
        let route = self.begin(url)?;
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }

        self.log
            .lock()
            .expect("fetch log poisoned")
            .completed
            .push(url.to_string());
        route.body
    }

    async fn open_stream(&self, url: &str) -> Result<MockStream, LoadError> {
        let route = self.begin(url)?;
        Ok(MockStream {
            fragments: route.fragments.into(),
        })
    }
}

pub struct MockStream {
    fragments: VecDeque<Result<Bytes, LoadError>>,
}

impl ChunkStream for MockStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, LoadError> {
        tokio::task::yield_now().await;
        self.fragments.pop_front().transpose()
    }
}

/// Scriptable decode engine.
///
/// Pixels are a copy of the encoded buffer; `read_header` wants [`MAGIC`]
/// first; `decode` fails on [`POISON`]. Level `l` from the top costs
/// `(levels - l + 1) * 100` bytes.
pub struct MockDecoder {
    levels: u32,
    buffer: Vec<u8>,
    passes: Arc<AtomicUsize>,
}

impl MockDecoder {
    pub fn new(levels: u32) -> Self {
        Self {
            levels,
            buffer: Vec::new(),
            passes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pass_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.passes)
    }
}

impl Decoder for MockDecoder {
    fn encoded_buffer(&mut self, size: usize) -> &mut [u8] {
        self.buffer = vec![0; size];
        &mut self.buffer
    }

    fn read_header(&mut self) -> Result<(), LoadError> {
        match self.buffer.first() {
            Some(&MAGIC) => Ok(()),
            _ => Err(LoadError::Decode("missing SOC marker".to_string())),
        }
    }

    fn decode(&mut self) -> Result<(), LoadError> {
        self.passes.fetch_add(1, Ordering::SeqCst);
        if self.buffer.contains(&POISON) {
            return Err(LoadError::Decode("corrupt code-block".to_string()));
        }
        Ok(())
    }

    fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            width: self.buffer.len() as u32,
            height: 1,
            bits_per_sample: 8,
            component_count: 1,
            is_signed: false,
            is_using_color_transform: false,
        }
    }

    fn decoded_buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn decomposition_levels(&self) -> u32 {
        self.levels
    }

    fn encoded_size_at_level(&self, level_from_top: u32) -> u64 {
        u64::from(self.levels - level_from_top + 1) * 100
    }
}

/// Drain everything already sent and still to come until the senders close.
pub async fn collect(mut results: mpsc::UnboundedReceiver<WorkerMessage>) -> Vec<WorkerMessage> {
    let mut messages = Vec::new();
    while let Some(message) = results.recv().await {
        messages.push(message);
    }
    messages
}

/// Drain only what is already queued.
pub fn drain(results: &mut mpsc::UnboundedReceiver<WorkerMessage>) -> Vec<WorkerMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = results.try_recv() {
        messages.push(message);
    }
    messages
}
