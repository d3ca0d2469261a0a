//! # Decoder handle
//!
//! ## Design
//!
//! The decode engine is an external collaborator with a small capability
//! surface ([`Decoder`]). It is stateful, owns its working buffer, and must
//! never run two decode passes at once.
//!
//! ## Implementation
//!
//! - [`DecoderHandle`] owns the engine behind an async mutex. A decode pass is
//!   only reachable through a [`DecodeSession`], i.e. a held lock, so passes
//!   from concurrent loaders are serialized structurally.
//! - Every pass overwrites the whole working buffer before parsing, then copies
//!   the pixels out so the caller owns them.
//! - The level count an engine reports comes from the bitstream header, so it
//!   is clamped to the handle's ceiling before anything is sized by it.
//!
//! ```text
//! loader ──acquire()──▶ DecodeSession ──run()──▶ encoded_buffer ← bytes
//!                                               read_header()
//!                                               decode()        (timed)
//!                                               frame_info / decoded_buffer
//! ```

pub mod raster;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::LoadError;

pub use raster::RasterDecoder;

/// Most decomposition levels a JPEG 2000 codestream can declare.
pub const MAX_DECOMPOSITION_LEVELS: u32 = 32;

/// Structural metadata of the decoded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: u8,
    pub component_count: u8,
    pub is_signed: bool,
    pub is_using_color_transform: bool,
}

/// Capability surface of a wavelet-style decode engine.
///
/// Call order for one pass: `encoded_buffer` (then fill it), `read_header`,
/// `decode`, then any of the getters.
pub trait Decoder: Send + 'static {
    /// Reset the working buffer to `size` bytes and hand it out for filling.
    fn encoded_buffer(&mut self, size: usize) -> &mut [u8];

    fn read_header(&mut self) -> Result<(), LoadError>;

    fn decode(&mut self) -> Result<(), LoadError>;

    fn frame_info(&self) -> FrameInfo;

    fn decoded_buffer(&self) -> &[u8];

    /// Number of decomposition levels; only meaningful after `read_header`.
    fn decomposition_levels(&self) -> u32;

    /// Encoded byte size needed to decode down to `level_from_top`
    /// (0 = full resolution).
    fn encoded_size_at_level(&self, level_from_top: u32) -> u64;
}

/// Output of one decode pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub frame_info: FrameInfo,
    pub pixels: Vec<u8>,
    pub encoded_size: usize,
    pub decode_time: Duration,
    pub decomposition_levels: u32,
    /// Level index (0 = coarsest) → encoded byte size, when requested.
    pub level_sizes: Option<BTreeMap<u32, u64>>,
}

/// Shared, exclusively-locked owner of the decode engine.
pub struct DecoderHandle<D> {
    inner: Arc<Mutex<D>>,
    level_ceiling: u32,
}

impl<D> Clone for DecoderHandle<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            level_ceiling: self.level_ceiling,
        }
    }
}

impl<D: Decoder> DecoderHandle<D> {
    pub fn new(decoder: D) -> Self {
        Self::with_level_ceiling(decoder, MAX_DECOMPOSITION_LEVELS)
    }

    /// Like [`DecoderHandle::new`], trusting at most `level_ceiling` reported levels.
    pub fn with_level_ceiling(decoder: D, level_ceiling: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(decoder)),
            level_ceiling,
        }
    }

    /// Wait for exclusive use of the engine.
    pub async fn acquire(&self) -> DecodeSession<'_, D> {
        DecodeSession {
            decoder: self.inner.lock().await,
            level_ceiling: self.level_ceiling,
        }
    }

    /// Run one full pass over `encoded` under the lock.
    pub async fn decode(
        &self,
        encoded: &[u8],
        with_level_sizes: bool,
    ) -> Result<DecodedFrame, LoadError> {
        self.acquire().await.run(encoded, with_level_sizes)
    }
}

/// Scoped exclusive access to the engine; released on drop.
pub struct DecodeSession<'a, D> {
    decoder: MutexGuard<'a, D>,
    level_ceiling: u32,
}

impl<D: Decoder> DecodeSession<'_, D> {
    pub fn run(&mut self, encoded: &[u8], with_level_sizes: bool) -> Result<DecodedFrame, LoadError> {
        let decoder = &mut *self.decoder;

        decoder.encoded_buffer(encoded.len()).copy_from_slice(encoded);
        decoder.read_header()?;

        let decode_start = Instant::now();
        decoder.decode()?;
        let decode_time = decode_start.elapsed();

        let reported_levels = decoder.decomposition_levels();
        let decomposition_levels = reported_levels.min(self.level_ceiling);
        if reported_levels > decomposition_levels {
            log::warn!(
                "⚠️ header reports {} decomposition levels, using {}",
                reported_levels,
                decomposition_levels
            );
        }
        let level_sizes = with_level_sizes.then(|| level_size_table(decoder, decomposition_levels));

        Ok(DecodedFrame {
            frame_info: decoder.frame_info(),
            pixels: decoder.decoded_buffer().to_vec(),
            encoded_size: encoded.len(),
            decode_time,
            decomposition_levels,
            level_sizes,
        })
    }
}

/// Index `i` holds the size for the `i`-th coarsest resolution.
fn level_size_table<D: Decoder>(decoder: &D, levels: u32) -> BTreeMap<u32, u64> {
    (0..=levels)
        .map(|i| (i, decoder.encoded_size_at_level(levels - i)))
        .collect()
}
