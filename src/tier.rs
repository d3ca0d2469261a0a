//! # Tier bookkeeping
//!
//! ## Design
//!
//! A tiered request fetches every resolution level concurrently but must emit
//! them in ascending order. [`TierBuffer`] holds one slot per level; each slot
//! has its own completion signal, so the ordered consumer waits for exactly the
//! level it needs next instead of polling.
//!
//! ## Implementation
//!
//! - `TierBuffer::new` returns the buffer plus one [`TierSlot`] per tier
//!   `1..=max`. Slots are moved into the fetch tasks; each fills only its own
//!   level, so no two writers ever touch the same slot.
//! - `wait_for(level)` drains the signals of every lower level first, which is
//!   what makes level `i` wait for `0..=i`.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::assemble::assemble;
use crate::config::LoaderConfig;
use crate::error::LoadError;

/// Append the tier query pair for `level` to `base`.
pub fn tier_url(base: &str, level: u32, config: &LoaderConfig) -> String {
    let join = if base.contains('?') { '&' } else { '?' };
    format!(
        "{}{}{}={}&{}={}",
        base, join, config.start_level_param, level, config.end_level_param, level
    )
}

/// Highest tier to fetch: every available level when `requested` is `None`,
/// otherwise the smaller of the two.
///
/// A resource reporting no decomposition levels still counts as one.
pub fn effective_max_tier(requested: Option<u32>, available: u32) -> u32 {
    let available = available.max(1);
    match requested {
        Some(requested) => requested.min(available),
        None => available,
    }
}

/// Bytes of one tier plus how long its request took.
#[derive(Debug, Clone)]
pub struct TierPayload {
    pub bytes: Bytes,
    pub fetch_time: Duration,
}

type SlotResult = Result<TierPayload, LoadError>;

/// Write end of one tier slot.
pub struct TierSlot {
    level: u32,
    sender: oneshot::Sender<SlotResult>,
}

impl TierSlot {
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Fill the slot. A consumer that already gave up is not an error.
    pub fn fill(self, result: SlotResult) {
        if self.sender.send(result).is_err() {
            log::debug!("tier {} arrived after the request ended", self.level);
        }
    }
}

/// Per-request tier storage, indexed by level.
pub struct TierBuffer {
    filled: Vec<Bytes>,
    pending: Vec<oneshot::Receiver<SlotResult>>,
}

impl TierBuffer {
    /// Start with tier 0 in place and open slots for `1..=max_tier`.
    pub fn new(tier0: Bytes, max_tier: u32) -> (Self, Vec<TierSlot>) {
        let mut slots = Vec::with_capacity(max_tier as usize);
        let mut pending = Vec::with_capacity(max_tier as usize);

        for level in 1..=max_tier {
            let (sender, receiver) = oneshot::channel();
            slots.push(TierSlot { level, sender });
            pending.push(receiver);
        }
        // Popped from the back, lowest level first.
        pending.reverse();

        let buffer = Self {
            filled: vec![tier0],
            pending,
        };
        (buffer, slots)
    }

    /// Wait until `level` and every lower level are present.
    ///
    /// Returns the fetch time of the last tier received by this call.
    pub async fn wait_for(&mut self, level: u32) -> Result<Option<Duration>, LoadError> {
        let mut fetch_time = None;

        while self.filled.len() <= level as usize {
            let next_level = self.filled.len();
            let receiver = self.pending.pop().ok_or_else(|| {
                LoadError::InvalidRequest(format!("tier {} was never requested", next_level))
            })?;

            let payload = receiver.await.map_err(|_| {
                LoadError::Worker(format!("tier {} fetch was abandoned", next_level))
            })??;

            fetch_time = Some(payload.fetch_time);
            self.filled.push(payload.bytes);
        }

        Ok(fetch_time)
    }

    /// Concatenation of tiers `0..=level`.
    pub fn assemble_through(&self, level: u32) -> Vec<u8> {
        assemble(&self.filled, level as usize)
    }
}
