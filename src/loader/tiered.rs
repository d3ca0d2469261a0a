//! # Tiered-resolution loading
//!
//! ```text
//! tier 0 ──fetch──▶ decode (+ level count, size table) ──▶ emit level 0
//!                        │
//!                        ▼  max = clamp(requested, levels)
//! tiers 1..=max ──concurrent fetches──▶ TierBuffer slots (any order)
//!                                            │
//!            for level in 1..=max: wait_for(level) → assemble 0..=level
//!                                  → decode → emit level
//! ```
//!
//! Any error ends the request; the pending fetch tasks are aborted when the
//! `JoinSet` drops.

use std::time::Instant;

use tokio::task::JoinSet;

use super::LoadContext;
use crate::decoder::Decoder;
use crate::error::LoadError;
use crate::protocol::DecodeRequest;
use crate::tier::{TierBuffer, TierPayload, effective_max_tier, tier_url};
use crate::transport::Fetcher;

pub async fn load_tiered<F: Fetcher, D: Decoder>(
    ctx: &LoadContext<F, D>,
    request: &DecodeRequest,
) -> Result<(), LoadError> {
    let fetch_start = Instant::now();
    let tier0 = ctx.fetcher.fetch(&tier_url(&request.url, 0, &ctx.config)).await?;
    let fetch_time = fetch_start.elapsed();

    let frame = ctx.decoder.decode(&tier0, true).await?;
    let levels = frame.decomposition_levels;
    ctx.emitter.frame(request, frame, Some(fetch_time), Some(0));

    let max_tier = effective_max_tier(request.requested_max_tier(), levels);
    log::debug!(
        "tier 0 reports {} decomposition levels, fetching 1..={}",
        levels,
        max_tier
    );

    let (mut tiers, slots) = TierBuffer::new(tier0, max_tier);

    let mut fetches = JoinSet::new();
    for slot in slots {
        let fetcher = ctx.fetcher.clone();
        let url = tier_url(&request.url, slot.level(), &ctx.config);
        fetches.spawn(async move {
            let started = Instant::now();
            let result = fetcher.fetch(&url).await.map(|bytes| TierPayload {
                bytes,
                fetch_time: started.elapsed(),
            });
            slot.fill(result);
        });
    }

    for level in 1..=max_tier {
        let fetch_time = tiers.wait_for(level).await?;
        let encoded = tiers.assemble_through(level);

        let frame = ctx.decoder.decode(&encoded, false).await?;
        log::debug!(
            "tier {} decoded {}x{} encoded={}B",
            level,
            frame.frame_info.width,
            frame.frame_info.height,
            frame.encoded_size
        );
        ctx.emitter.frame(request, frame, fetch_time, Some(level));
    }

    Ok(())
}
