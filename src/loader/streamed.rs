//! Chunked-stream loading.
//!
//! Every fragment is appended to the running buffer and the whole buffer is
//! decoded again, so a coarse frame shows up before the body is complete.

use std::time::Instant;

use super::LoadContext;
use crate::assemble::Accumulator;
use crate::decoder::Decoder;
use crate::error::LoadError;
use crate::protocol::DecodeRequest;
use crate::transport::{ChunkStream, Fetcher};

pub async fn load_streamed<F: Fetcher, D: Decoder>(
    ctx: &LoadContext<F, D>,
    request: &DecodeRequest,
) -> Result<(), LoadError> {
    let fetch_start = Instant::now();
    let mut stream = ctx.fetcher.open_stream(&request.url).await?;
    let mut received = Accumulator::new();

    // The terminal `None` produces no result.
    while let Some(fragment) = stream.next_chunk().await? {
        let fetch_time = fetch_start.elapsed();
        let encoded = received.push(&fragment);

        let frame = ctx.decoder.decode(encoded, false).await?;

        log::debug!(
            "fragment #{} +{}B total={}B decode={}ms",
            received.fragments(),
            fragment.len(),
            frame.encoded_size,
            frame.decode_time.as_millis()
        );

        ctx.emitter.frame(request, frame, Some(fetch_time), None);
    }

    Ok(())
}
