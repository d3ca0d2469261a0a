//! Single-shot loading: fetch everything, decode once.

use std::time::Instant;

use super::LoadContext;
use crate::decoder::Decoder;
use crate::error::LoadError;
use crate::protocol::DecodeRequest;
use crate::transport::Fetcher;

pub async fn load_single<F: Fetcher, D: Decoder>(
    ctx: &LoadContext<F, D>,
    request: &DecodeRequest,
) -> Result<(), LoadError> {
    let fetch_start = Instant::now();
    let body = ctx.fetcher.fetch(&request.url).await?;
    let fetch_time = fetch_start.elapsed();

    let frame = ctx.decoder.decode(&body, false).await?;

    log::info!(
        "📦 single-shot frame {}x{} encoded={} fetch={}ms decode={}ms",
        frame.frame_info.width,
        frame.frame_info.height,
        frame.encoded_size,
        fetch_time.as_millis(),
        frame.decode_time.as_millis()
    );

    ctx.emitter.frame(request, frame, Some(fetch_time), None);
    Ok(())
}
