//! # Progressive loader — worker process
//!
//! Reads one JSON request per stdin line and writes one JSON line per result
//! to stdout. Logs go to stderr via `env_logger`. Decoding logic lives in the
//! library, see `lib.rs`.

use progressive_loader::{HttpFetcher, LoadError, LoaderConfig, RasterDecoder, Worker, WorkerMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        log::error!("worker stopped: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), LoadError> {
    let config = LoaderConfig::from_env()?;
    config.validate()?;

    let fetcher = HttpFetcher::new(&config)?;
    let max_decoded_pixels = config.max_decoded_pixels;
    let (worker, results) = Worker::start(fetcher, config, async move {
        Ok::<_, LoadError>(RasterDecoder::new(max_decoded_pixels))
    });

    let writer = tokio::spawn(write_results(results));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| LoadError::Worker(format!("stdin read failed: {e}")))?
    {
        if line.trim().is_empty() {
            continue;
        }

        worker.submit_line(&line)?;
    }

    log::info!("stdin closed, waiting for in-flight requests");
    worker.shutdown().await?;

    writer
        .await
        .map_err(|e| LoadError::Worker(format!("result writer failed: {e}")))?
}

async fn write_results(mut results: mpsc::UnboundedReceiver<WorkerMessage>) -> Result<(), LoadError> {
    let mut stdout = tokio::io::stdout();

    while let Some(message) = results.recv().await {
        let mut line = message.to_json_line()?;
        line.push('\n');
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| LoadError::Worker(format!("stdout write failed: {e}")))?;
        stdout
            .flush()
            .await
            .map_err(|e| LoadError::Worker(format!("stdout flush failed: {e}")))?;
    }

    Ok(())
}
