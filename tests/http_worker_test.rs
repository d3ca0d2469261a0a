use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
use progressive_loader::{
    DecodeRequest, HttpFetcher, LoadError, LoadMethod, LoaderConfig, RasterDecoder, Worker,
};
use serde_json::json;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0x40, 255]));
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("failed to encode test image");
    cursor.into_inner()
}

/// Serve `body` to `connections` clients, recording each request line.
fn serve(body: Vec<u8>, connections: usize) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
    let addr = listener.local_addr().expect("read local addr failed");

    let server = thread::spawn(move || {
        let mut request_lines = Vec::new();
        for _ in 0..connections {
            let (mut stream, _) = listener.accept().expect("accept failed");

            let mut req_buf = [0u8; 2048];
            let read = stream.read(&mut req_buf).unwrap_or(0);
            let head = String::from_utf8_lossy(&req_buf[..read]);
            request_lines.push(head.lines().next().unwrap_or_default().to_string());

            let headers = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(headers.as_bytes());
            let _ = stream.write_all(&body);
            let _ = stream.flush();
        }
        request_lines
    });

    (format!("http://127.0.0.1:{}/frames/1", addr.port()), server)
}

/// Serve `body` once, pausing after the first `split_at` bytes.
fn serve_split(body: Vec<u8>, split_at: usize) -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
    let addr = listener.local_addr().expect("read local addr failed");

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept failed");

        let mut req_buf = [0u8; 2048];
        let _ = stream.read(&mut req_buf);

        let headers = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        // The client hangs up once the first fragment fails to decode.
        let _ = stream.write_all(headers.as_bytes());
        let _ = stream.write_all(&body[..split_at]);
        let _ = stream.flush();
        thread::sleep(Duration::from_millis(150));
        let _ = stream.write_all(&body[split_at..]);
        let _ = stream.flush();
    });

    (format!("http://127.0.0.1:{}/frames/2", addr.port()), server)
}

fn start_worker(config: LoaderConfig) -> (Worker, tokio::sync::mpsc::UnboundedReceiver<progressive_loader::WorkerMessage>) {
    let fetcher = HttpFetcher::new(&config).expect("fetcher init failed");
    let max_pixels = config.max_decoded_pixels;
    Worker::start(fetcher, config, async move {
        Ok::<_, LoadError>(RasterDecoder::new(max_pixels))
    })
}

#[tokio::test]
async fn single_shot_over_http() {
    let png = png_bytes(6, 4);
    let encoded_len = png.len();
    let (url, server) = serve(png, 1);

    let (worker, mut results) = start_worker(LoaderConfig::default());
    worker
        .submit(DecodeRequest::new(url.clone(), json!({"slot": 2}), LoadMethod::Single))
        .expect("queued");

    let message = results.recv().await.expect("one result");
    worker.shutdown().await.expect("clean shutdown");
    server.join().expect("server thread failed");

    let frame = message.as_frame().expect("frame");
    assert_eq!(frame.url, url);
    assert_eq!(frame.instance, json!({"slot": 2}));
    assert_eq!((frame.frame_info.width, frame.frame_info.height), (6, 4));
    assert_eq!(frame.frame_info.component_count, 4);
    assert_eq!(frame.buffer.len(), 6 * 4 * 4);
    assert_eq!(frame.encoded_size, encoded_len);
}

#[tokio::test]
async fn tiered_over_http_requests_level_zero() {
    let (url, server) = serve(png_bytes(3, 3), 1);

    let (worker, mut results) = start_worker(LoaderConfig::default());
    worker
        .submit(DecodeRequest::new(url, json!(null), LoadMethod::Tiered))
        .expect("queued");

    let message = results.recv().await.expect("level 0");
    worker.shutdown().await.expect("clean shutdown");
    let request_lines = server.join().expect("server thread failed");

    let frame = message.as_frame().expect("frame");
    assert_eq!(frame.level, Some(0));
    assert_eq!(frame.decomposition_data.as_ref().map(|d| d.len()), Some(1));
    assert!(results.recv().await.is_none());
    assert_eq!(request_lines.len(), 1);
    assert!(request_lines[0].contains("/frames/1?startLevel=0&endLevel=0"));
}

#[tokio::test]
async fn oversized_image_is_a_resource_limit_failure() {
    let (url, server) = serve(png_bytes(20, 20), 1);

    let mut config = LoaderConfig::default();
    config.max_decoded_pixels = 100;
    let (worker, mut results) = start_worker(config);
    worker
        .submit(DecodeRequest::new(url.clone(), json!(null), LoadMethod::Single))
        .expect("queued");

    let message = results.recv().await.expect("one failure");
    worker.shutdown().await.expect("clean shutdown");
    server.join().expect("server thread failed");

    let failure = message.as_failure().expect("failure");
    assert_eq!(failure.url, url);
    assert_eq!(failure.code, "resource_limit");
}

#[tokio::test]
async fn progressive_raster_fails_on_partial_fragment() {
    let png = png_bytes(16, 16);
    let (url, server) = serve_split(png, 16);

    let (worker, results) = start_worker(LoaderConfig::default());
    worker
        .submit(DecodeRequest::new(url.clone(), json!(null), LoadMethod::Streamed))
        .expect("queued");
    worker.shutdown().await.expect("clean shutdown");
    server.join().expect("server thread failed");

    let mut results = results;
    let mut messages = Vec::new();
    while let Some(message) = results.recv().await {
        messages.push(message);
    }

    assert_eq!(messages.len(), 1);
    let failure = messages[0].as_failure().expect("failure");
    assert_eq!(failure.url, url);
    assert_eq!(failure.code, "decode");
    assert_eq!(failure.stage, "decode");
}
