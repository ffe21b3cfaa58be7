//! Streamed response bodies over a real socket.
//!
//! The server writes its body in pieces of one size; the client hands it
//! out in chunks of another. Async and blocking callers must observe the
//! same chunk boundaries.
//!
//! Run with: cargo test --test streaming_integration

mod helpers;

use std::time::Duration;

use futures::StreamExt;
use helpers::mock_server::{start_background, MockHttpServer};
use herald::{Client, Error, NetworkErrorCode, Timeouts};
use tokio::time::timeout;

fn expected_bytes(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_stream_fixed_size_chunks_async() {
    let server = MockHttpServer::new().await.unwrap();
    let client = Client::builder()
        .base_url(server.url())
        .chunk_size(1024)
        .build()
        .unwrap();
    server.start();

    let mut resp = client
        .get("/stream-bytes/5000")
        .query("chunk_size", "700")
        .stream()
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert!(resp.is_streaming());

    let mut sizes = Vec::new();
    let mut data = Vec::new();
    while let Some(chunk) = timeout(Duration::from_secs(5), resp.chunk())
        .await
        .expect("chunk should arrive")
        .unwrap()
    {
        sizes.push(chunk.len());
        data.extend_from_slice(&chunk);
    }
    assert_eq!(sizes, vec![1024, 1024, 1024, 1024, 904]);
    assert_eq!(data, expected_bytes(5000));
    assert!(resp.error().is_none());
}

#[test]
fn test_stream_fixed_size_chunks_blocking() {
    let server = start_background();
    let client = Client::builder()
        .base_url(server.url.clone())
        .chunk_size(1024)
        .build_blocking()
        .unwrap();

    let mut resp = client
        .get("/stream-bytes/5000")
        .query("chunk_size", "700")
        .stream()
        .unwrap();

    let mut sizes = Vec::new();
    let mut data = Vec::new();
    while let Some(chunk) = resp.chunk_blocking().unwrap() {
        sizes.push(chunk.len());
        data.extend_from_slice(&chunk);
    }
    assert_eq!(sizes, vec![1024, 1024, 1024, 1024, 904]);
    assert_eq!(data, expected_bytes(5000));
}

#[tokio::test]
async fn test_bytes_stream_adapter() {
    let server = MockHttpServer::new().await.unwrap();
    let client = Client::builder()
        .base_url(server.url())
        .chunk_size(4096)
        .build()
        .unwrap();
    server.start();

    let resp = client.get("/stream-bytes/10000").stream().await.unwrap();
    let chunks: Vec<_> = resp.bytes_stream().collect().await;
    let sizes: Vec<usize> = chunks.iter().map(|c| c.as_ref().unwrap().len()).collect();
    assert_eq!(sizes, vec![4096, 4096, 1808]);
}

#[tokio::test]
async fn test_send_buffers_whole_body() {
    let server = MockHttpServer::new().await.unwrap();
    let client = Client::builder().base_url(server.url()).build().unwrap();
    server.start();

    let resp = client
        .get("/stream-bytes/3000")
        .query("chunk_size", "128")
        .send()
        .await
        .unwrap();
    assert!(!resp.is_streaming());
    assert_eq!(resp.body().unwrap().as_ref(), expected_bytes(3000).as_slice());
}

#[tokio::test]
async fn test_read_idle_timeout_mid_body() {
    let server = MockHttpServer::new().await.unwrap();
    let client = Client::builder()
        .base_url(server.url())
        .timeouts(Timeouts::api_defaults().read_idle(Duration::from_millis(200)))
        .build()
        .unwrap();
    server.start();

    let mut resp = client.get("/stall/2000").stream().await.unwrap();
    assert_eq!(resp.status, 200);

    let err = loop {
        match resp.chunk().await {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("body should not complete"),
            Err(err) => break err,
        }
    };
    assert_eq!(err.network_code(), Some(NetworkErrorCode::ReadTimeout));
    assert_eq!(resp.error().map(|e| e.code), Some(NetworkErrorCode::ReadTimeout));
}

#[tokio::test]
async fn test_send_surfaces_body_timeout() {
    let server = MockHttpServer::new().await.unwrap();
    let client = Client::builder()
        .base_url(server.url())
        .timeouts(Timeouts::api_defaults().read_idle(Duration::from_millis(200)))
        .build()
        .unwrap();
    server.start();

    let err = client.get("/stall/2000").send().await.unwrap_err();
    assert!(matches!(err, Error::Network(ref e) if e.is_timeout()));
}

#[tokio::test]
async fn test_dropping_response_mid_stream() {
    let server = MockHttpServer::new().await.unwrap();
    let client = Client::builder()
        .base_url(server.url())
        .chunk_size(512)
        .build()
        .unwrap();
    server.start();

    let mut resp = client.get("/stream-bytes/200000").stream().await.unwrap();
    let first = resp.chunk().await.unwrap().unwrap();
    assert_eq!(first.len(), 512);
    drop(resp);

    // The client stays usable after abandoning a body.
    let resp = timeout(Duration::from_secs(5), client.get("/get").send())
        .await
        .expect("follow-up request should not hang")
        .unwrap();
    assert_eq!(resp.status, 200);
}
