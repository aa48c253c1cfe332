//! TCP exchange against local listeners

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::time::{Duration, Instant};

use errors::HapiError;
use hapisrv::device::transport::tcp_exchange;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const IDLE_GAP: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_silent_device_times_out_within_bound() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 16];
        let _ = socket.read(&mut buf).await;
        // Hold the connection open without answering
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let limit = Duration::from_millis(300);
    let started = Instant::now();
    let result = tcp_exchange("127.0.0.1", port, limit, "env", IDLE_GAP).await;
    let elapsed = started.elapsed();

    assert!(matches!(
        result,
        Err(HapiError::CommandTimeout { ref command, timeout_ms: 300, .. }) if command == "env"
    ));
    assert!(elapsed >= limit, "returned early after {:?}", elapsed);
    assert!(
        elapsed < limit + Duration::from_millis(500),
        "overshot: {:?}",
        elapsed
    );
    server.abort();
}

#[tokio::test]
async fn test_reply_is_read_after_command() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 16];
        let n = socket.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"sta");
        socket.write_all(b"RTU7\r\n2.1").await.unwrap();
        // Keep the socket open; the idle gap ends the reply
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let reply = tcp_exchange("127.0.0.1", port, Duration::from_secs(2), "sta", IDLE_GAP)
        .await
        .unwrap();
    assert_eq!(reply, "RTU7\r\n2.1");
    server.abort();
}

#[tokio::test]
async fn test_refused_connection_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = tcp_exchange("127.0.0.1", port, Duration::from_secs(1), "env", IDLE_GAP).await;
    assert!(matches!(result, Err(HapiError::Connection { .. })));
}
