//! Request/response exchange over TCP and serial
//!
//! Devices answer one command per exchange and do not frame their replies,
//! so a reply ends at EOF or after a quiet period once bytes have arrived.
//! The caller's timeout bounds the whole exchange, connect included.

use std::time::Duration;

use errors::{HapiError, HapiResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;
use tracing::debug;

const READ_CHUNK: usize = 1024;

/// Read until EOF, or until `idle_gap` passes without data after the first byte
pub async fn read_response<R>(reader: &mut R, idle_gap: Duration) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = if buf.is_empty() {
            reader.read(&mut chunk).await?
        } else {
            match timeout(idle_gap, reader.read(&mut chunk)).await {
                Ok(read) => read?,
                Err(_) => break,
            }
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn timed_out(address: &str, command: &str, limit: Duration) -> HapiError {
    HapiError::CommandTimeout {
        address: address.to_string(),
        command: command.to_string(),
        timeout_ms: limit.as_millis() as u64,
    }
}

/// One command over a fresh TCP connection
pub async fn tcp_exchange(
    address: &str,
    port: u16,
    limit: Duration,
    command: &str,
    idle_gap: Duration,
) -> HapiResult<String> {
    let endpoint = format!("{}:{}", address, port);
    debug!("Sending '{}' to {}", command, endpoint);

    let exchange = async {
        let mut stream = TcpStream::connect(&endpoint).await?;
        stream.write_all(command.as_bytes()).await?;
        stream.flush().await?;
        read_response(&mut stream, idle_gap).await
    };

    match timeout(limit, exchange).await {
        Ok(Ok(response)) => {
            debug!("Received {} bytes from {}", response.len(), endpoint);
            Ok(response)
        },
        Ok(Err(e)) => Err(HapiError::Connection {
            endpoint,
            reason: e.to_string(),
        }),
        Err(_) => Err(timed_out(address, command, limit)),
    }
}

/// One command over the local serial link
pub async fn serial_exchange(
    path: &str,
    baud: u32,
    limit: Duration,
    command: &str,
    idle_gap: Duration,
) -> HapiResult<String> {
    debug!("Sending '{}' to serial {} @ {}", command, path, baud);

    let mut port = tokio_serial::new(path, baud)
        .timeout(limit)
        .open_native_async()
        .map_err(|e| HapiError::Connection {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })?;

    let exchange = async {
        port.write_all(command.as_bytes()).await?;
        port.flush().await?;
        read_response(&mut port, idle_gap).await
    };

    match timeout(limit, exchange).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(HapiError::Connection {
            endpoint: path.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(timed_out(path, command, limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_read_response_stops_at_eof() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"RTU1\r\n3.0").await.unwrap();
        drop(server);
        let text = read_response(&mut client, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(text, "RTU1\r\n3.0");
    }

    #[tokio::test]
    async fn test_read_response_stops_after_idle_gap() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"D31D40{").await.unwrap();
        // Writer stays open; the quiet period ends the reply
        let text = read_response(&mut client, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(text, "D31D40{");
        drop(server);
    }
}
