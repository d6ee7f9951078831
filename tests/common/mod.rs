//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Read from the socket until the end of an HTTP head (blank line) or EOF.
pub async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) => break,
            Ok(_) => head.push(byte[0]),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&head).to_string()
}

/// Start a mock origin that returns a fixed 200 response.
///
/// `extra_headers` is spliced into the response head and must be empty or
/// end with "\r\n" (e.g. "Via: 1.0 foo\r\n").
pub async fn start_mock_origin(addr: SocketAddr, extra_headers: &'static str, body: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let _ = read_head(&mut socket).await;
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
                            body.len(),
                            extra_headers,
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a mock origin that waits before answering.
#[allow(dead_code)]
pub async fn start_slow_origin(addr: SocketAddr, delay: Duration) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let _ = read_head(&mut socket).await;
                        tokio::time::sleep(delay).await;
                        let response =
                            "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nslow";
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a mock origin that streams a chunked response, one chunk at a time.
///
/// Chunks are flushed with a pause in between so they arrive as separate
/// reads on the proxy side.
#[allow(dead_code)]
pub async fn start_chunked_origin(addr: SocketAddr, chunks: &'static [&'static str]) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let _ = read_head(&mut socket).await;
                        let head =
                            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.flush().await;
                        for chunk in chunks {
                            let framed = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
                            let _ = socket.write_all(framed.as_bytes()).await;
                            let _ = socket.flush().await;
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                        let _ = socket.write_all(b"0\r\n\r\n").await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a mock origin that records how many connections it saw and the
/// peak number held concurrently, holding each open for `hold`.
#[allow(dead_code)]
pub async fn start_tracking_origin(
    addr: SocketAddr,
    hold: Duration,
) -> (Arc<AtomicU32>, Arc<AtomicU32>) {
    let listener = TcpListener::bind(addr).await.unwrap();
    let total = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));
    let concurrent = Arc::new(AtomicU32::new(0));

    let total_handle = total.clone();
    let peak_handle = peak.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    total_handle.fetch_add(1, Ordering::SeqCst);
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak_handle.fetch_max(now, Ordering::SeqCst);

                    let concurrent = concurrent.clone();
                    tokio::spawn(async move {
                        let _ = read_head(&mut socket).await;
                        tokio::time::sleep(hold).await;
                        let response =
                            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    });
                }
                Err(_) => break,
            }
        }
    });

    (total, peak)
}

/// Start a TCP destination that echoes every byte back until EOF.
#[allow(dead_code)]
pub async fn start_echo_destination(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let (mut rd, mut wr) = socket.split();
                        let _ = tokio::io::copy(&mut rd, &mut wr).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}
