//! CONNECT tunneling.
//!
//! # Responsibilities
//! - Parse the authority-form target of a CONNECT request
//! - Dial the destination and acknowledge the tunnel with a bare 200
//! - Relay bytes in both directions until both legs finish
//!
//! # Design Decisions
//! - The two legs are independent: one direction reaching EOF half-closes
//!   the peer but leaves the other direction running
//! - A leg error ends that leg only; it is logged at warn level and never
//!   becomes a request-level failure
//! - The destination stream is dropped (closed) when the relay returns

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hyper::body::Incoming;
use hyper::{Request, Response, Uri};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::net::connection::ConnectionId;
use crate::proxy::error::ProxyError;
use crate::proxy::{empty_body, ProxyBody};
use crate::resilience::timeout::with_deadline;

/// Hand-off slot for the relay task of an upgraded CONNECT request.
///
/// The HTTP exchange finishes as soon as the 200 ack is written; the
/// connection task awaits whatever is stored here so the worker stays
/// occupied until the tunnel is done.
pub type TunnelSlot = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Handle a CONNECT request: dial the destination, ack with 200, and park
/// the relay task in `slot`.
pub(crate) async fn handle(
    req: Request<Incoming>,
    deadline: Duration,
    connection: ConnectionId,
    slot: TunnelSlot,
) -> Result<Response<ProxyBody>, ProxyError> {
    let (host, port) = connect_target(req.uri())?;

    let upstream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|source| ProxyError::UpstreamConnect {
            host: host.clone(),
            port,
            source,
        })?;

    let relay_task = tokio::spawn({
        let host = host.clone();
        async move {
            // The client connection is only usable as a raw stream once the
            // 200 ack has gone out and hyper hands the socket back.
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    let client = TokioIo::new(upgraded);
                    let outcome = with_deadline(deadline, relay(client, upstream)).await;
                    if outcome.is_err() {
                        tracing::warn!(
                            connection_id = %connection,
                            host = %host,
                            port,
                            "Tunnel exceeded deadline, closing"
                        );
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        connection_id = %connection,
                        error = %err,
                        "Client never completed CONNECT upgrade"
                    );
                }
            }
        }
    });

    if let Ok(mut pending) = slot.lock() {
        *pending = Some(relay_task);
    }

    tracing::debug!(connection_id = %connection, host = %host, port, "Tunnel established");

    // Minimal ack: just the status line and terminator. Everything the
    // client sends after it is tunnel payload.
    Ok(Response::new(empty_body()))
}

/// Copy bytes between two streams until both directions are finished.
///
/// Returns (client→upstream bytes, upstream→client bytes); a leg that ends
/// in an error counts zero.
pub async fn relay<C, U>(client: C, upstream: U) -> (u64, u64)
where
    C: AsyncRead + AsyncWrite,
    U: AsyncRead + AsyncWrite,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut upstream_rd, mut upstream_wr) = tokio::io::split(upstream);

    let up = async {
        let copied = tokio::io::copy(&mut client_rd, &mut upstream_wr).await;
        // EOF propagates as a half-close; the other leg keeps running.
        let _ = upstream_wr.shutdown().await;
        match copied {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(direction = "client->upstream", error = %err, "Tunnel leg ended with error");
                0
            }
        }
    };

    let down = async {
        let copied = tokio::io::copy(&mut upstream_rd, &mut client_wr).await;
        let _ = client_wr.shutdown().await;
        match copied {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(direction = "upstream->client", error = %err, "Tunnel leg ended with error");
                0
            }
        }
    };

    let (sent, received) = tokio::join!(up, down);
    tracing::debug!(bytes_up = sent, bytes_down = received, "Tunnel finished");
    (sent, received)
}

/// Extract host and port from an authority-form CONNECT target.
fn connect_target(uri: &Uri) -> Result<(String, u16), ProxyError> {
    let authority = uri.authority().ok_or_else(|| {
        ProxyError::MalformedRequest(format!("CONNECT target {} is not authority-form", uri))
    })?;

    let host = authority.host().to_string();
    let port = authority.port_u16().unwrap_or(443);
    Ok((host, port))
}
