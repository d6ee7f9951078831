//! Forwarding for plain (non-CONNECT) methods.
//!
//! # Responsibilities
//! - Resolve the origin from the request's own Host header
//! - Translate the inbound request into an origin-form outbound request
//! - Perform the HTTP/1.1 exchange, one fresh connection per request
//! - Rewrite the response `Via` chain and stream the body back lazily
//!
//! # Design Decisions
//! - Multi-valued request headers collapse to their first value on the way
//!   out. Deliberate simplification, kept as observable behavior.
//! - The response body is never buffered: each data frame read from
//!   upstream becomes one frame to the client, so a chunked upstream body
//!   is re-framed chunk boundary by chunk boundary.

use std::time::Duration;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::http::request::Parts;
use hyper::{HeaderMap, Request, Response, Version};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::proxy::error::ProxyError;
use crate::proxy::{ProxyBody, VIA_PSEUDONYM};
use crate::resilience::timeout::DeadlineBody;

/// Forward a request to its origin and return the rewritten response.
///
/// `deadline` and `started` describe the request's shared clock; the
/// response body stream runs out the remainder of it.
pub(crate) async fn handle(
    req: Request<Incoming>,
    deadline: Duration,
    started: Instant,
) -> Result<Response<ProxyBody>, ProxyError> {
    let (host, port) = origin_target(req.headers())?;
    let (parts, body) = req.into_parts();
    let outbound = build_outbound(&parts, body)?;

    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|source| ProxyError::UpstreamConnect {
            host: host.clone(),
            port,
            source,
        })?;

    let (mut sender, conn) = hyper::client::conn::http1::Builder::new()
        .preserve_header_case(true)
        .handshake(TokioIo::new(stream))
        .await?;

    tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(error = %err, "Upstream connection task ended");
        }
    });

    let response = sender.send_request(outbound).await?;
    Ok(rewrite_response(response, deadline, started))
}

/// Resolve the origin host and port from the Host header.
fn origin_target(headers: &HeaderMap) -> Result<(String, u16), ProxyError> {
    let raw = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ProxyError::MalformedRequest("request carries no usable Host header".into()))?;

    split_host_port(raw)
        .ok_or_else(|| ProxyError::MalformedRequest(format!("invalid Host header: {}", raw)))
}

/// Split "host" or "host:port" into its parts; port defaults to 80.
fn split_host_port(raw: &str) -> Option<(String, u16)> {
    if raw.is_empty() {
        return None;
    }
    match raw.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) if !host.is_empty() => Some((host.to_string(), port)),
            _ => None,
        },
        None => Some((raw.to_string(), 80)),
    }
}

/// Build the outbound origin-form request, reusing the inbound body stream.
fn build_outbound(parts: &Parts, body: Incoming) -> Result<Request<Incoming>, ProxyError> {
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/");

    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(path)
        .version(Version::HTTP_11);

    if let Some(headers) = builder.headers_mut() {
        // Multi-valued headers collapse to their first value.
        for name in parts.headers.keys() {
            if let Some(value) = parts.headers.get(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
    }

    builder
        .body(body)
        .map_err(|err| ProxyError::MalformedRequest(err.to_string()))
}

/// Prepend this proxy's token to the upstream `Via` chain.
fn via_chain(existing: Option<&str>) -> String {
    match existing {
        Some(prior) => format!("{}, {}", VIA_PSEUDONYM, prior),
        None => VIA_PSEUDONYM.to_string(),
    }
}

/// Rewrite the upstream response for the client: accumulate `Via`, hand the
/// body over lazily under the remaining deadline.
fn rewrite_response(
    response: Response<Incoming>,
    deadline: Duration,
    started: Instant,
) -> Response<ProxyBody> {
    let (mut parts, body) = response.into_parts();

    let chain = via_chain(
        parts
            .headers
            .get(header::VIA)
            .and_then(|value| value.to_str().ok()),
    );
    if let Ok(value) = HeaderValue::from_str(&chain) {
        parts.headers.insert(header::VIA, value);
    }

    let body = DeadlineBody::new(deadline, started, body);
    Response::from_parts(parts, body.boxed())
}
