//! Request dispatch and the task-level failure boundary.
//!
//! # Responsibilities
//! - One info line per accepted request
//! - Dispatch by method: CONNECT → tunnel, allow-listed methods → forward,
//!   everything else → 501 before any upstream I/O
//! - Apply the shared per-request deadline around the whole unit of work
//! - Catch every pipeline failure here and turn it into a status response;
//!   nothing escapes to the worker or accept-loop level

use std::convert::Infallible;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use tokio::time::Instant;

use crate::net::connection::ConnectionId;
use crate::proxy::error::ProxyError;
use crate::proxy::tunnel::TunnelSlot;
use crate::proxy::{forward, tunnel, ProxyBody};
use crate::resilience::timeout::with_deadline;

/// Per-request state threaded from the connection task into the pipeline.
#[derive(Clone)]
pub(crate) struct RequestContext {
    pub deadline: Duration,
    pub connection: ConnectionId,
    pub tunnels: TunnelSlot,
}

/// Entry point for every request on a connection.
///
/// Always produces a response: either the proxied/tunneled one, or the
/// classifier's minimal status response on failure.
pub(crate) async fn handle(
    req: Request<Incoming>,
    ctx: RequestContext,
) -> Result<Response<ProxyBody>, Infallible> {
    tracing::info!(
        connection_id = %ctx.connection,
        method = %req.method(),
        target = %req.uri(),
        "Request received"
    );

    // The shared clock for the whole unit of work starts here.
    let started = Instant::now();

    let method = req.method().clone();
    let outcome = match with_deadline(ctx.deadline, dispatch(req, &ctx, started)).await {
        Ok(inner) => inner,
        Err(expired) => Err(expired),
    };

    match outcome {
        Ok(response) => Ok(response),
        Err(err) => {
            tracing::error!(
                connection_id = %ctx.connection,
                method = %method,
                status = err.status().as_u16(),
                error = %err,
                "Request failed"
            );
            tracing::debug!(connection_id = %ctx.connection, detail = ?err, "Failure detail");
            Ok(err.to_response())
        }
    }
}

/// Pick the handling strategy for a request.
async fn dispatch(
    req: Request<Incoming>,
    ctx: &RequestContext,
    started: Instant,
) -> Result<Response<ProxyBody>, ProxyError> {
    if *req.method() == Method::CONNECT {
        return tunnel::handle(req, ctx.deadline, ctx.connection, ctx.tunnels.clone()).await;
    }

    if !is_forwardable(req.method()) {
        return Err(ProxyError::UnsupportedMethod(req.method().clone()));
    }

    forward::handle(req, ctx.deadline, started).await
}

/// The methods this proxy re-issues to an origin.
fn is_forwardable(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::POST
}
