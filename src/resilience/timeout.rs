//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap a unit of work with a wall-clock deadline
//! - Convert expiry into the typed timeout failure (mapped to 504)
//! - Extend the same deadline over a streamed response body
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - One shared deadline covers the whole unit of work, not individual I/O
//!   calls: the clock starts when the request enters the pipeline, and the
//!   body relay runs out the same clock via [`DeadlineBody`]
//! - Expiry frees the waiting worker; dropping the timed-out future cancels
//!   its in-flight I/O at the next await point

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use hyper::body::{Body, Frame, SizeHint};
use tokio::time::{Instant, Sleep};

use crate::proxy::error::ProxyError;
use crate::proxy::BoxError;

/// Run `work` under `deadline`.
///
/// Returns the work's own output if it finishes in time, otherwise
/// [`ProxyError::Timeout`] carrying the configured duration.
pub async fn with_deadline<F>(deadline: Duration, work: F) -> Result<F::Output, ProxyError>
where
    F: Future,
{
    tokio::time::timeout(deadline, work)
        .await
        .map_err(|_| ProxyError::Timeout(deadline))
}

/// A response body that fails its stream once the request deadline passes.
///
/// The expiry instant is `started + deadline`, so time already spent on the
/// upstream exchange counts against the body relay.
pub struct DeadlineBody<B> {
    inner: B,
    expires: Pin<Box<Sleep>>,
    deadline: Duration,
}

impl<B> DeadlineBody<B> {
    /// Wrap `inner`, expiring at `started + deadline`.
    pub fn new(deadline: Duration, started: Instant, inner: B) -> Self {
        Self {
            inner,
            expires: Box::pin(tokio::time::sleep_until(started + deadline)),
            deadline,
        }
    }
}

impl<B> Body for DeadlineBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if this.expires.as_mut().poll(cx).is_ready() {
            tracing::warn!("Response body exceeded the request deadline, aborting stream");
            return Poll::Ready(Some(Err(ProxyError::Timeout(this.deadline).into())));
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err.into()))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
