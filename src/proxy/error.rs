//! Failure taxonomy and the error-to-status classifier.
//!
//! # Responsibilities
//! - One typed failure for everything that can go wrong inside a request
//! - Map each failure to the client-visible status line
//! - Build the minimal error response (status + Via, no body)
//!
//! Nothing past the status line ever reaches the wire; detail stays in the
//! logs.

use std::time::Duration;

use hyper::header::{self, HeaderValue};
use hyper::{Method, Response, StatusCode};
use thiserror::Error;

use crate::proxy::{empty_body, ProxyBody, VIA_PSEUDONYM};

/// A failure inside the request-handling pipeline.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The unit of work did not finish within its deadline.
    #[error("request did not complete within {0:?}")]
    Timeout(Duration),

    /// The method is outside the forwardable set.
    #[error("method {0} is not implemented")]
    UnsupportedMethod(Method),

    /// The client request cannot be proxied as written.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Dialing the origin or tunnel destination failed.
    #[error("failed to reach {host}:{port}")]
    UpstreamConnect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The upstream HTTP exchange failed mid-flight.
    #[error("upstream exchange failed")]
    Upstream(#[from] hyper::Error),
}

impl ProxyError {
    /// The status line written back to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UnsupportedMethod(_) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Minimal client-facing response: status line plus `Via`, empty body.
    pub fn to_response(&self) -> Response<ProxyBody> {
        let mut response = Response::new(empty_body());
        *response.status_mut() = self.status();
        response
            .headers_mut()
            .insert(header::VIA, HeaderValue::from_static(VIA_PSEUDONYM));
        response
    }
}
