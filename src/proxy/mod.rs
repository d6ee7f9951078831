//! Proxy pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → server.rs (HTTP/1.1 serving, upgrade support, worker occupancy)
//!     → pipeline.rs (dispatch by method, per-request deadline, failure → status)
//!     → tunnel.rs  (CONNECT: dial, 200 ack, bidirectional relay)
//!     → forward.rs (plain methods: upstream exchange, Via rewrite, streamed body)
//!     → error.rs   (failure taxonomy and the status classifier)
//! ```

pub mod error;
pub mod forward;
pub mod pipeline;
pub mod server;
pub mod tunnel;

pub use error::ProxyError;
pub use server::ProxyServer;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty};

/// Boxed error for body streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type written back to clients: a streamed upstream body, or an empty
/// ack/error body.
pub type ProxyBody = BoxBody<Bytes, BoxError>;

/// The token this proxy prepends to `Via` chains.
pub const VIA_PSEUDONYM: &str = "1.1 forward-proxy";

/// An empty response body.
pub fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}
