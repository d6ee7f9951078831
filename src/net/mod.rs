//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept)
//!     → connection.rs (id assignment, lifecycle tracking)
//!     → Hand off to the proxy pipeline
//! ```
//!
//! # Design Decisions
//! - The listening socket is owned exclusively by the accept loop
//! - Each accepted connection is owned by exactly one worker task
//! - Every connection is tracked so shutdown can drain in-flight work

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Listener, ListenerError};
