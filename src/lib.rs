//! Forward HTTP proxy library.
//!
//! # Architecture Overview
//!
//! ```text
//! Client ──▶ net::Listener ──▶ pool::WorkerPool ──▶ proxy::pipeline
//!                                                        │
//!                                      ┌─────────────────┴───────────────┐
//!                                      ▼                                 ▼
//!                              proxy::tunnel (CONNECT)          proxy::forward (plain methods)
//!                              bidirectional byte relay         upstream HTTP/1.1 exchange,
//!                              with half-close                  Via rewrite, streamed body
//! ```
//!
//! Every request runs under a wall-clock deadline (`resilience::timeout`);
//! failures are mapped to minimal status responses by `proxy::error`.

// Core subsystems
pub mod config;
pub mod net;
pub mod pool;
pub mod proxy;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::ProxyServer;
