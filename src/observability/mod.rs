//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via `tracing`; one info line per accepted request,
//!   error/debug lines on failure
//! - Log level configurable via config, overridable with `RUST_LOG`

pub mod logging;
