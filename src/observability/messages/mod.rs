// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for human-readable output and
//! [`StructuredLog`] to emit the same event with typed fields.
//!
//! # Organization
//!
//! * `runtime` - runtime and thread pool lifecycle
//! * `engine` - series and parallel group events
//! * `session` - connection and session events
//! * `upstream` - address health transitions
//! * `dns` - name resolution and cache events
//!
//! # Usage Pattern
//!
//! ```rust
//! use workloom::observability::messages::StructuredLog;
//! use workloom::observability::messages::runtime::ThreadPoolStarted;
//!
//! let msg = ThreadPoolStarted {
//!     pool: "compute",
//!     threads: 8,
//! };
//!
//! tracing::info!("{}", msg);
//! msg.log();
//! ```

use tracing::Span;

pub mod dns;
pub mod engine;
pub mod runtime;
pub mod session;
pub mod upstream;

/// Emit a message as a structured `tracing` event or open a span carrying its fields.
pub trait StructuredLog {
    /// Emit the event at the message's natural level.
    fn log(&self);

    /// Open a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
