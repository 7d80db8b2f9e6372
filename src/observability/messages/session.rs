// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for connection and session events.

use crate::errors::TimeoutReason;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use tracing::Span;

/// Opening a connection failed.
///
/// # Log Level
/// `warn!` - Recoverable failure
///
/// # Example
/// ```
/// use workloom::observability::messages::session::ConnectFailed;
///
/// let error = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
/// let msg = ConnectFailed {
///     address: "127.0.0.1:9".parse().unwrap(),
///     error: &error,
/// };
/// tracing::warn!("{}", msg);
/// ```
pub struct ConnectFailed<'a> {
    pub address: SocketAddr,
    pub error: &'a dyn std::error::Error,
}

impl Display for ConnectFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Failed to connect to {}: {}", self.address, self.error)
    }
}

impl StructuredLog for ConnectFailed<'_> {
    fn log(&self) {
        tracing::warn!(address = %self.address, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("connect_failed", span_name = name, address = %self.address)
    }
}

/// A session exceeded one of its timeouts.
///
/// # Log Level
/// `debug!` - Surfaced to the caller through the task state
pub struct SessionTimedOut {
    pub address: SocketAddr,
    pub reason: TimeoutReason,
}

impl Display for SessionTimedOut {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Session to {} timed out during {}", self.address, self.reason)
    }
}

impl StructuredLog for SessionTimedOut {
    fn log(&self) {
        tracing::debug!(address = %self.address, reason = %self.reason, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "session_timed_out",
            span_name = name,
            address = %self.address,
            reason = %self.reason,
        )
    }
}

/// A pooled connection was evicted.
///
/// # Log Level
/// `trace!` - Pool churn
pub struct SessionEvicted<'a> {
    pub address: SocketAddr,
    pub cause: &'a str,
}

impl Display for SessionEvicted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Evicted connection to {}: {}", self.address, self.cause)
    }
}

impl StructuredLog for SessionEvicted<'_> {
    fn log(&self) {
        tracing::trace!(address = %self.address, cause = self.cause, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!("session_evicted", span_name = name, address = %self.address)
    }
}

/// An idle keep-alive connection was picked up for a new request.
///
/// # Log Level
/// `trace!` - Pool churn
pub struct SessionReused {
    pub address: SocketAddr,
}

impl Display for SessionReused {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Reusing keep-alive connection to {}", self.address)
    }
}

impl StructuredLog for SessionReused {
    fn log(&self) {
        tracing::trace!(address = %self.address, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!("session_reused", span_name = name, address = %self.address)
    }
}
