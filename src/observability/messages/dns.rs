// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for name resolution and cache events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A hostname was resolved and cached.
///
/// # Log Level
/// `debug!` - Cache churn
pub struct HostResolved<'a> {
    pub host: &'a str,
    pub port: u16,
    pub addresses: usize,
    pub ttl: Duration,
}

impl Display for HostResolved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Resolved {}:{} to {} addresses, cached for {:?}",
            self.host, self.port, self.addresses, self.ttl
        )
    }
}

impl StructuredLog for HostResolved<'_> {
    fn log(&self) {
        tracing::debug!(
            host = self.host,
            port = self.port,
            addresses = self.addresses,
            ttl_secs = self.ttl.as_secs(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("host_resolved", span_name = name, host = self.host, port = self.port)
    }
}

/// Resolving a hostname failed.
///
/// # Log Level
/// `warn!` - Requests to this host fail with a name resolution error
pub struct ResolutionFailed<'a> {
    pub host: &'a str,
    pub port: u16,
    pub error: &'a dyn std::error::Error,
}

impl Display for ResolutionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Failed to resolve {}:{}: {}", self.host, self.port, self.error)
    }
}

impl StructuredLog for ResolutionFailed<'_> {
    fn log(&self) {
        tracing::warn!(host = self.host, port = self.port, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("resolution_failed", span_name = name, host = self.host, port = self.port)
    }
}

/// A communication failure shortened the lifetime of a cached entry.
///
/// # Log Level
/// `debug!` - Cache churn
pub struct EntryShortened<'a> {
    pub host: &'a str,
    pub port: u16,
}

impl Display for EntryShortened<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Shortened cache lifetime of {}:{} after a failure", self.host, self.port)
    }
}

impl StructuredLog for EntryShortened<'_> {
    fn log(&self) {
        tracing::debug!(host = self.host, port = self.port, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("entry_shortened", span_name = name, host = self.host, port = self.port)
    }
}
