// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for upstream health transitions.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A server reached `max_fails` and left the selection pool.
///
/// # Log Level
/// `warn!` - Degraded capacity
pub struct ServerExcluded<'a> {
    pub group: &'a str,
    pub address: &'a str,
    pub consecutive_fails: u32,
}

impl Display for ServerExcluded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Upstream '{}' excluded server {} after {} consecutive failures",
            self.group, self.address, self.consecutive_fails
        )
    }
}

impl StructuredLog for ServerExcluded<'_> {
    fn log(&self) {
        tracing::warn!(
            group = self.group,
            address = self.address,
            consecutive_fails = self.consecutive_fails,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "server_excluded",
            span_name = name,
            group = self.group,
            address = self.address,
        )
    }
}

/// A previously excluded server succeeded again.
///
/// # Log Level
/// `info!` - Capacity restored
pub struct ServerRecovered<'a> {
    pub group: &'a str,
    pub address: &'a str,
}

impl Display for ServerRecovered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Upstream '{}' server {} recovered", self.group, self.address)
    }
}

impl StructuredLog for ServerRecovered<'_> {
    fn log(&self) {
        tracing::info!(group = self.group, address = self.address, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "server_recovered",
            span_name = name,
            group = self.group,
            address = self.address,
        )
    }
}

/// Selection found no eligible server in a group.
///
/// # Log Level
/// `warn!` - Requests are failing
pub struct UpstreamAllDown<'a> {
    pub group: &'a str,
}

impl Display for UpstreamAllDown<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Upstream '{}' has no available server", self.group)
    }
}

impl StructuredLog for UpstreamAllDown<'_> {
    fn log(&self) {
        tracing::warn!(group = self.group, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("upstream_all_down", span_name = name, group = self.group)
    }
}
