// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for runtime and thread pool lifecycle events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Runtime finished starting all of its thread pools.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use workloom::observability::messages::runtime::RuntimeStarted;
///
/// let msg = RuntimeStarted {
///     poller_threads: 2,
///     handler_threads: 20,
///     compute_threads: 8,
///     dns_threads: 8,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RuntimeStarted {
    pub poller_threads: usize,
    pub handler_threads: usize,
    pub compute_threads: usize,
    pub dns_threads: usize,
}

impl Display for RuntimeStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Runtime started: {} poller, {} handler, {} compute, {} dns threads",
            self.poller_threads, self.handler_threads, self.compute_threads, self.dns_threads
        )
    }
}

impl StructuredLog for RuntimeStarted {
    fn log(&self) {
        tracing::info!(
            poller_threads = self.poller_threads,
            handler_threads = self.handler_threads,
            compute_threads = self.compute_threads,
            dns_threads = self.dns_threads,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "runtime",
            span_name = name,
            poller_threads = self.poller_threads,
            handler_threads = self.handler_threads,
            compute_threads = self.compute_threads,
            dns_threads = self.dns_threads,
        )
    }
}

/// Runtime stopped and joined its threads.
pub struct RuntimeStopped {
    pub uptime: std::time::Duration,
}

impl Display for RuntimeStopped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Runtime stopped after {:?}", self.uptime)
    }
}

impl StructuredLog for RuntimeStopped {
    fn log(&self) {
        tracing::info!(uptime_ms = self.uptime.as_millis() as u64, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("runtime_stopped", span_name = name, uptime = ?self.uptime)
    }
}

/// A worker pool spawned its threads.
///
/// # Log Level
/// `debug!` - Startup detail
pub struct ThreadPoolStarted<'a> {
    pub pool: &'a str,
    pub threads: usize,
}

impl Display for ThreadPoolStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Thread pool '{}' started with {} threads", self.pool, self.threads)
    }
}

impl StructuredLog for ThreadPoolStarted<'_> {
    fn log(&self) {
        tracing::debug!(pool = self.pool, threads = self.threads, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "thread_pool",
            span_name = name,
            pool = self.pool,
            threads = self.threads,
        )
    }
}

/// A job panicked on a pool thread. The worker survives.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct JobPanicked<'a> {
    pub pool: &'a str,
    pub queue: &'a str,
    pub message: &'a str,
}

impl Display for JobPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Job on queue '{}' of pool '{}' panicked: {}",
            self.queue, self.pool, self.message
        )
    }
}

impl StructuredLog for JobPanicked<'_> {
    fn log(&self) {
        tracing::error!(
            pool = self.pool,
            queue = self.queue,
            panic = self.message,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "job_panicked",
            span_name = name,
            pool = self.pool,
            queue = self.queue,
        )
    }
}

/// A poller shard failed to wait for events.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct PollerFailed<'a> {
    pub shard: usize,
    pub error: &'a dyn std::error::Error,
}

impl Display for PollerFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Poller shard {} failed: {}", self.shard, self.error)
    }
}

impl StructuredLog for PollerFailed<'_> {
    fn log(&self) {
        tracing::error!(shard = self.shard, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("poller_failed", span_name = name, shard = self.shard)
    }
}
