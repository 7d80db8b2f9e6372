// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout workloom. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep field names consistent between the human-readable and structured output
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::runtime` - runtime and thread pool lifecycle
//! * `messages::engine` - series and parallel group events
//! * `messages::session` - connection and session events
//! * `messages::upstream` - address health transitions
//! * `messages::dns` - name resolution and cache events
//!
//! # Usage
//!
//! ```rust
//! use workloom::observability::messages::StructuredLog;
//! use workloom::observability::messages::upstream::ServerExcluded;
//!
//! let msg = ServerExcluded {
//!     group: "svc",
//!     address: "10.0.0.1:8080",
//!     consecutive_fails: 3,
//! };
//!
//! msg.log();
//! ```

pub mod messages;

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Calling this more than once,
/// or after another subscriber was installed, is a no-op.
pub fn init_tracing(default_filter: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init();
    });
}
