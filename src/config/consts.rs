// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Live connections allowed per target before requests wait for a slot
pub const DEFAULT_MAX_CONNECTIONS: usize = 200;
/// Connect phase timeout (10 seconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: i64 = 10_000;
/// Whole-response timeout (10 seconds)
pub const DEFAULT_RESPONSE_TIMEOUT_MS: i64 = 10_000;
/// Idle keep-alive window for pooled connections (60 seconds)
pub const DEFAULT_KEEP_ALIVE_TIMEOUT_MS: i64 = 60_000;
/// Any negative timeout means "no limit"
pub const NO_TIMEOUT: i64 = -1;

/// DNS entry lifetime after a clean resolution (12 hours)
pub const DEFAULT_DNS_TTL_SECS: u64 = 12 * 3600;
/// DNS entry lifetime after a communication failure (3 minutes)
pub const DEFAULT_DNS_TTL_MIN_SECS: u64 = 180;

pub const DEFAULT_DNS_THREADS: usize = 8;
pub const DEFAULT_POLLER_THREADS: usize = 2;
pub const DEFAULT_HANDLER_THREADS: usize = 20;
/// Non-positive: one compute thread per CPU
pub const DEFAULT_COMPUTE_THREADS: i32 = -1;
pub const DEFAULT_FILE_IO_THREADS: usize = 4;

/// Time an excluded upstream server stays out of selection (30 seconds)
pub const DEFAULT_UPSTREAM_PROBATION_SECS: u64 = 30;
pub const DEFAULT_SERVER_WEIGHT: u16 = 1;
/// Consecutive failures before a server is excluded
pub const DEFAULT_SERVER_MAX_FAILS: u32 = 200;
