// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_COMPUTE_THREADS, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DNS_THREADS, DEFAULT_DNS_TTL_MIN_SECS,
    DEFAULT_DNS_TTL_SECS, DEFAULT_FILE_IO_THREADS, DEFAULT_HANDLER_THREADS, DEFAULT_KEEP_ALIVE_TIMEOUT_MS,
    DEFAULT_MAX_CONNECTIONS, DEFAULT_POLLER_THREADS, DEFAULT_RESPONSE_TIMEOUT_MS, DEFAULT_SERVER_MAX_FAILS,
    DEFAULT_SERVER_WEIGHT, DEFAULT_UPSTREAM_PROBATION_SECS, NO_TIMEOUT,
};
use crate::dns::DnsTtl;
use crate::errors::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Runtime-wide settings.
///
/// Every field has a default, so an empty document (or no document at all)
/// yields a working runtime.
///
/// # Example
/// ```yaml
/// poller_threads: 4
/// compute_threads: -1
/// endpoint:
///   max_connections: 64
///   connect_timeout_ms: 2000
///   keep_alive_timeout_ms: 30000
/// upstreams:
///   - name: backend
///     try_another: true
///     servers:
///       - address: "10.0.0.1:8080"
///         weight: 3
///       - address: "10.0.0.2:8080"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub endpoint: EndpointSettings,
    pub dns_ttl_default_secs: u64,
    pub dns_ttl_min_secs: u64,
    pub dns_threads: usize,
    pub poller_threads: usize,
    pub handler_threads: usize,
    /// Non-positive means one thread per CPU.
    pub compute_threads: i32,
    pub file_io_threads: usize,
    pub upstream_probation_secs: u64,
    pub upstreams: Vec<UpstreamConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: EndpointSettings::default(),
            dns_ttl_default_secs: DEFAULT_DNS_TTL_SECS,
            dns_ttl_min_secs: DEFAULT_DNS_TTL_MIN_SECS,
            dns_threads: DEFAULT_DNS_THREADS,
            poller_threads: DEFAULT_POLLER_THREADS,
            handler_threads: DEFAULT_HANDLER_THREADS,
            compute_threads: DEFAULT_COMPUTE_THREADS,
            file_io_threads: DEFAULT_FILE_IO_THREADS,
            upstream_probation_secs: DEFAULT_UPSTREAM_PROBATION_SECS,
            upstreams: Vec::new(),
        }
    }
}

impl Settings {
    /// Lifetimes for DNS entries of hosts that are not upstream servers.
    pub fn dns_ttl(&self) -> DnsTtl {
        DnsTtl {
            default: Duration::from_secs(self.dns_ttl_default_secs),
            min: Duration::from_secs(self.dns_ttl_min_secs),
        }
    }

    pub fn upstream_probation(&self) -> Duration {
        Duration::from_secs(self.upstream_probation_secs)
    }
}

/// Connection defaults for network tasks. Timeouts are in milliseconds and a
/// negative value means "no limit".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Live connections allowed per target address.
    pub max_connections: usize,
    pub connect_timeout_ms: i64,
    pub send_timeout_ms: i64,
    pub receive_timeout_ms: i64,
    pub response_timeout_ms: i64,
    /// Zero disables connection reuse.
    pub keep_alive_timeout_ms: i64,
    /// Time to wait for a connection slot; the connect timeout when unset.
    pub wait_timeout_ms: Option<i64>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            send_timeout_ms: NO_TIMEOUT,
            receive_timeout_ms: NO_TIMEOUT,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            keep_alive_timeout_ms: DEFAULT_KEEP_ALIVE_TIMEOUT_MS,
            wait_timeout_ms: None,
        }
    }
}

/// Declarative upstream group, registered when the runtime is built.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub try_another: bool,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Selection policies expressible in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyConfig {
    #[default]
    WeightedRandom,
    /// Route by a hash of the request path and query.
    PathHash,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `host:port`
    pub address: String,
    #[serde(default = "default_weight")]
    pub weight: u16,
    #[serde(default = "default_max_fails")]
    pub max_fails: u32,
}

fn default_weight() -> u16 {
    DEFAULT_SERVER_WEIGHT
}

fn default_max_fails() -> u32 {
    DEFAULT_SERVER_MAX_FAILS
}

/// Load settings from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path)?;
    let settings: Settings = serde_yaml::from_str(&content)?;
    Ok(settings)
}

/// Load settings from a YAML file and reject them if any value is unusable.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let settings = load_config(path)?;
    crate::config::validate_settings(&settings).map_err(ConfigError::Invalid)?;
    Ok(settings)
}
