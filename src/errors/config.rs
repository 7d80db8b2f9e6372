// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use thiserror::Error;

/// Errors found while validating runtime settings
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A thread pool was configured with zero threads
    ZeroThreads {
        /// Name of the pool setting
        pool: &'static str,
    },
    /// An upstream group is declared twice
    DuplicateUpstream {
        /// The duplicated group name
        name: String,
    },
    /// A server appears twice in the same group
    DuplicateServer {
        group: String,
        address: String,
    },
    /// The minimum DNS TTL is larger than the default one
    DnsTtlInverted {
        default_secs: u64,
        min_secs: u64,
    },
    /// A server entry is not a host or host:port address
    InvalidServerAddress {
        group: String,
        address: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroThreads { pool } => {
                write!(f, "Setting '{}' must be at least 1", pool)
            }
            ValidationError::DuplicateUpstream { name } => {
                write!(f, "Upstream group '{}' is declared more than once", name)
            }
            ValidationError::DuplicateServer { group, address } => {
                write!(
                    f,
                    "Server '{}' appears more than once in upstream group '{}'",
                    address, group
                )
            }
            ValidationError::DnsTtlInverted {
                default_secs,
                min_secs,
            } => {
                write!(
                    f,
                    "dns_ttl_min_secs ({}) must not exceed dns_ttl_default_secs ({})",
                    min_secs, default_secs
                )
            }
            ValidationError::InvalidServerAddress { group, address } => {
                write!(
                    f,
                    "Server '{}' in upstream group '{}' is not a host or host:port address",
                    address, group
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors surfaced while loading configuration or building a runtime from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("configuration validation failed:\n{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"))]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Runtime(#[from] super::RuntimeError),

    #[error(transparent)]
    Upstream(#[from] super::UpstreamError),
}
