// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Settings validation.
//!
//! Validation runs every check and accumulates the findings, so a caller sees
//! all problems with a settings file at once:
//!
//! 1. **Thread pools**: every fixed-size pool needs at least one thread
//!    (`compute_threads` is exempt, non-positive means one per CPU)
//! 2. **DNS lifetimes**: the minimum TTL must not exceed the default TTL
//! 3. **Upstream groups**: names are unique, server addresses are `host:port`
//!    pairs and unique within their group
//!
//! Server weights and `max_fails` are not checked here: zero means 1 for both,
//! and the integer types bound the upper end.
//!
//! # Example
//! ```rust
//! use workloom::config::{validate_settings, Settings};
//!
//! let mut settings = Settings::default();
//! settings.poller_threads = 0;
//!
//! let errors = validate_settings(&settings).unwrap_err();
//! assert_eq!(errors.len(), 1);
//! ```

use std::collections::HashSet;

use crate::config::Settings;
use crate::errors::ValidationError;
use crate::upstream::split_host_port;

/// Check `settings` for values the runtime cannot be built from.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    errors.extend(validate_thread_counts(settings));
    errors.extend(validate_dns_ttl(settings));
    errors.extend(validate_upstreams(settings));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_thread_counts(settings: &Settings) -> Vec<ValidationError> {
    [
        ("dns_threads", settings.dns_threads),
        ("poller_threads", settings.poller_threads),
        ("handler_threads", settings.handler_threads),
        ("file_io_threads", settings.file_io_threads),
        ("endpoint.max_connections", settings.endpoint.max_connections),
    ]
    .into_iter()
    .filter(|(_, count)| *count == 0)
    .map(|(pool, _)| ValidationError::ZeroThreads { pool })
    .collect()
}

fn validate_dns_ttl(settings: &Settings) -> Option<ValidationError> {
    (settings.dns_ttl_min_secs > settings.dns_ttl_default_secs).then(|| ValidationError::DnsTtlInverted {
        default_secs: settings.dns_ttl_default_secs,
        min_secs: settings.dns_ttl_min_secs,
    })
}

fn validate_upstreams(settings: &Settings) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for upstream in &settings.upstreams {
        if !names.insert(upstream.name.as_str()) {
            errors.push(ValidationError::DuplicateUpstream {
                name: upstream.name.clone(),
            });
        }

        let mut addresses = HashSet::new();
        for server in &upstream.servers {
            if split_host_port(&server.address).is_none() {
                errors.push(ValidationError::InvalidServerAddress {
                    group: upstream.name.clone(),
                    address: server.address.clone(),
                });
            } else if !addresses.insert(server.address.as_str()) {
                errors.push(ValidationError::DuplicateServer {
                    group: upstream.name.clone(),
                    address: server.address.clone(),
                });
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, UpstreamConfig};

    fn server(address: &str) -> ServerConfig {
        ServerConfig {
            address: address.to_string(),
            weight: 1,
            max_fails: 1,
        }
    }

    fn upstream(name: &str, servers: Vec<ServerConfig>) -> UpstreamConfig {
        UpstreamConfig {
            name: name.to_string(),
            policy: Default::default(),
            try_another: false,
            servers,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_settings(&Settings::default()).is_ok());
    }

    #[test]
    fn zero_sized_pools_are_reported_by_name() {
        let mut settings = Settings::default();
        settings.dns_threads = 0;
        settings.handler_threads = 0;
        settings.compute_threads = 0;

        let errors = validate_settings(&settings).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroThreads { pool: "dns_threads" },
                ValidationError::ZeroThreads {
                    pool: "handler_threads"
                },
            ]
        );
    }

    #[test]
    fn inverted_dns_ttl_is_rejected() {
        let mut settings = Settings::default();
        settings.dns_ttl_default_secs = 60;
        settings.dns_ttl_min_secs = 120;

        let errors = validate_settings(&settings).unwrap_err();
        assert!(matches!(errors[0], ValidationError::DnsTtlInverted { .. }));
    }

    #[test]
    fn upstream_problems_accumulate() {
        let mut settings = Settings::default();
        settings.upstreams = vec![
            upstream("a", vec![server("h1:80"), server("h1:80"), server("h2"), server("nope:port")]),
            upstream("a", vec![]),
        ];

        let errors = validate_settings(&settings).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::DuplicateServer {
            group: "a".to_string(),
            address: "h1:80".to_string(),
        }));
        assert!(errors.contains(&ValidationError::InvalidServerAddress {
            group: "a".to_string(),
            address: "nope:port".to_string(),
        }));
        assert!(errors.contains(&ValidationError::DuplicateUpstream {
            name: "a".to_string()
        }));
    }
}
