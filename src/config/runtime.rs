// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::{validate_settings, PolicyConfig, Settings, UpstreamConfig};
use crate::errors::ConfigError;
use crate::runtime::Runtime;
use crate::traits::Resolver;
use crate::upstream::{AddressParams, SelectPolicy, UpstreamManager};

/// Runtime builder - validates settings, starts a [`Runtime`] and registers
/// the declared upstream groups.
///
/// # Examples
///
/// ```
/// use workloom::config::{RuntimeBuilder, Settings};
///
/// let settings: Settings = serde_yaml::from_str(r#"
/// compute_threads: 2
/// upstreams:
///   - name: backend
///     servers:
///       - address: "127.0.0.1:8080"
/// "#).unwrap();
///
/// let runtime = RuntimeBuilder::from_config(&settings).unwrap();
/// assert!(runtime.upstreams().contains_group("backend"));
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build a runtime that resolves names through the operating system.
    pub fn from_config(settings: &Settings) -> Result<Runtime, ConfigError> {
        validate_settings(settings).map_err(ConfigError::Invalid)?;
        let runtime = Runtime::new(settings.clone())?;
        register_upstreams(runtime.upstreams(), settings)?;
        Ok(runtime)
    }

    /// Build a runtime with a custom name resolver.
    pub fn from_config_with_resolver(
        settings: &Settings,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Runtime, ConfigError> {
        validate_settings(settings).map_err(ConfigError::Invalid)?;
        let runtime = Runtime::with_resolver(settings.clone(), resolver)?;
        register_upstreams(runtime.upstreams(), settings)?;
        Ok(runtime)
    }
}

fn register_upstreams(upstreams: &UpstreamManager, settings: &Settings) -> Result<(), ConfigError> {
    let dns_ttl = settings.dns_ttl();
    for upstream in &settings.upstreams {
        upstreams.create_group(&upstream.name, select_policy(upstream))?;
        upstreams.set_attr(&upstream.name, upstream.try_another, None)?;
        for server in &upstream.servers {
            let params = AddressParams {
                weight: server.weight,
                max_fails: server.max_fails,
                dns_ttl,
            };
            upstreams.add_server(&upstream.name, &server.address, Some(params))?;
        }
    }
    Ok(())
}

fn select_policy(upstream: &UpstreamConfig) -> SelectPolicy {
    match upstream.policy {
        PolicyConfig::WeightedRandom => SelectPolicy::WeightedRandom,
        PolicyConfig::PathHash => SelectPolicy::Route(Arc::new(|path: &str, query: &str, _: &str| {
            let mut hasher = DefaultHasher::new();
            path.hash(&mut hasher);
            query.hash(&mut hasher);
            hasher.finish() as u32
        })),
    }
}
