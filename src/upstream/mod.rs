// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Upstream registry: named groups of server addresses with selection and
//! health tracking.
//!
//! # Selection
//! A group selects either by **weighted random** (the default), proportional to
//! each eligible server's weight, or through a caller-supplied **route**
//! function that maps the request's path, query and fragment to a key; the key
//! picks `servers[key % len]`. When that server is excluded and the group has
//! `try_another` set, the key (or the output of the group's rehash function, if
//! one is set) is placed on a consistent-hash ring and the next eligible server
//! clockwise is used instead.
//!
//! The ring keeps unrelated keys in place when one server drops out, but the
//! balance of a custom rehash function is the caller's responsibility: the
//! registry does not check that it distributes keys sensibly.
//!
//! # Health
//! Each failed use of a server reported through
//! [`UpstreamManager::notify_unavailable`] increments its consecutive-failure
//! counter. Reaching `max_fails` excludes the server for the probation window;
//! afterwards it is eligible again and live traffic decides: another failure
//! excludes it for a fresh window, a success resets the counter to zero.
//!
//! # Example
//! ```rust
//! use workloom::upstream::{RouteKey, SelectPolicy, UpstreamManager, UpstreamResult};
//! use std::time::Duration;
//!
//! let upstreams = UpstreamManager::new(Duration::from_secs(30));
//! upstreams.create_group("svc", SelectPolicy::WeightedRandom).unwrap();
//! upstreams.add_server("svc", "10.0.0.1:8080", None).unwrap();
//!
//! match upstreams.choose("svc", &RouteKey::default()) {
//!     UpstreamResult::Found(selection) => assert_eq!(selection.port, Some(8080)),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

mod group;
mod ring;

pub use group::ServerEntry;

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::consts::{DEFAULT_SERVER_MAX_FAILS, DEFAULT_SERVER_WEIGHT};
use crate::dns::DnsTtl;
use crate::errors::UpstreamError;
use crate::observability::messages::upstream::{ServerExcluded, ServerRecovered, UpstreamAllDown};
use crate::observability::messages::StructuredLog;
use group::Group;

/// Maps `(path, query, fragment)` to a selection key.
pub type RouteFn = Arc<dyn Fn(&str, &str, &str) -> u32 + Send + Sync>;
/// Fallback key used when the routed server is excluded.
pub type RehashFn = Arc<dyn Fn(&str, &str, &str) -> u32 + Send + Sync>;

#[derive(Clone, Default)]
pub enum SelectPolicy {
    #[default]
    WeightedRandom,
    Route(RouteFn),
}

impl std::fmt::Debug for SelectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectPolicy::WeightedRandom => f.write_str("WeightedRandom"),
            SelectPolicy::Route(_) => f.write_str("Route(..)"),
        }
    }
}

/// Request components handed to route and rehash functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteKey<'a> {
    pub path: &'a str,
    pub query: &'a str,
    pub fragment: &'a str,
}

/// Per-server parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressParams {
    /// Relative share in weighted random selection, 1..=65535.
    pub weight: u16,
    /// Consecutive failures that exclude the server.
    pub max_fails: u32,
    /// Lifetimes for the DNS entry of this server's host.
    pub dns_ttl: DnsTtl,
}

impl Default for AddressParams {
    fn default() -> Self {
        Self {
            weight: DEFAULT_SERVER_WEIGHT,
            max_fails: DEFAULT_SERVER_MAX_FAILS,
            dns_ttl: DnsTtl::default(),
        }
    }
}

impl AddressParams {
    /// Zero weight and zero `max_fails` both mean 1.
    pub fn normalized(mut self) -> Self {
        self.weight = self.weight.max(1);
        self.max_fails = self.max_fails.max(1);
        self
    }
}

/// Opaque handle for reporting the outcome of using a selected server.
#[derive(Debug, Clone)]
pub struct UpstreamCookie {
    group: Arc<str>,
    server: Arc<ServerEntry>,
}

/// A chosen server.
#[derive(Debug, Clone)]
pub struct Selection {
    pub address: String,
    pub host: String,
    /// `None` when the server was added without a port; the request's own
    /// port is used then.
    pub port: Option<u16>,
    pub params: AddressParams,
    pub cookie: UpstreamCookie,
}

#[derive(Debug, Clone)]
pub enum UpstreamResult {
    Found(Selection),
    /// No group with that name.
    NotFound,
    /// The group exists but has no eligible server.
    AllDown,
}

pub struct UpstreamManager {
    groups: DashMap<String, Arc<RwLock<Group>>>,
    probation: Duration,
}

impl UpstreamManager {
    pub fn new(probation: Duration) -> Self {
        Self {
            groups: DashMap::new(),
            probation,
        }
    }

    pub fn probation(&self) -> Duration {
        self.probation
    }

    pub fn contains_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn create_group(&self, name: &str, policy: SelectPolicy) -> Result<(), UpstreamError> {
        match self.groups.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(UpstreamError::GroupExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(RwLock::new(Group::new(policy))));
                Ok(())
            }
        }
    }

    pub fn delete_group(&self, name: &str) -> Result<(), UpstreamError> {
        self.groups
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| UpstreamError::GroupNotFound(name.to_string()))
    }

    pub fn set_attr(
        &self,
        name: &str,
        try_another: bool,
        rehash: Option<RehashFn>,
    ) -> Result<(), UpstreamError> {
        let group = self.group(name)?;
        let mut group = group.write();
        group.try_another = try_another;
        group.rehash = rehash;
        Ok(())
    }

    pub fn add_server(
        &self,
        name: &str,
        address: &str,
        params: Option<AddressParams>,
    ) -> Result<(), UpstreamError> {
        let (host, port) = split_host_port(address)
            .ok_or_else(|| UpstreamError::InvalidAddress(address.to_string()))?;
        let group = self.group(name)?;
        let mut group = group.write();
        if group.position(address).is_some() {
            return Err(UpstreamError::ServerExists {
                group: name.to_string(),
                address: address.to_string(),
            });
        }
        let params = params.unwrap_or_default().normalized();
        group.insert(Arc::new(ServerEntry::new(address.to_string(), host, port, params)));
        Ok(())
    }

    pub fn remove_server(&self, name: &str, address: &str) -> Result<(), UpstreamError> {
        let group = self.group(name)?;
        let mut group = group.write();
        let index = group
            .position(address)
            .ok_or_else(|| UpstreamError::ServerNotFound {
                group: name.to_string(),
                address: address.to_string(),
            })?;
        group.remove(index);
        Ok(())
    }

    /// Addresses of the group in insertion order.
    pub fn server_addresses(&self, name: &str) -> Result<Vec<String>, UpstreamError> {
        let group = self.group(name)?;
        let group = group.read();
        Ok(group.servers.iter().map(|s| s.address.clone()).collect())
    }

    pub fn choose(&self, name: &str, key: &RouteKey<'_>) -> UpstreamResult {
        self.choose_at(name, key, Instant::now())
    }

    pub fn choose_at(&self, name: &str, key: &RouteKey<'_>, now: Instant) -> UpstreamResult {
        let Ok(group) = self.group(name) else {
            return UpstreamResult::NotFound;
        };
        let selected = group.read().select(key, self.probation, now);
        match selected {
            Some(server) => UpstreamResult::Found(Selection {
                address: server.address.clone(),
                host: server.host.clone(),
                port: server.port,
                params: server.params,
                cookie: UpstreamCookie {
                    group: Arc::from(name),
                    server,
                },
            }),
            None => {
                UpstreamAllDown { group: name }.log();
                UpstreamResult::AllDown
            }
        }
    }

    /// Report a failed use of the server behind `cookie`.
    pub fn notify_unavailable(&self, cookie: &UpstreamCookie) {
        self.notify_unavailable_at(cookie, Instant::now());
    }

    pub fn notify_unavailable_at(&self, cookie: &UpstreamCookie, now: Instant) {
        let server = &cookie.server;
        let mut health = server.health.lock();
        health.fails = health.fails.saturating_add(1);
        if health.fails >= server.params.max_fails {
            health.down_since = Some(now);
            ServerExcluded {
                group: &cookie.group,
                address: &server.address,
                consecutive_fails: health.fails,
            }
            .log();
        }
    }

    /// Report a successful use of the server behind `cookie`.
    pub fn notify_available(&self, cookie: &UpstreamCookie) {
        let server = &cookie.server;
        let mut health = server.health.lock();
        if health.fails >= server.params.max_fails {
            ServerRecovered {
                group: &cookie.group,
                address: &server.address,
            }
            .log();
        }
        health.fails = 0;
        health.down_since = None;
    }

    fn group(&self, name: &str) -> Result<Arc<RwLock<Group>>, UpstreamError> {
        self.groups
            .get(name)
            .map(|g| Arc::clone(g.value()))
            .ok_or_else(|| UpstreamError::GroupNotFound(name.to_string()))
    }
}

impl std::fmt::Debug for UpstreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamManager")
            .field("groups", &self.groups.len())
            .field("probation", &self.probation)
            .finish()
    }
}

/// Split `host`, `host:port`, `[v6]` or `[v6]:port`. An unbracketed IPv6
/// literal is a host without a port.
pub(crate) fn split_host_port(address: &str) -> Option<(String, Option<u16>)> {
    let (host, port) = match address.strip_prefix('[') {
        Some(rest) => {
            let (host, tail) = rest.split_once(']')?;
            if tail.is_empty() {
                (host, None)
            } else {
                (host, Some(tail.strip_prefix(':')?))
            }
        }
        None => match address.split_once(':') {
            Some((host, port)) if !port.contains(':') => (host, Some(port)),
            _ => (address, None),
        },
    };
    let port = port.map(str::parse::<u16>).transpose().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBATION: Duration = Duration::from_secs(30);

    fn params(weight: u16, max_fails: u32) -> Option<AddressParams> {
        Some(AddressParams {
            weight,
            max_fails,
            ..AddressParams::default()
        })
    }

    fn found(result: UpstreamResult) -> Selection {
        match result {
            UpstreamResult::Found(selection) => selection,
            other => panic!("expected a selection, got {:?}", other),
        }
    }

    #[test]
    fn weighted_random_follows_weights() {
        let upstreams = UpstreamManager::new(PROBATION);
        upstreams.create_group("svc", SelectPolicy::WeightedRandom).unwrap();
        upstreams.add_server("svc", "a:80", params(3, 200)).unwrap();
        upstreams.add_server("svc", "b:80", params(1, 200)).unwrap();

        let mut a = 0u32;
        let mut b = 0u32;
        for _ in 0..100_000 {
            match found(upstreams.choose("svc", &RouteKey::default())).address.as_str() {
                "a:80" => a += 1,
                _ => b += 1,
            }
        }
        let ratio = f64::from(a) / f64::from(b);
        assert!((2.8..3.2).contains(&ratio), "ratio was {}", ratio);
    }

    #[test]
    fn failed_server_is_excluded_until_probation_ends() {
        let upstreams = UpstreamManager::new(PROBATION);
        upstreams.create_group("svc", SelectPolicy::WeightedRandom).unwrap();
        upstreams.add_server("svc", "a:80", params(1, 1)).unwrap();
        upstreams.add_server("svc", "b:80", params(1, 1)).unwrap();

        let t0 = Instant::now();
        let down = loop {
            let selection = found(upstreams.choose_at("svc", &RouteKey::default(), t0));
            if selection.address == "a:80" {
                break selection;
            }
        };
        upstreams.notify_unavailable_at(&down.cookie, t0);

        for _ in 0..1000 {
            let selection = found(upstreams.choose_at("svc", &RouteKey::default(), t0));
            assert_eq!(selection.address, "b:80");
        }

        // Back in rotation once probation elapsed.
        let later = t0 + PROBATION;
        let seen_a = (0..1000).any(|_| {
            found(upstreams.choose_at("svc", &RouteKey::default(), later)).address == "a:80"
        });
        assert!(seen_a);
    }

    #[test]
    fn failure_after_probation_restarts_it_and_success_resets() {
        let upstreams = UpstreamManager::new(PROBATION);
        upstreams.create_group("svc", SelectPolicy::WeightedRandom).unwrap();
        upstreams.add_server("svc", "a:80", params(1, 2)).unwrap();
        let t0 = Instant::now();
        let cookie = found(upstreams.choose_at("svc", &RouteKey::default(), t0)).cookie;

        upstreams.notify_unavailable_at(&cookie, t0);
        upstreams.notify_unavailable_at(&cookie, t0);
        assert!(matches!(
            upstreams.choose_at("svc", &RouteKey::default(), t0),
            UpstreamResult::AllDown
        ));

        let t1 = t0 + PROBATION;
        assert!(matches!(
            upstreams.choose_at("svc", &RouteKey::default(), t1),
            UpstreamResult::Found(_)
        ));
        upstreams.notify_unavailable_at(&cookie, t1);
        assert!(matches!(
            upstreams.choose_at("svc", &RouteKey::default(), t1 + PROBATION / 2),
            UpstreamResult::AllDown
        ));

        upstreams.notify_available(&cookie);
        assert_eq!(cookie.server.health.lock().fails, 0);
        assert!(matches!(
            upstreams.choose_at("svc", &RouteKey::default(), t1),
            UpstreamResult::Found(_)
        ));
    }

    #[test]
    fn route_function_picks_by_key() {
        let upstreams = UpstreamManager::new(PROBATION);
        let route: RouteFn = Arc::new(|path: &str, _: &str, _: &str| path.len() as u32);
        upstreams.create_group("svc", SelectPolicy::Route(route)).unwrap();
        for address in ["a:1", "b:1", "c:1"] {
            upstreams.add_server("svc", address, None).unwrap();
        }
        let key = RouteKey {
            path: "/x",
            ..RouteKey::default()
        };
        assert_eq!(found(upstreams.choose("svc", &key)).address, "c:1");
    }

    #[test]
    fn excluded_route_target_falls_back_only_with_try_another() {
        let upstreams = UpstreamManager::new(PROBATION);
        let route: RouteFn = Arc::new(|_: &str, _: &str, _: &str| 0);
        upstreams.create_group("svc", SelectPolicy::Route(route)).unwrap();
        for address in ["a:1", "b:1", "c:1"] {
            upstreams.add_server("svc", address, params(1, 1)).unwrap();
        }
        let key = RouteKey::default();
        let primary = found(upstreams.choose("svc", &key));
        assert_eq!(primary.address, "a:1");
        upstreams.notify_unavailable(&primary.cookie);

        assert!(matches!(upstreams.choose("svc", &key), UpstreamResult::AllDown));

        let rehash: RehashFn = Arc::new(|_: &str, _: &str, _: &str| 42);
        upstreams.set_attr("svc", true, Some(rehash)).unwrap();
        let first = found(upstreams.choose("svc", &key)).address;
        assert_ne!(first, "a:1");
        for _ in 0..20 {
            assert_eq!(found(upstreams.choose("svc", &key)).address, first);
        }
    }

    #[test]
    fn unknown_and_empty_groups() {
        let upstreams = UpstreamManager::new(PROBATION);
        assert!(matches!(
            upstreams.choose("missing", &RouteKey::default()),
            UpstreamResult::NotFound
        ));
        upstreams.create_group("empty", SelectPolicy::WeightedRandom).unwrap();
        assert!(matches!(
            upstreams.choose("empty", &RouteKey::default()),
            UpstreamResult::AllDown
        ));
    }

    #[test]
    fn registry_mutations_report_errors() {
        let upstreams = UpstreamManager::new(PROBATION);
        upstreams.create_group("svc", SelectPolicy::WeightedRandom).unwrap();
        assert_eq!(
            upstreams.create_group("svc", SelectPolicy::WeightedRandom),
            Err(UpstreamError::GroupExists("svc".into()))
        );
        assert_eq!(
            upstreams.add_server("svc", "no-port", None),
            Err(UpstreamError::InvalidAddress("no-port".into()))
        );
        upstreams.add_server("svc", "[::1]:9000", None).unwrap();
        assert!(matches!(
            upstreams.add_server("svc", "[::1]:9000", None),
            Err(UpstreamError::ServerExists { .. })
        ));
        assert!(matches!(
            upstreams.remove_server("svc", "a:1"),
            Err(UpstreamError::ServerNotFound { .. })
        ));
        assert_eq!(upstreams.server_addresses("svc").unwrap(), vec!["[::1]:9000"]);
        upstreams.remove_server("svc", "[::1]:9000").unwrap();
        assert!(upstreams.server_addresses("svc").unwrap().is_empty());
        upstreams.delete_group("svc").unwrap();
        assert_eq!(
            upstreams.delete_group("svc"),
            Err(UpstreamError::GroupNotFound("svc".into()))
        );
    }

    #[test]
    fn zero_params_normalize_to_one() {
        let upstreams = UpstreamManager::new(PROBATION);
        upstreams.create_group("svc", SelectPolicy::WeightedRandom).unwrap();
        upstreams.add_server("svc", "a:1", params(0, 0)).unwrap();
        let selection = found(upstreams.choose("svc", &RouteKey::default()));
        assert_eq!(selection.params.weight, 1);
        assert_eq!(selection.params.max_fails, 1);
        assert_eq!(selection.host, "a");
    }

    #[test]
    fn servers_may_be_added_without_a_port() {
        let upstreams = UpstreamManager::new(PROBATION);
        upstreams.create_group("abc.example", SelectPolicy::WeightedRandom).unwrap();
        upstreams.add_server("abc.example", "www.example.com", None).unwrap();

        let selection = found(upstreams.choose("abc.example", &RouteKey::default()));
        assert_eq!(selection.host, "www.example.com");
        assert_eq!(selection.port, None);
        assert!(matches!(
            upstreams.add_server("abc.example", "www.example.com:", None),
            Err(UpstreamError::InvalidAddress(_))
        ));
    }

    #[test]
    fn host_port_splitting() {
        assert_eq!(split_host_port("example.com:443"), Some(("example.com".into(), Some(443))));
        assert_eq!(split_host_port("[::1]:80"), Some(("::1".into(), Some(80))));
        assert_eq!(split_host_port("www.example.com"), Some(("www.example.com".into(), None)));
        assert_eq!(split_host_port("[::1]"), Some(("::1".into(), None)));
        assert_eq!(split_host_port("fe80::1"), Some(("fe80::1".into(), None)));
        assert_eq!(split_host_port(":80"), None);
        assert_eq!(split_host_port("host:http"), None);
        assert_eq!(split_host_port("[::1]80"), None);
        assert_eq!(split_host_port(""), None);
    }
}
