// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::ring::HashRing;
use super::{AddressParams, RehashFn, RouteKey, SelectPolicy};

#[derive(Debug, Default)]
pub(crate) struct Health {
    pub(crate) fails: u32,
    pub(crate) down_since: Option<Instant>,
}

/// One address of a group together with its health record.
#[derive(Debug)]
pub struct ServerEntry {
    pub(crate) address: String,
    pub(crate) host: String,
    pub(crate) port: Option<u16>,
    pub(crate) params: AddressParams,
    pub(crate) health: Mutex<Health>,
}

impl ServerEntry {
    pub(crate) fn new(address: String, host: String, port: Option<u16>, params: AddressParams) -> Self {
        Self {
            address,
            host,
            port,
            params,
            health: Mutex::new(Health::default()),
        }
    }

    /// Whether live traffic may be sent here at `now`.
    pub(crate) fn is_eligible(&self, probation: Duration, now: Instant) -> bool {
        let health = self.health.lock();
        if health.fails < self.params.max_fails {
            return true;
        }
        health
            .down_since
            .map_or(true, |since| now.saturating_duration_since(since) >= probation)
    }
}

pub(crate) struct Group {
    pub(crate) policy: SelectPolicy,
    pub(crate) try_another: bool,
    pub(crate) rehash: Option<RehashFn>,
    pub(crate) servers: Vec<Arc<ServerEntry>>,
    ring: HashRing,
}

impl Group {
    pub(crate) fn new(policy: SelectPolicy) -> Self {
        Self {
            policy,
            try_another: false,
            rehash: None,
            servers: Vec::new(),
            ring: HashRing::default(),
        }
    }

    pub(crate) fn position(&self, address: &str) -> Option<usize> {
        self.servers.iter().position(|s| s.address == address)
    }

    pub(crate) fn insert(&mut self, server: Arc<ServerEntry>) {
        self.servers.push(server);
        self.rebuild_ring();
    }

    pub(crate) fn remove(&mut self, index: usize) -> Arc<ServerEntry> {
        let server = self.servers.remove(index);
        self.rebuild_ring();
        server
    }

    fn rebuild_ring(&mut self) {
        self.ring = HashRing::build(self.servers.iter().map(|s| s.address.as_str()));
    }

    /// Pick a server, or `None` when every candidate is excluded.
    pub(crate) fn select(
        &self,
        key: &RouteKey<'_>,
        probation: Duration,
        now: Instant,
    ) -> Option<Arc<ServerEntry>> {
        if self.servers.is_empty() {
            return None;
        }
        match &self.policy {
            SelectPolicy::WeightedRandom => self.select_weighted(probation, now),
            SelectPolicy::Route(route) => {
                let hash = route(key.path, key.query, key.fragment);
                let primary = &self.servers[hash as usize % self.servers.len()];
                if primary.is_eligible(probation, now) {
                    return Some(Arc::clone(primary));
                }
                if !self.try_another {
                    return None;
                }
                let rehashed = match &self.rehash {
                    Some(rehash) => rehash(key.path, key.query, key.fragment),
                    None => hash,
                };
                self.ring
                    .locate(rehashed, |i| self.servers[i].is_eligible(probation, now))
                    .map(|i| Arc::clone(&self.servers[i]))
            }
        }
    }

    fn select_weighted(&self, probation: Duration, now: Instant) -> Option<Arc<ServerEntry>> {
        let eligible: Vec<&Arc<ServerEntry>> = self
            .servers
            .iter()
            .filter(|s| s.is_eligible(probation, now))
            .collect();
        let total: u64 = eligible.iter().map(|s| u64::from(s.params.weight)).sum();
        if total == 0 {
            return None;
        }
        let mut point = rand::thread_rng().gen_range(0..total);
        for server in eligible {
            let weight = u64::from(server.params.weight);
            if point < weight {
                return Some(Arc::clone(server));
            }
            point -= weight;
        }
        None
    }
}
