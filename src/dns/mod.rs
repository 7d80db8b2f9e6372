// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Name resolution cache.
//!
//! Entries map `(host, port)` to the address list the resolver returned and
//! carry two lifetimes: the default TTL applied on a clean resolution, and a
//! shorter minimum TTL. After a communication failure the session layer calls
//! [`DnsCache::invalidate_fast`], which caps the entry's lifetime at
//! `resolved_at + ttl_min` instead of dropping it, so a transient failure does
//! not stampede the resolver while a real address change is still picked up
//! quickly.
//!
//! The map is a `DashMap`: lookups and updates for different hosts lock
//! different shards.

mod service;

pub use service::{DnsService, Resolution};

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::observability::messages::dns::EntryShortened;
use crate::observability::messages::StructuredLog;

/// Lifetimes applied to a resolved entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsTtl {
    pub default: Duration,
    pub min: Duration,
}

impl Default for DnsTtl {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(crate::config::consts::DEFAULT_DNS_TTL_SECS),
            min: Duration::from_secs(crate::config::consts::DEFAULT_DNS_TTL_MIN_SECS),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    addresses: Arc<[SocketAddr]>,
    resolved_at: Instant,
    expire_at: Instant,
    ttl_min: Duration,
}

#[derive(Debug, Default)]
pub struct DnsCache {
    entries: DashMap<(String, u16), CacheEntry>,
}

impl DnsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unexpired addresses for `host:port`.
    pub fn get(&self, host: &str, port: u16) -> Option<Arc<[SocketAddr]>> {
        self.get_at(host, port, Instant::now())
    }

    pub fn get_at(&self, host: &str, port: u16, now: Instant) -> Option<Arc<[SocketAddr]>> {
        let entry = self.entries.get(&(host.to_string(), port))?;
        (now < entry.expire_at).then(|| Arc::clone(&entry.addresses))
    }

    pub fn insert(&self, host: &str, port: u16, addresses: Arc<[SocketAddr]>, ttl: DnsTtl) {
        self.insert_at(host, port, addresses, ttl, Instant::now());
    }

    pub fn insert_at(
        &self,
        host: &str,
        port: u16,
        addresses: Arc<[SocketAddr]>,
        ttl: DnsTtl,
        now: Instant,
    ) {
        self.entries.insert(
            (host.to_string(), port),
            CacheEntry {
                addresses,
                resolved_at: now,
                expire_at: now + ttl.default,
                ttl_min: ttl.min,
            },
        );
    }

    /// Shrink the entry's remaining lifetime to at most its minimum TTL,
    /// counted from when it was resolved.
    pub fn invalidate_fast(&self, host: &str, port: u16) {
        let Some(mut entry) = self.entries.get_mut(&(host.to_string(), port)) else {
            return;
        };
        let capped = entry.resolved_at + entry.ttl_min;
        if capped < entry.expire_at {
            entry.expire_at = capped;
            EntryShortened { host, port }.log();
        }
    }

    pub fn remove(&self, host: &str, port: u16) {
        self.entries.remove(&(host.to_string(), port));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
