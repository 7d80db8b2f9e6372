// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use super::{DnsCache, DnsTtl};
use crate::errors::RuntimeError;
use crate::executor::{Executor, Job};
use crate::observability::messages::dns::{HostResolved, ResolutionFailed};
use crate::observability::messages::StructuredLog;
use crate::traits::Resolver;

/// Outcome delivered to every caller waiting on one lookup.
pub type Resolution = Result<Arc<[SocketAddr]>, Arc<io::Error>>;

type Waiter = Box<dyn FnOnce(Resolution) + Send + 'static>;

const DNS_QUEUE: &str = "dns";

/// Cache front end that runs misses on the DNS pool.
///
/// Concurrent misses for the same `host:port` share a single resolver call.
pub struct DnsService {
    cache: Arc<DnsCache>,
    resolver: Arc<dyn Resolver>,
    executor: Arc<Executor>,
    in_flight: Mutex<HashMap<(String, u16), Vec<Waiter>>>,
}

impl DnsService {
    pub fn new(cache: Arc<DnsCache>, resolver: Arc<dyn Resolver>, executor: Arc<Executor>) -> Self {
        Self {
            cache,
            resolver,
            executor,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<DnsCache> {
        &self.cache
    }

    /// Deliver the addresses of `host:port` to `done`.
    ///
    /// A cache hit calls `done` before returning; a miss calls it later from a
    /// DNS pool thread.
    pub fn resolve<F>(self: &Arc<Self>, host: &str, port: u16, ttl: DnsTtl, done: F)
    where
        F: FnOnce(Resolution) + Send + 'static,
    {
        if let Some(addresses) = self.cache.get(host, port) {
            done(Ok(addresses));
            return;
        }

        let key = (host.to_string(), port);
        {
            let mut in_flight = self.in_flight.lock();
            if let Some(waiters) = in_flight.get_mut(&key) {
                waiters.push(Box::new(done));
                return;
            }
            in_flight.insert(key.clone(), vec![Box::new(done) as Waiter]);
        }

        let service = Arc::clone(self);
        let lookup_key = key.clone();
        let submitted = self.executor.submit(DNS_QUEUE, move || {
            let (host, port) = lookup_key;
            let outcome = service.lookup(&host, port, ttl);
            service.finish(&(host, port), outcome);
        });
        if let Err(error) = submitted {
            let outcome = Err(Arc::new(io::Error::new(io::ErrorKind::Other, error.to_string())));
            self.finish(&key, outcome);
        }
    }

    /// Resolve `host:port` on the calling thread. The cache is neither read
    /// nor filled.
    pub fn resolve_uncached(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let resolved = self.resolver.resolve(host, port);
        if let Err(error) = &resolved {
            ResolutionFailed { host, port, error }.log();
        }
        resolved
    }

    /// Queue `job` on the DNS pool.
    pub(crate) fn submit(&self, job: Job) -> Result<(), RuntimeError> {
        self.executor.submit_to(&self.executor.queue(DNS_QUEUE), job)
    }

    fn lookup(&self, host: &str, port: u16, ttl: DnsTtl) -> Resolution {
        match self.resolver.resolve(host, port) {
            Ok(addresses) => {
                let addresses: Arc<[SocketAddr]> = addresses.into();
                HostResolved {
                    host,
                    port,
                    addresses: addresses.len(),
                    ttl: ttl.default,
                }
                .log();
                self.cache.insert(host, port, Arc::clone(&addresses), ttl);
                Ok(addresses)
            }
            Err(error) => {
                ResolutionFailed {
                    host,
                    port,
                    error: &error,
                }
                .log();
                Err(Arc::new(error))
            }
        }
    }

    fn finish(&self, key: &(String, u16), outcome: Resolution) {
        let waiters = self.in_flight.lock().remove(key).unwrap_or_default();
        for waiter in waiters {
            waiter(outcome.clone());
        }
    }
}
