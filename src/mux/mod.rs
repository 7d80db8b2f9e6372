// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sharded readiness multiplexer.
//!
//! The multiplexer runs `N` shards, each a thread that owns one `mio::Poll`.
//! Every I/O handle is pinned to exactly one shard by a stable hash of its
//! [`HandleId`], and all of its state (the [`EventHandler`], interest and
//! deadline) lives on that shard's thread. `register`, `modify` and `unregister`
//! may be called from any thread: they are forwarded to the owning shard as
//! commands and applied there, so readiness events for one handle are always
//! serialized on one thread.
//!
//! When a handle becomes ready, or its deadline passes, the shard invokes the
//! handler synchronously; the handler answers with an [`Action`] to keep,
//! re-arm or drop the registration.

mod shard;

use mio::Interest;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::errors::RuntimeError;
use shard::{Command, ShardHandle};

/// Identity of a registered I/O handle. Allocated by [`Multiplexer::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happened to a handle.
#[derive(Debug)]
pub enum Ready {
    /// Readiness reported by the poller.
    Io {
        readable: bool,
        writable: bool,
        error: bool,
        read_closed: bool,
        write_closed: bool,
    },
    /// The deadline armed with the current interest passed.
    Timeout,
    /// The shard could not register the source. The handler is dropped afterwards.
    RegisterFailed(std::io::Error),
}

/// How the shard should treat a handle after its handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Leave interest as is. A deadline that just fired is not re-armed.
    Keep,
    /// Re-register with a new interest and restart the deadline.
    Modify {
        interest: Interest,
        timeout: Option<Duration>,
    },
    /// Deregister the source and drop the handler.
    Remove,
}

/// Per-handle callback object. Owns the I/O source.
pub trait EventHandler: Send + 'static {
    fn source(&mut self) -> &mut dyn mio::event::Source;

    fn on_ready(&mut self, ready: Ready) -> Action;

    /// Called once when the handle leaves the shard through [`Multiplexer::unregister`]
    /// or shutdown rather than through an [`Action::Remove`].
    fn on_removed(&mut self) {}
}

pub struct Multiplexer {
    shards: Vec<ShardHandle>,
    next_id: AtomicU64,
}

impl Multiplexer {
    pub fn new(shard_count: usize) -> Result<Self, RuntimeError> {
        let shard_count = shard_count.max(1);
        let mut shards = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            shards.push(ShardHandle::spawn(index)?);
        }
        Ok(Self {
            shards,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Reserve a fresh handle identity.
    pub fn allocate(&self) -> HandleId {
        HandleId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// The shard every operation on `handle` is routed to.
    pub fn shard_of(&self, handle: HandleId) -> usize {
        (stable_hash(handle.0) % self.shards.len() as u64) as usize
    }

    pub fn register(
        &self,
        handle: HandleId,
        handler: Box<dyn EventHandler>,
        interest: Interest,
        timeout: Option<Duration>,
    ) -> Result<(), RuntimeError> {
        self.send(
            handle,
            Command::Register {
                handle,
                handler,
                interest,
                timeout,
            },
        )
    }

    pub fn modify(
        &self,
        handle: HandleId,
        interest: Interest,
        timeout: Option<Duration>,
    ) -> Result<(), RuntimeError> {
        self.send(
            handle,
            Command::Modify {
                handle,
                interest,
                timeout,
            },
        )
    }

    pub fn unregister(&self, handle: HandleId) -> Result<(), RuntimeError> {
        self.send(handle, Command::Unregister { handle })
    }

    /// Stop every shard. Live handlers get `on_removed` and are dropped.
    pub fn shutdown(&self) {
        for shard in &self.shards {
            shard.shutdown();
        }
    }

    fn send(&self, handle: HandleId, command: Command) -> Result<(), RuntimeError> {
        self.shards[self.shard_of(handle)].send(command)
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// splitmix64 finalizer: sequential ids spread evenly across shards and the
// mapping never changes for the lifetime of the process.
fn stable_hash(value: u64) -> u64 {
    let mut z = value.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
