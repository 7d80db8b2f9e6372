// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use mio::Interest;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::conn::{CommSession, SessionHandler, SessionState};
use super::transport::Transport;
use super::{CommTarget, Exchange, Outcome, SessionTimeouts};
use crate::errors::{TaskErrorCode, TimeoutReason};
use crate::mux::{Action, Multiplexer};
use crate::observability::messages::session::{ConnectFailed, SessionReused};
use crate::observability::messages::StructuredLog;
use crate::timer::TimerService;

/// A request queued until its target has a free connection slot.
struct Waiter {
    id: u64,
    exchange: Box<dyn Exchange>,
    out: Vec<u8>,
    timeouts: SessionTimeouts,
}

#[derive(Default)]
struct TargetPool {
    live: usize,
    idle: Vec<Arc<CommSession>>,
    waiters: VecDeque<Waiter>,
}

impl TargetPool {
    fn is_unused(&self) -> bool {
        self.live == 0 && self.idle.is_empty() && self.waiters.is_empty()
    }
}

/// Connection pool and request scheduler, shared by every network task of a
/// runtime.
///
/// Lock order is pool first, then a session's own lock.
pub struct CommScheduler {
    mux: Arc<Multiplexer>,
    timer: Arc<TimerService>,
    max_connections: usize,
    pool: Mutex<HashMap<CommTarget, TargetPool>>,
    next_waiter: AtomicU64,
    closed: AtomicBool,
    this: Weak<CommScheduler>,
}

impl CommScheduler {
    pub fn new(mux: Arc<Multiplexer>, timer: Arc<TimerService>, max_connections: usize) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            mux,
            timer,
            max_connections: max_connections.max(1),
            pool: Mutex::new(HashMap::new()),
            next_waiter: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Run one exchange against `target`. The outcome arrives through
    /// [`Exchange::finish`], possibly before this call returns.
    pub fn request(&self, target: CommTarget, timeouts: SessionTimeouts, mut exchange: Box<dyn Exchange>) {
        if self.closed.load(Ordering::Acquire) {
            exchange.finish(target.addr, Outcome::task_error(TaskErrorCode::RuntimeShutDown));
            return;
        }

        let mut out = Vec::new();
        if let Err(error) = exchange.encode(&mut out) {
            exchange.finish(target.addr, Outcome::io(&error));
            return;
        }

        let mut pool = self.pool.lock();
        let entry = pool.entry(target).or_default();

        while let Some(session) = entry.idle.pop() {
            let mut core = session.core.lock();
            if core.state != SessionState::Idle {
                continue;
            }
            core.claim(exchange, out, timeouts, true);
            drop(core);
            drop(pool);

            SessionReused { address: target.addr }.log();
            if self
                .mux
                .modify(session.handle, Interest::WRITABLE, timeouts.send)
                .is_err()
            {
                let exchange = session.core.lock().take_exchange();
                if let Some(exchange) = exchange {
                    exchange.finish(target.addr, Outcome::task_error(TaskErrorCode::RuntimeShutDown));
                }
            }
            return;
        }

        if entry.live < self.max_connections {
            entry.live += 1;
            drop(pool);
            self.connect(target, exchange, out, timeouts);
            return;
        }

        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        if let Some(wait) = timeouts.wait {
            let this = self.this.clone();
            let armed = self.timer.schedule_after(
                wait,
                Box::new(move || {
                    if let Some(scheduler) = this.upgrade() {
                        scheduler.expire_waiter(target, id);
                    }
                }),
            );
            if armed.is_err() {
                drop(pool);
                exchange.finish(target.addr, Outcome::task_error(TaskErrorCode::RuntimeShutDown));
                return;
            }
        }
        entry.waiters.push_back(Waiter {
            id,
            exchange,
            out,
            timeouts,
        });
    }

    /// Idle sessions currently pooled for `target`.
    pub fn idle_sessions(&self, target: CommTarget) -> usize {
        self.pool
            .lock()
            .get(&target)
            .map_or(0, |entry| entry.idle.iter().filter(|s| s.is_idle()).count())
    }

    /// Open connections to `target`, busy or idle.
    pub fn live_sessions(&self, target: CommTarget) -> usize {
        self.pool.lock().get(&target).map_or(0, |entry| entry.live)
    }

    /// Reject new requests and fail every queued one. Sessions still on the
    /// multiplexer are finished when it shuts down.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<(CommTarget, Waiter)> = {
            let mut pool = self.pool.lock();
            pool.iter_mut()
                .flat_map(|(target, entry)| {
                    entry.idle.clear();
                    entry.waiters.drain(..).map(|w| (*target, w)).collect::<Vec<_>>()
                })
                .collect()
        };
        for (target, waiter) in drained {
            waiter
                .exchange
                .finish(target.addr, Outcome::task_error(TaskErrorCode::RuntimeShutDown));
        }
    }

    /// Open a new connection for a slot already counted in `live`.
    fn connect(&self, target: CommTarget, exchange: Box<dyn Exchange>, out: Vec<u8>, timeouts: SessionTimeouts) {
        let transport = match Transport::open(target) {
            Ok(transport) => transport,
            Err(error) => {
                ConnectFailed {
                    address: target.addr,
                    error: &error,
                }
                .log();
                self.release_slot(target);
                exchange.finish(target.addr, Outcome::io(&error));
                return;
            }
        };

        let connected = transport.is_connected();
        let timeout = if connected {
            timeouts.send
        } else {
            timeouts.connect
        };
        let handle = self.mux.allocate();
        let session = Arc::new(CommSession::new(handle, target, connected, exchange, out, timeouts));
        let handler = SessionHandler {
            transport,
            session: Arc::clone(&session),
            scheduler: self.this.clone(),
        };

        if self
            .mux
            .register(handle, Box::new(handler), Interest::WRITABLE, timeout)
            .is_err()
        {
            let exchange = session.core.lock().take_exchange();
            self.release_slot(target);
            if let Some(exchange) = exchange {
                exchange.finish(target.addr, Outcome::task_error(TaskErrorCode::RuntimeShutDown));
            }
        }
    }

    /// A session to `target` is gone. The freed slot goes to the oldest waiter.
    pub(super) fn release_slot(&self, target: CommTarget) {
        let next = {
            let mut pool = self.pool.lock();
            let Some(entry) = pool.get_mut(&target) else {
                return;
            };
            entry.live = entry.live.saturating_sub(1);
            entry.idle.retain(|session| session.is_idle());
            let next = entry.waiters.pop_front();
            if next.is_some() {
                entry.live += 1;
            }
            if entry.is_unused() {
                pool.remove(&target);
            }
            next
        };
        if let Some(waiter) = next {
            self.connect(target, waiter.exchange, waiter.out, waiter.timeouts);
        }
    }

    /// Return a session that just finished an exchange. It is handed straight
    /// to a waiter if there is one, otherwise it idles for its keep-alive window.
    pub(super) fn park(&self, session: &Arc<CommSession>) -> Action {
        let mut pool = self.pool.lock();
        let entry = pool.entry(session.target).or_default();
        let mut core = session.core.lock();

        if let Some(waiter) = entry.waiters.pop_front() {
            core.claim(waiter.exchange, waiter.out, waiter.timeouts, false);
            SessionReused {
                address: session.target.addr,
            }
            .log();
            return Action::Modify {
                interest: Interest::WRITABLE,
                timeout: waiter.timeouts.send,
            };
        }

        if self.closed.load(Ordering::Acquire) {
            core.state = SessionState::Closed;
            drop(core);
            entry.live = entry.live.saturating_sub(1);
            if entry.is_unused() {
                pool.remove(&session.target);
            }
            return Action::Remove;
        }

        let keep_alive = core.timeouts.keep_alive;
        drop(core);
        entry.idle.push(Arc::clone(session));
        Action::Modify {
            interest: Interest::READABLE,
            timeout: keep_alive,
        }
    }

    fn expire_waiter(&self, target: CommTarget, id: u64) {
        let waiter = {
            let mut pool = self.pool.lock();
            let Some(entry) = pool.get_mut(&target) else {
                return;
            };
            let Some(position) = entry.waiters.iter().position(|w| w.id == id) else {
                return;
            };
            let waiter = entry.waiters.remove(position);
            if entry.is_unused() {
                pool.remove(&target);
            }
            waiter
        };
        if let Some(waiter) = waiter {
            waiter
                .exchange
                .finish(target.addr, Outcome::timeout(TimeoutReason::Wait));
        }
    }
}
