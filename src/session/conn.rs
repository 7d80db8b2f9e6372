// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use mio::Interest;
use parking_lot::Mutex;
use std::io;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use super::scheduler::CommScheduler;
use super::transport::{ConnectProgress, Transport};
use super::{CommTarget, Exchange, Outcome, SessionTimeouts};
use crate::errors::{TaskErrorCode, TimeoutReason, ECONNRESET};
use crate::mux::{Action, EventHandler, HandleId, Ready};
use crate::observability::messages::session::{ConnectFailed, SessionEvicted, SessionTimedOut};
use crate::observability::messages::StructuredLog;
use crate::timer::deadline_after;
use crate::traits::DecodeStatus;

const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SessionState {
    Connecting,
    Sending,
    Receiving,
    Idle,
    Closed,
}

/// Mutable state of one connection, shared between the pool and the poller
/// shard that owns the socket.
pub(super) struct SessionCore {
    pub(super) state: SessionState,
    exchange: Option<Box<dyn Exchange>>,
    pub(super) timeouts: SessionTimeouts,
    out: Vec<u8>,
    written: usize,
    response_deadline: Option<Instant>,
    // Claimed from the pool; the write interest is still on its way to the shard.
    awaiting_arm: bool,
}

impl SessionCore {
    /// Hand an idle (or new) session a request to send.
    pub(super) fn claim(
        &mut self,
        exchange: Box<dyn Exchange>,
        out: Vec<u8>,
        timeouts: SessionTimeouts,
        awaiting_arm: bool,
    ) {
        self.state = SessionState::Sending;
        self.exchange = Some(exchange);
        self.timeouts = timeouts;
        self.out = out;
        self.written = 0;
        self.response_deadline = None;
        self.awaiting_arm = awaiting_arm;
    }

    pub(super) fn take_exchange(&mut self) -> Option<Box<dyn Exchange>> {
        self.exchange.take()
    }

    fn receive_deadline(&self) -> Option<Duration> {
        let remaining = self
            .response_deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        match (self.timeouts.receive, remaining) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// One pooled connection.
pub(super) struct CommSession {
    pub(super) handle: HandleId,
    pub(super) target: CommTarget,
    pub(super) core: Mutex<SessionCore>,
}

impl CommSession {
    pub(super) fn new(
        handle: HandleId,
        target: CommTarget,
        connected: bool,
        exchange: Box<dyn Exchange>,
        out: Vec<u8>,
        timeouts: SessionTimeouts,
    ) -> Self {
        let mut core = SessionCore {
            state: SessionState::Connecting,
            exchange: None,
            timeouts,
            out: Vec::new(),
            written: 0,
            response_deadline: None,
            awaiting_arm: false,
        };
        core.claim(exchange, out, timeouts, false);
        if !connected {
            core.state = SessionState::Connecting;
        }
        Self {
            handle,
            target,
            core: Mutex::new(core),
        }
    }

    pub(super) fn is_idle(&self) -> bool {
        self.core.lock().state == SessionState::Idle
    }
}

/// What the handler does once the session lock is released.
enum Step {
    Continue(Action),
    Complete {
        exchange: Option<Box<dyn Exchange>>,
        reuse: bool,
    },
    Close {
        exchange: Option<Box<dyn Exchange>>,
        outcome: Outcome,
        cause: &'static str,
    },
}

/// Event handler owning the socket of a [`CommSession`].
pub(super) struct SessionHandler {
    pub(super) transport: Transport,
    pub(super) session: Arc<CommSession>,
    pub(super) scheduler: Weak<CommScheduler>,
}

impl SessionHandler {
    fn step(&mut self, core: &mut SessionCore, ready: Ready) -> Step {
        match ready {
            Ready::RegisterFailed(error) => self.close(core, Outcome::io(&error), "register failed"),
            Ready::Timeout => self.on_timeout(core),
            Ready::Io { .. } => match core.state {
                SessionState::Connecting => match self.transport.connect_progress() {
                    ConnectProgress::Pending => Step::Continue(Action::Keep),
                    ConnectProgress::Failed(error) => {
                        ConnectFailed {
                            address: self.session.target.addr,
                            error: &error,
                        }
                        .log();
                        self.close(core, Outcome::io(&error), "connect failed")
                    }
                    ConnectProgress::Connected => {
                        core.state = SessionState::Sending;
                        self.write(core)
                    }
                },
                SessionState::Sending => {
                    core.awaiting_arm = false;
                    self.write(core)
                }
                SessionState::Receiving => self.read(core),
                SessionState::Idle => self.check_idle(core),
                SessionState::Closed => Step::Continue(Action::Remove),
            },
        }
    }

    fn on_timeout(&mut self, core: &mut SessionCore) -> Step {
        let reason = match core.state {
            SessionState::Idle => {
                core.state = SessionState::Closed;
                return Step::Close {
                    exchange: None,
                    outcome: Outcome::success(),
                    cause: "keep-alive expired",
                };
            }
            // A keep-alive deadline that fired before the new interest arrived.
            _ if core.awaiting_arm => return Step::Continue(Action::Keep),
            SessionState::Connecting => TimeoutReason::Connect,
            SessionState::Sending | SessionState::Receiving => TimeoutReason::Transmit,
            SessionState::Closed => return Step::Continue(Action::Remove),
        };
        SessionTimedOut {
            address: self.session.target.addr,
            reason,
        }
        .log();
        self.close(core, Outcome::timeout(reason), "timed out")
    }

    fn write(&mut self, core: &mut SessionCore) -> Step {
        while core.written < core.out.len() {
            match self.transport.write(&core.out[core.written..]) {
                Ok(0) => {
                    let error = io::Error::from(io::ErrorKind::WriteZero);
                    return self.close(core, Outcome::io(&error), "write failed");
                }
                Ok(n) => core.written += n,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return Step::Continue(Action::Modify {
                        interest: Interest::WRITABLE,
                        timeout: core.timeouts.send,
                    });
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return self.close(core, Outcome::io(&error), "write failed"),
            }
        }

        core.out.clear();
        core.written = 0;
        core.state = SessionState::Receiving;
        core.response_deadline = core.timeouts.response.and_then(deadline_after);
        self.read(core)
    }

    fn read(&mut self, core: &mut SessionCore) -> Step {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.transport.read(&mut buf) {
                Ok(0) if self.transport.eof_on_empty_read() => {
                    return self.close(core, Outcome::transport(ECONNRESET), "closed by peer");
                }
                Ok(n) => {
                    let Some(exchange) = core.exchange.as_mut() else {
                        return self.close(core, Outcome::success(), "unexpected data");
                    };
                    match exchange.append(&buf[..n]) {
                        Ok(DecodeStatus::Incomplete) => {}
                        Ok(DecodeStatus::Complete) => {
                            let reuse = core.timeouts.keep_alive.is_some();
                            core.state = if reuse {
                                SessionState::Idle
                            } else {
                                SessionState::Closed
                            };
                            return Step::Complete {
                                exchange: core.exchange.take(),
                                reuse,
                            };
                        }
                        Err(error) => return self.close(core, Outcome::io(&error), "bad response"),
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return Step::Continue(Action::Modify {
                        interest: Interest::READABLE,
                        timeout: core.receive_deadline(),
                    });
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return self.close(core, Outcome::io(&error), "read failed"),
            }
        }
    }

    /// Readiness on an idle connection: the peer closed it or sent something
    /// nobody asked for. Either way it is no longer reusable.
    fn check_idle(&mut self, core: &mut SessionCore) -> Step {
        let mut buf = [0u8; 64];
        match self.transport.read(&mut buf) {
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Step::Continue(Action::Keep),
            Ok(0) => self.close(core, Outcome::success(), "closed by peer"),
            _ => self.close(core, Outcome::success(), "unexpected data"),
        }
    }

    fn close(&mut self, core: &mut SessionCore, outcome: Outcome, cause: &'static str) -> Step {
        core.state = SessionState::Closed;
        Step::Close {
            exchange: core.exchange.take(),
            outcome,
            cause,
        }
    }
}

impl EventHandler for SessionHandler {
    fn source(&mut self) -> &mut dyn mio::event::Source {
        self.transport.source()
    }

    fn on_ready(&mut self, ready: Ready) -> Action {
        let session = Arc::clone(&self.session);
        let step = {
            let mut core = session.core.lock();
            self.step(&mut core, ready)
        };
        let peer = session.target.addr;
        let scheduler = self.scheduler.upgrade();

        match step {
            Step::Continue(action) => action,
            Step::Complete { exchange, reuse } => {
                // Park before notifying so the callback can reuse this session.
                let action = match (&scheduler, reuse) {
                    (Some(scheduler), true) => scheduler.park(&session),
                    (Some(scheduler), false) => {
                        scheduler.release_slot(session.target);
                        Action::Remove
                    }
                    (None, _) => Action::Remove,
                };
                if let Some(exchange) = exchange {
                    exchange.finish(peer, Outcome::success());
                }
                action
            }
            Step::Close {
                exchange,
                outcome,
                cause,
            } => {
                SessionEvicted {
                    address: peer,
                    cause,
                }
                .log();
                if let Some(scheduler) = &scheduler {
                    scheduler.release_slot(session.target);
                }
                if let Some(exchange) = exchange {
                    exchange.finish(peer, outcome);
                }
                Action::Remove
            }
        }
    }

    fn on_removed(&mut self) {
        let exchange = {
            let mut core = self.session.core.lock();
            core.state = SessionState::Closed;
            core.take_exchange()
        };
        if let Some(exchange) = exchange {
            exchange.finish(
                self.session.target.addr,
                Outcome::task_error(TaskErrorCode::RuntimeShutDown),
            );
        }
    }
}
