// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Client connection scheduling.
//!
//! A [`CommScheduler`] turns "send this request to that address" into a
//! non-blocking conversation driven by the multiplexer:
//!
//! 1. an idle pooled session for the same [`CommTarget`] is reused if one is
//!    available; otherwise a new connection is opened, unless the target
//!    already has `max_connections` live sessions, in which case the request
//!    waits for one to free up;
//! 2. once writable, the request's encoded bytes are written;
//! 3. every chunk read is handed to the response decoder until it reports a
//!    complete message;
//! 4. the outcome is handed back to the owner of the exchange, and a healthy
//!    connection returns to the pool for its keep-alive window.
//!
//! Timeouts are armed per phase and every expiry is tagged with a
//! [`TimeoutReason`]: waiting for a slot (`Wait`), connecting (`Connect`), or
//! sending and receiving (`Transmit`, covering both the per-operation limit
//! and the whole-response limit). An expired keep-alive window or a transport
//! error evicts the session from the pool.
//!
//! The scheduler never retries: every exchange ends in exactly one call to
//! [`Exchange::finish`].

mod conn;
mod scheduler;
mod transport;

#[cfg(test)]
mod integration_tests;

pub use scheduler::CommScheduler;

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::EndpointSettings;
use crate::errors::{TaskErrorCode, TaskState, TimeoutReason, ETIMEDOUT};
use crate::traits::DecodeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportType {
    #[default]
    Tcp,
    Udp,
}

/// Destination identity. Sessions are pooled per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommTarget {
    pub addr: SocketAddr,
    pub transport: TransportType,
}

impl CommTarget {
    pub fn tcp(addr: SocketAddr) -> Self {
        Self {
            addr,
            transport: TransportType::Tcp,
        }
    }

    pub fn udp(addr: SocketAddr) -> Self {
        Self {
            addr,
            transport: TransportType::Udp,
        }
    }
}

/// Limits applied to one exchange. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub connect: Option<Duration>,
    /// Limit for each individual write.
    pub send: Option<Duration>,
    /// Limit for each individual read.
    pub receive: Option<Duration>,
    /// Limit for the whole response, from the end of sending.
    pub response: Option<Duration>,
    /// Idle window for reuse; `None` closes the connection after one exchange.
    pub keep_alive: Option<Duration>,
    /// Time a request may wait for a free connection slot.
    pub wait: Option<Duration>,
}

impl SessionTimeouts {
    pub fn from_endpoint(endpoint: &EndpointSettings) -> Self {
        let connect = millis(endpoint.connect_timeout_ms);
        Self {
            connect,
            send: millis(endpoint.send_timeout_ms),
            receive: millis(endpoint.receive_timeout_ms),
            response: millis(endpoint.response_timeout_ms),
            keep_alive: millis(endpoint.keep_alive_timeout_ms).filter(|d| !d.is_zero()),
            wait: endpoint.wait_timeout_ms.map_or(connect, millis),
        }
    }
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self::from_endpoint(&EndpointSettings::default())
    }
}

/// Negative milliseconds mean "no limit".
fn millis(ms: i64) -> Option<Duration> {
    u64::try_from(ms).ok().map(Duration::from_millis)
}

/// Final result of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub state: TaskState,
    pub error: i32,
    pub timeout_reason: TimeoutReason,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            state: TaskState::Success,
            error: 0,
            timeout_reason: TimeoutReason::NotTimeout,
        }
    }

    /// Transport failure. Negative details are secure-transport failures.
    pub fn transport(error: i32) -> Self {
        let (state, error) = TaskState::from_transport_error(error);
        Self {
            state,
            error,
            timeout_reason: TimeoutReason::NotTimeout,
        }
    }

    pub fn io(error: &io::Error) -> Self {
        Self::transport(crate::errors::errno_of(error))
    }

    pub fn timeout(reason: TimeoutReason) -> Self {
        Self {
            state: TaskState::SysError,
            error: ETIMEDOUT,
            timeout_reason: reason,
        }
    }

    pub fn task_error(code: TaskErrorCode) -> Self {
        Self {
            state: TaskState::TaskError,
            error: code.code(),
            timeout_reason: TimeoutReason::NotTimeout,
        }
    }
}

/// One request/response conversation as the scheduler sees it.
pub trait Exchange: Send + 'static {
    /// Serialize the request.
    fn encode(&mut self, buf: &mut Vec<u8>) -> io::Result<()>;

    /// Feed response bytes.
    fn append(&mut self, data: &[u8]) -> io::Result<DecodeStatus>;

    /// Deliver the outcome. Called exactly once.
    fn finish(self: Box<Self>, peer: SocketAddr, outcome: Outcome);
}
