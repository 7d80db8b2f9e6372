// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Outcome vocabulary surfaced at the task-graph boundary.
//!
//! A finished task reports a [`TaskState`] plus an `i32` error detail. For
//! transport failures the detail is the OS errno; for framework failures it is
//! one of the [`TaskErrorCode`] values; for timeouts it is [`ETIMEDOUT`] and the
//! task additionally reports a [`TimeoutReason`].

use std::fmt;
use std::io;

/// Errno used for timeout outcomes.
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub const ETIMEDOUT: i32 = 60;
#[cfg(windows)]
pub const ETIMEDOUT: i32 = 10060;
#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly",
    windows
)))]
pub const ETIMEDOUT: i32 = 110;

/// Errno reported when the peer closes a connection mid-exchange.
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub const ECONNRESET: i32 = 54;
#[cfg(windows)]
pub const ECONNRESET: i32 = 10054;
#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly",
    windows
)))]
pub const ECONNRESET: i32 = 104;

/// Completion state of a task.
///
/// `Undefined` is the state of a task that has not run yet. `ToReply` and
/// `NoReply` only ever appear on server-side tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskState {
    #[default]
    Undefined,
    Success,
    ToReply,
    NoReply,
    SysError,
    SslError,
    DnsError,
    TaskError,
}

impl TaskState {
    /// Numeric code of the state, stable across releases.
    pub fn code(self) -> i32 {
        match self {
            TaskState::Undefined => -1,
            TaskState::Success => 0,
            TaskState::ToReply => 3,
            TaskState::NoReply => 4,
            TaskState::SysError => 1,
            TaskState::SslError => 65,
            TaskState::DnsError => 66,
            TaskState::TaskError => 67,
        }
    }

    /// State and detail for a failed transport. Secure-transport layers report
    /// their failures as negative details.
    pub fn from_transport_error(error: i32) -> (TaskState, i32) {
        if error < 0 {
            (TaskState::SslError, error.saturating_neg())
        } else {
            (TaskState::SysError, error)
        }
    }

    pub fn is_success(self) -> bool {
        self == TaskState::Success
    }

    /// Whether a failure in this state is worth retrying (possibly against a
    /// different address). Definition errors are not.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            TaskState::SysError | TaskState::SslError | TaskState::DnsError
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Undefined => "undefined",
            TaskState::Success => "success",
            TaskState::ToReply => "to-reply",
            TaskState::NoReply => "no-reply",
            TaskState::SysError => "system error",
            TaskState::SslError => "secure transport error",
            TaskState::DnsError => "name resolution error",
            TaskState::TaskError => "task error",
        };
        f.write_str(name)
    }
}

/// Phase in which a network task timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeoutReason {
    #[default]
    NotTimeout,
    /// Waited too long for a free connection slot.
    Wait,
    /// Connection establishment (including a secure handshake) took too long.
    Connect,
    /// A send or receive exceeded its limit.
    Transmit,
}

impl fmt::Display for TimeoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeoutReason::NotTimeout => "not a timeout",
            TimeoutReason::Wait => "wait for connection slot",
            TimeoutReason::Connect => "connect",
            TimeoutReason::Transmit => "data transfer",
        };
        f.write_str(name)
    }
}

/// Framework-level error details reported with [`TaskState::TaskError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TaskErrorCode {
    UriParseFailed = 1001,
    UriSchemeInvalid = 1002,
    UriPortInvalid = 1003,
    UpstreamUnavailable = 1004,
    /// The task could not be handed to a pool because the runtime is stopping.
    RuntimeShutDown = 1005,
    /// The task's work closure or routine panicked.
    RoutinePanicked = 1006,
}

impl TaskErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1001 => Some(TaskErrorCode::UriParseFailed),
            1002 => Some(TaskErrorCode::UriSchemeInvalid),
            1003 => Some(TaskErrorCode::UriPortInvalid),
            1004 => Some(TaskErrorCode::UpstreamUnavailable),
            1005 => Some(TaskErrorCode::RuntimeShutDown),
            1006 => Some(TaskErrorCode::RoutinePanicked),
            _ => None,
        }
    }
}

impl fmt::Display for TaskErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TaskErrorCode::UriParseFailed => "target could not be parsed",
            TaskErrorCode::UriSchemeInvalid => "target scheme is not supported",
            TaskErrorCode::UriPortInvalid => "target port is invalid",
            TaskErrorCode::UpstreamUnavailable => "no upstream server is available",
            TaskErrorCode::RuntimeShutDown => "runtime is shut down",
            TaskErrorCode::RoutinePanicked => "task routine panicked",
        };
        f.write_str(msg)
    }
}

/// Errno-like detail for an I/O error. Errors without an OS code map to `EIO`-ish 5,
/// timeouts map to [`ETIMEDOUT`].
pub(crate) fn errno_of(err: &io::Error) -> i32 {
    if let Some(code) = err.raw_os_error() {
        return code;
    }
    match err.kind() {
        io::ErrorKind::TimedOut => ETIMEDOUT,
        _ => 5,
    }
}
