// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod runtime;
mod task;

pub use config::{ConfigError, ValidationError};
pub use runtime::{EngineError, RuntimeError, UpstreamError};
pub use task::{TaskErrorCode, TaskState, TimeoutReason, ECONNRESET, ETIMEDOUT};

pub(crate) use task::errno_of;
