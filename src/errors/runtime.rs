// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Caller misuse of the task graph. These are definition errors: the engine
/// never retries them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("series has already been started")]
    SeriesAlreadyStarted,

    #[error("series is a branch of a parallel group and is started by it")]
    SeriesOwnedByParallel,

    #[error("series is already a branch of another parallel group")]
    SeriesAlreadyGrouped,

    #[error("branches can only be added before the parallel group starts")]
    ParallelAlreadyStarted,
}

/// Failures while bringing the runtime up or down.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to create poller for shard {shard}: {source}")]
    Poller {
        shard: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("runtime is shut down")]
    ShutDown,
}

/// Errors from the upstream registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream group '{0}' does not exist")]
    GroupNotFound(String),

    #[error("upstream group '{0}' already exists")]
    GroupExists(String),

    #[error("server '{address}' is not part of upstream group '{group}'")]
    ServerNotFound { group: String, address: String },

    #[error("server '{address}' is already part of upstream group '{group}'")]
    ServerExists { group: String, address: String },

    #[error("'{0}' is not a valid host:port address")]
    InvalidAddress(String),
}
