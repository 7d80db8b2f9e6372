// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;     // settings, validation, runtime builder
pub mod dns;        // resolution cache
pub mod engine;     // series / parallel task graphs
pub mod errors;     // error handling
pub mod executor;   // named-queue thread pools
pub mod mux;        // sharded readiness multiplexer
pub mod observability;
pub mod runtime;    // explicit runtime context + task factory
pub mod session;    // connection pool and scheduler
pub mod tasks;      // concrete task kinds
pub mod timer;      // timer dispatch thread
pub mod traits;     // message and resolver abstractions
pub mod upstream;   // upstream groups and health
