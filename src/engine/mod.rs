// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Task graph engine.
//!
//! A graph is built from three kinds of node:
//!
//! - a [`SubTask`]: one unit of work with exactly one completion,
//! - a [`SeriesWork`]: tasks that run one after another,
//! - a [`ParallelWork`]: a task whose branches are series that run concurrently.
//!
//! Ownership follows the graph. A task pushed into a series belongs to the
//! series until it is dispatched; dispatch hands the task its own box, and the
//! task releases itself after its callback has run and the series has been told
//! to move on. Nothing in the engine blocks: a task either completes inside
//! `dispatch` or arranges for a pool thread to complete it later.
//!
//! The engine never retries. Every task completes through its callback exactly
//! once, success or failure, and one failing branch of a parallel group does
//! not affect its siblings.
//!
//! # Example
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use workloom::engine::SeriesWork;
//! use workloom::tasks::EmptyTask;
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//! let series = SeriesWork::empty();
//! for _ in 0..3 {
//!     let counter = Arc::clone(&counter);
//!     series.push_back(EmptyTask::with_callback(move |_| {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }));
//! }
//! let done = series.completion();
//! series.start().unwrap();
//! done.wait().unwrap();
//! assert_eq!(counter.load(Ordering::SeqCst), 3);
//! ```

pub mod compose;
mod parallel;
mod series;
mod task;
mod trampoline;

#[cfg(test)]
mod integration_tests;

pub use compose::{append, group, Work};
pub use parallel::ParallelWork;
pub use series::{Completion, SeriesCallback, SeriesOutcome, SeriesWork};
pub use task::{Callback, SubTask, SubTaskExt};

pub(crate) use task::{finish, Finish};
