// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Declarative graph building.
//!
//! [`append`] joins two elements sequentially and [`group`] joins them
//! concurrently. Either side may be a single task, a series or a parallel
//! group. Neither function schedules anything.
//!
//! | left     | right    | `append`                         | `group`                        |
//! |----------|----------|----------------------------------|--------------------------------|
//! | task     | task     | new series `[a, b]`              | new group `[[a], [b]]`         |
//! | task     | series   | `b` with `a` pushed in front     | new group `[[a], b]`           |
//! | task     | parallel | new series `[a, b]`              | `b` plus branch `[a]`          |
//! | series   | task     | `a` with `b` pushed behind       | new group `[a, [b]]`           |
//! | series   | series   | `a` followed by a group `[b]`    | new group `[a, b]`             |
//! | series   | parallel | `a` with `b` pushed behind       | `b` plus branch `a`            |
//! | parallel | task     | new series `[a, b]`              | `a` plus branch `[b]`          |
//! | parallel | series   | `b` with `a` pushed in front     | `a` plus branch `b`            |
//! | parallel | parallel | new series `[a, b]`              | `a` plus branch `[b]`          |
//!
//! # Example
//! ```rust
//! use workloom::engine::compose::{append, group, Work};
//! use workloom::engine::{ParallelWork, SeriesWork};
//! use workloom::tasks::EmptyTask;
//!
//! let fan_out = group(Work::task(EmptyTask::new()), Work::task(EmptyTask::new())).unwrap();
//! let series: SeriesWork = append(Work::task(EmptyTask::new()), fan_out).unwrap();
//! assert_eq!(series.pending(), 2);
//! ```

use super::parallel::ParallelWork;
use super::series::SeriesWork;
use super::task::SubTask;
use crate::errors::EngineError;

/// One side of a composition.
pub enum Work {
    Task(Box<dyn SubTask>),
    Series(SeriesWork),
    Parallel(ParallelWork),
}

impl Work {
    pub fn task<T: SubTask>(task: T) -> Self {
        Work::Task(Box::new(task))
    }

    /// Wrap this element in a series of its own, unless it already is one.
    pub fn into_series(self) -> SeriesWork {
        match self {
            Work::Task(task) => {
                let series = SeriesWork::empty();
                series.push_back_boxed(task);
                series
            }
            Work::Series(series) => series,
            Work::Parallel(parallel) => SeriesWork::new(parallel),
        }
    }
}

impl From<SeriesWork> for Work {
    fn from(series: SeriesWork) -> Self {
        Work::Series(series)
    }
}

impl From<ParallelWork> for Work {
    fn from(parallel: ParallelWork) -> Self {
        Work::Parallel(parallel)
    }
}

impl From<Box<dyn SubTask>> for Work {
    fn from(task: Box<dyn SubTask>) -> Self {
        Work::Task(task)
    }
}

/// Join `first` and `second` so that `second` runs after `first`.
pub fn append(first: impl Into<Work>, second: impl Into<Work>) -> Result<SeriesWork, EngineError> {
    match (first.into(), second.into()) {
        (Work::Series(series), Work::Task(task)) => {
            series.push_back_boxed(task);
            Ok(series)
        }
        (Work::Series(series), Work::Parallel(parallel)) => {
            series.push_back(parallel);
            Ok(series)
        }
        (Work::Task(task), Work::Series(series)) => {
            series.push_front_boxed(task);
            Ok(series)
        }
        (Work::Parallel(parallel), Work::Series(series)) => {
            series.push_front(parallel);
            Ok(series)
        }
        (Work::Series(series), Work::Series(next)) => {
            let wrapper = ParallelWork::from_series([next])?;
            series.push_back(wrapper);
            Ok(series)
        }
        (first, Work::Task(task)) => {
            let series = first.into_series();
            series.push_back_boxed(task);
            Ok(series)
        }
        (first, Work::Parallel(parallel)) => {
            let series = first.into_series();
            series.push_back(parallel);
            Ok(series)
        }
    }
}

/// Join `first` and `second` so that they run concurrently.
pub fn group(first: impl Into<Work>, second: impl Into<Work>) -> Result<ParallelWork, EngineError> {
    match (first.into(), second.into()) {
        (Work::Parallel(mut parallel), other) | (other, Work::Parallel(mut parallel)) => {
            parallel.add_series(other.into_series())?;
            Ok(parallel)
        }
        (first, second) => ParallelWork::from_series([first.into_series(), second.into_series()]),
    }
}
