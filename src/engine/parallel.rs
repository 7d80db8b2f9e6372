// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::series::SeriesWork;
use super::task::{finish, Callback, Finish, SubTask};
use crate::errors::EngineError;
use crate::observability::messages::engine::ParallelCompleted;
use crate::observability::messages::StructuredLog;

/// Fan-out/fan-in group of series.
///
/// Every branch runs concurrently with the others. The group finishes once all
/// branches have finished, whatever their outcome: the branch that finishes
/// last, on whichever thread, runs the group's callback exactly once.
pub struct ParallelWork {
    branches: Vec<SeriesWork>,
    callback: Option<Callback<ParallelWork>>,
    series: Option<SeriesWork>,
    started: bool,
}

impl ParallelWork {
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
            callback: None,
            series: None,
            started: false,
        }
    }

    pub fn from_series<I>(branches: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = SeriesWork>,
    {
        let mut parallel = Self::new();
        for branch in branches {
            parallel.add_series(branch)?;
        }
        Ok(parallel)
    }

    /// Add a branch. Only legal before the group starts, and only for a series
    /// that has not started and is not a branch elsewhere.
    pub fn add_series(&mut self, series: SeriesWork) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::ParallelAlreadyStarted);
        }
        series.claim_for_group()?;
        self.branches.push(series);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn branch(&self, index: usize) -> Option<&SeriesWork> {
        self.branches.get(index)
    }

    pub fn branches(&self) -> &[SeriesWork] {
        &self.branches
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut ParallelWork) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// The series this group runs in, once dispatched.
    pub fn series(&self) -> Option<&SeriesWork> {
        self.series.as_ref()
    }
}

impl Default for ParallelWork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ParallelWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelWork")
            .field("branches", &self.branches.len())
            .field("started", &self.started)
            .finish()
    }
}

impl Finish for ParallelWork {
    const KIND: &'static str = "parallel";

    fn take_callback(&mut self) -> Option<Callback<Self>> {
        self.callback.take()
    }
}

impl SubTask for ParallelWork {
    fn dispatch(mut self: Box<Self>, series: SeriesWork) {
        self.started = true;
        self.series = Some(series.clone());

        let branches = self.branches.clone();
        if branches.is_empty() {
            finish(self, series);
            return;
        }

        let shared = Arc::new(ParallelShared {
            remaining: AtomicUsize::new(branches.len()),
            work: Mutex::new(Some((self, series))),
        });
        for branch in &branches {
            branch.attach_parent(Arc::clone(&shared));
        }
        for branch in branches {
            branch.begin();
        }
    }
}

/// Countdown shared by the branches of a running group.
pub(crate) struct ParallelShared {
    remaining: AtomicUsize,
    work: Mutex<Option<(Box<ParallelWork>, SeriesWork)>>,
}

impl ParallelShared {
    pub(crate) fn branch_done(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let work = self.work.lock().take();
        if let Some((parallel, series)) = work {
            ParallelCompleted {
                branches: parallel.len(),
            }
            .log();
            finish(parallel, series);
        }
    }
}
