// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use std::sync::Arc;

use super::TaskInfo;
use crate::engine::{ParallelWork, SeriesWork, SubTask};
use crate::errors::TaskState;
use crate::runtime::RuntimeHandle;

/// What one input of a [`MultiThreadTask`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutcome<O> {
    pub state: TaskState,
    pub error: i32,
    pub output: O,
}

type MultiCallback<O> = Box<dyn FnOnce(&ParallelWork, Vec<BranchOutcome<O>>) + Send + 'static>;
type Slots<O> = Arc<Mutex<Vec<Option<BranchOutcome<O>>>>>;

/// One routine applied to many inputs, each input a [`ThreadTask`](super::ThreadTask)
/// of its own on the same compute queue.
///
/// The branches run as a parallel group. Once the last one finishes, the
/// callback receives every outcome in input order.
pub struct MultiThreadTask<O> {
    parallel: ParallelWork,
    outcomes: Slots<O>,
    callback: Option<MultiCallback<O>>,
}

impl<O> MultiThreadTask<O>
where
    O: Default + Send + 'static,
{
    pub(crate) fn new<I, F>(runtime: &RuntimeHandle, queue: &str, inputs: Vec<I>, routine: F) -> Self
    where
        I: Send + 'static,
        F: Fn(&I, &mut O) + Send + Sync + 'static,
    {
        let routine = Arc::new(routine);
        let outcomes: Slots<O> = Arc::new(Mutex::new((0..inputs.len()).map(|_| None).collect()));
        let mut parallel = ParallelWork::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let routine = Arc::clone(&routine);
            let mut task = runtime.thread_task(queue, input, move |input: &I, output: &mut O| {
                routine(input, output)
            });
            let slots = Arc::clone(&outcomes);
            task.set_callback(move |task| {
                if let Some(slot) = slots.lock().get_mut(index) {
                    *slot = Some(BranchOutcome {
                        state: task.state(),
                        error: task.error(),
                        output: task.take_output(),
                    });
                }
            });
            // A series that was just created can always join a group.
            let _ = parallel.add_series(SeriesWork::new(task));
        }
        Self {
            parallel,
            outcomes,
            callback: None,
        }
    }

    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.parallel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parallel.is_empty()
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(&ParallelWork, Vec<BranchOutcome<O>>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }
}

impl<O> SubTask for MultiThreadTask<O>
where
    O: Send + 'static,
{
    fn dispatch(self: Box<Self>, series: SeriesWork) {
        let MultiThreadTask {
            mut parallel,
            outcomes,
            callback,
        } = *self;
        parallel.set_callback(move |parallel| {
            let outcomes = std::mem::take(&mut *outcomes.lock())
                .into_iter()
                .flatten()
                .collect();
            if let Some(callback) = callback {
                callback(parallel, outcomes);
            }
        });
        Box::new(parallel).dispatch(series);
    }
}
