// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::panic::{self, AssertUnwindSafe};

use super::series::SeriesWork;
use crate::executor::panic_message;
use crate::observability::messages::engine::CallbackPanicked;
use crate::observability::messages::StructuredLog;

/// User callback invoked once with the finished task.
pub type Callback<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

/// The atomic unit of a task graph.
///
/// `dispatch` receives ownership of the task together with the series it runs
/// in. The task must finish exactly once, either before `dispatch` returns or
/// later from a pool thread, by running its callback and then calling
/// [`SeriesWork::task_done`]. Tasks built in this crate do both through
/// [`finish`].
pub trait SubTask: Send + 'static {
    fn dispatch(self: Box<Self>, series: SeriesWork);
}

/// Start and dismiss for a task that is not part of any series yet.
pub trait SubTaskExt: SubTask + Sized {
    /// Run the task in a series of its own. The returned series can be used to
    /// await completion.
    fn start(self) -> SeriesWork {
        let series = SeriesWork::new(self);
        series.begin();
        series
    }

    /// Release the task without running it. Its callback is never invoked.
    fn dismiss(self) {
        drop(self);
    }
}

impl<T: SubTask> SubTaskExt for T {}

/// Callback plumbing shared by every task kind.
pub(crate) trait Finish: Send + Sized + 'static {
    const KIND: &'static str;

    fn take_callback(&mut self) -> Option<Callback<Self>>;
}

/// Run the task's callback, release the task, then advance its series.
pub(crate) fn finish<T: Finish>(mut task: Box<T>, series: SeriesWork) {
    if let Some(callback) = task.take_callback() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&mut task)));
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            CallbackPanicked {
                kind: T::KIND,
                message: &message,
            }
            .log();
        }
    }
    drop(task);
    series.task_done();
}
