// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Concrete task kinds.
//!
//! Every kind shares the same completion protocol: the task is dispatched
//! onto the context it needs (a compute queue, the timer thread, the file I/O
//! pool, a poller shard), records its outcome, runs its callback with mutable
//! access to itself and then lets its series continue. Inside the callback,
//! [`TaskInfo::series`] gives access to the running series, so a callback can
//! push follow-up work.
//!
//! Tasks are normally obtained from the factory methods on
//! [`RuntimeHandle`](crate::runtime::RuntimeHandle); [`EmptyTask`] needs no
//! runtime.

mod algo;
mod counter;
mod dns;
mod empty;
mod file;
mod go;
mod multi;
mod network;
mod thread;
mod timer;

pub use counter::{CounterHandle, CounterTask};
pub(crate) use algo::merge_sorted;
pub(crate) use counter::CounterRegistry;
pub use dns::DnsTask;
pub use empty::EmptyTask;
pub use file::{FileIoTask, FileOp};
pub use go::GoTask;
pub use multi::{BranchOutcome, MultiThreadTask};
pub use network::{NetworkTask, Target};
pub use thread::ThreadTask;
pub use timer::TimerTask;

use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::engine::{finish, Finish, SeriesWork};
use crate::errors::{RuntimeError, TaskErrorCode, TaskState};
use crate::executor::{panic_message, Job};
use crate::observability::messages::engine::{RoutinePanicked, RoutineStarted};
use crate::observability::messages::StructuredLog;

/// Bookkeeping common to every task kind.
#[derive(Default)]
pub struct TaskMeta {
    state: TaskState,
    error: i32,
    user_data: Option<Box<dyn Any + Send>>,
    series: Option<SeriesWork>,
}

impl TaskMeta {
    pub(crate) fn complete(&mut self, state: TaskState, error: i32) {
        self.state = state;
        self.error = error;
    }

    pub(crate) fn bind(&mut self, series: &SeriesWork) {
        self.series = Some(series.clone());
    }
}

impl std::fmt::Debug for TaskMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskMeta")
            .field("state", &self.state)
            .field("error", &self.error)
            .field("has_user_data", &self.user_data.is_some())
            .finish()
    }
}

/// Accessors shared by all task kinds.
pub trait TaskInfo {
    fn meta(&self) -> &TaskMeta;

    fn meta_mut(&mut self) -> &mut TaskMeta;

    fn state(&self) -> TaskState {
        self.meta().state
    }

    /// Errno-like detail for transport failures, a
    /// [`TaskErrorCode`](crate::errors::TaskErrorCode) for framework failures.
    fn error(&self) -> i32 {
        self.meta().error
    }

    /// The series the task runs in. `None` before dispatch.
    fn series(&self) -> Option<&SeriesWork> {
        self.meta().series.as_ref()
    }

    fn set_user_data<T: Any + Send>(&mut self, data: T)
    where
        Self: Sized,
    {
        self.meta_mut().user_data = Some(Box::new(data));
    }

    fn user_data<T: Any + Send>(&self) -> Option<&T>
    where
        Self: Sized,
    {
        self.meta().user_data.as_ref()?.downcast_ref::<T>()
    }
}

/// Move a dispatched task onto another thread through `submit`; `run` takes
/// over the task there.
///
/// If `submit` refuses the job the task finishes right away with
/// [`TaskErrorCode::RuntimeShutDown`].
pub(crate) fn relay<T, S, R>(task: Box<T>, series: SeriesWork, submit: S, run: R)
where
    T: Finish + TaskInfo,
    S: FnOnce(Job) -> Result<(), RuntimeError>,
    R: FnOnce(Box<T>, SeriesWork) + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Some((task, series))));
    let job_slot = Arc::clone(&slot);
    let submitted = submit(Box::new(move || {
        let taken = job_slot.lock().take();
        if let Some((task, series)) = taken {
            run(task, series);
        }
    }));
    if submitted.is_err() {
        let taken = slot.lock().take();
        if let Some((mut task, series)) = taken {
            task.meta_mut()
                .complete(TaskState::TaskError, TaskErrorCode::RuntimeShutDown.code());
            finish(task, series);
        }
    }
}

/// [`relay`] for the common case: run `body` on the other thread to record
/// the outcome, then finish the task there.
///
/// A panic in `body` finishes the task with [`TaskErrorCode::RoutinePanicked`].
pub(crate) fn hand_off<T, S, B>(task: Box<T>, series: SeriesWork, submit: S, body: B)
where
    T: Finish + TaskInfo,
    S: FnOnce(Job) -> Result<(), RuntimeError>,
    B: FnOnce(&mut T) + Send + 'static,
{
    relay(task, series, submit, move |mut task, series| {
        let started = RoutineStarted { kind: T::KIND };
        let span = started.span("task_routine");
        let guard = span.enter();
        started.log();

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| body(&mut task))) {
            let message = panic_message(payload.as_ref());
            RoutinePanicked {
                kind: T::KIND,
                message: &message,
            }
            .log();
            task.meta_mut()
                .complete(TaskState::TaskError, TaskErrorCode::RoutinePanicked.code());
        }
        // The callback and the rest of the series run outside the routine's span.
        drop(guard);
        finish(task, series);
    });
}
