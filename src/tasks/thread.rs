// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use super::{hand_off, TaskInfo, TaskMeta};
use crate::engine::{Callback, Finish, SeriesWork, SubTask};
use crate::errors::TaskState;
use crate::executor::ExecQueue;
use crate::runtime::RuntimeHandle;

type Routine<I, O> = Box<dyn FnOnce(&I, &mut O) + Send + 'static>;

/// Computation with a typed input and output.
///
/// The routine runs on a compute queue and writes its result into the output,
/// which the callback then reads (or takes) from the task.
pub struct ThreadTask<I, O> {
    meta: TaskMeta,
    runtime: RuntimeHandle,
    queue: Arc<ExecQueue>,
    input: I,
    output: O,
    routine: Option<Routine<I, O>>,
    callback: Option<Callback<ThreadTask<I, O>>>,
}

impl<I, O> ThreadTask<I, O>
where
    I: Send + 'static,
    O: Default + Send + 'static,
{
    pub(crate) fn new<F>(runtime: RuntimeHandle, queue: Arc<ExecQueue>, input: I, routine: F) -> Self
    where
        F: FnOnce(&I, &mut O) + Send + 'static,
    {
        Self {
            meta: TaskMeta::default(),
            runtime,
            queue,
            input,
            output: O::default(),
            routine: Some(Box::new(routine)),
            callback: None,
        }
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn take_output(&mut self) -> O {
        std::mem::take(&mut self.output)
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut ThreadTask<I, O>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }
}

impl<I, O> TaskInfo for ThreadTask<I, O> {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }
}

impl<I, O> Finish for ThreadTask<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    const KIND: &'static str = "thread";

    fn take_callback(&mut self) -> Option<Callback<Self>> {
        self.callback.take()
    }
}

impl<I, O> SubTask for ThreadTask<I, O>
where
    I: Send + 'static,
    O: Default + Send + 'static,
{
    fn dispatch(mut self: Box<Self>, series: SeriesWork) {
        self.meta.bind(&series);
        let runtime = self.runtime.clone();
        let queue = Arc::clone(&self.queue);
        hand_off(
            self,
            series,
            |job| runtime.compute().submit_to(&queue, job),
            |task: &mut ThreadTask<I, O>| {
                if let Some(routine) = task.routine.take() {
                    routine(&task.input, &mut task.output);
                }
                task.meta.complete(TaskState::Success, 0);
            },
        );
    }
}
