// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use super::{hand_off, TaskInfo, TaskMeta};
use crate::engine::{Callback, Finish, SeriesWork, SubTask};
use crate::errors::TaskState;
use crate::executor::ExecQueue;
use crate::runtime::RuntimeHandle;

/// Runs a closure on a named compute queue.
pub struct GoTask {
    meta: TaskMeta,
    runtime: RuntimeHandle,
    queue: Arc<ExecQueue>,
    work: Option<Box<dyn FnOnce() + Send + 'static>>,
    callback: Option<Callback<GoTask>>,
}

impl GoTask {
    pub(crate) fn new<F>(runtime: RuntimeHandle, queue: Arc<ExecQueue>, work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            meta: TaskMeta::default(),
            runtime,
            queue,
            work: Some(Box::new(work)),
            callback: None,
        }
    }

    pub fn queue_name(&self) -> &str {
        self.queue.name()
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut GoTask) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }
}

impl TaskInfo for GoTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }
}

impl Finish for GoTask {
    const KIND: &'static str = "go";

    fn take_callback(&mut self) -> Option<Callback<Self>> {
        self.callback.take()
    }
}

impl SubTask for GoTask {
    fn dispatch(mut self: Box<Self>, series: SeriesWork) {
        self.meta.bind(&series);
        let runtime = self.runtime.clone();
        let queue = Arc::clone(&self.queue);
        hand_off(
            self,
            series,
            |job| runtime.compute().submit_to(&queue, job),
            |task: &mut GoTask| {
                if let Some(work) = task.work.take() {
                    work();
                }
                task.meta.complete(TaskState::Success, 0);
            },
        );
    }
}
