// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{TaskInfo, TaskMeta};
use crate::engine::{finish, Callback, Finish, SeriesWork, SubTask};
use crate::errors::TaskState;

/// A task that succeeds as soon as it is dispatched. Useful as a
/// synchronization point or a place to hang a callback.
#[derive(Default)]
pub struct EmptyTask {
    meta: TaskMeta,
    callback: Option<Callback<EmptyTask>>,
}

impl EmptyTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback<F>(callback: F) -> Self
    where
        F: FnOnce(&mut EmptyTask) + Send + 'static,
    {
        let mut task = Self::new();
        task.set_callback(callback);
        task
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut EmptyTask) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }
}

impl TaskInfo for EmptyTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }
}

impl Finish for EmptyTask {
    const KIND: &'static str = "empty";

    fn take_callback(&mut self) -> Option<Callback<Self>> {
        self.callback.take()
    }
}

impl SubTask for EmptyTask {
    fn dispatch(mut self: Box<Self>, series: SeriesWork) {
        self.meta.bind(&series);
        self.meta.complete(TaskState::Success, 0);
        finish(self, series);
    }
}
