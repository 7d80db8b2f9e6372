// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use super::{hand_off, relay, TaskInfo, TaskMeta};
use crate::engine::{Callback, Finish, SeriesWork, SubTask};
use crate::errors::TaskState;
use crate::runtime::RuntimeHandle;

const TIMER_QUEUE: &str = "timer";

/// Completes once its delay has elapsed.
///
/// The timer thread only routes the expired task to the handler pool, where
/// the callback runs.
pub struct TimerTask {
    meta: TaskMeta,
    runtime: RuntimeHandle,
    delay: Duration,
    callback: Option<Callback<TimerTask>>,
}

impl TimerTask {
    pub(crate) fn new(runtime: RuntimeHandle, delay: Duration) -> Self {
        Self {
            meta: TaskMeta::default(),
            runtime,
            delay,
            callback: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut TimerTask) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    fn expire(task: Box<TimerTask>, series: SeriesWork) {
        let runtime = task.runtime.clone();
        let handler = runtime.handler();
        let queue = handler.queue(TIMER_QUEUE);
        hand_off(
            task,
            series,
            |job| handler.submit_to(&queue, job),
            |task: &mut TimerTask| task.meta.complete(TaskState::Success, 0),
        );
    }
}

impl TaskInfo for TimerTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }
}

impl Finish for TimerTask {
    const KIND: &'static str = "timer";

    fn take_callback(&mut self) -> Option<Callback<Self>> {
        self.callback.take()
    }
}

impl SubTask for TimerTask {
    fn dispatch(mut self: Box<Self>, series: SeriesWork) {
        self.meta.bind(&series);
        let runtime = self.runtime.clone();
        let delay = self.delay;
        relay(
            self,
            series,
            |job| runtime.timer().schedule_after(delay, job),
            TimerTask::expire,
        );
    }
}
