// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::{TaskInfo, TaskMeta};
use crate::engine::{finish, Callback, Finish, SeriesWork, SubTask};
use crate::errors::TaskState;

type Parked = (Box<CounterTask>, SeriesWork);

struct CounterState {
    remaining: u32,
    parked: Option<Parked>,
}

/// Counts a counter down from any thread.
///
/// Counts may arrive before the counter task is started; counts past the
/// target are ignored.
#[derive(Clone)]
pub struct CounterHandle {
    state: Arc<Mutex<CounterState>>,
}

impl CounterHandle {
    fn new(target: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(CounterState {
                remaining: target,
                parked: None,
            })),
        }
    }

    pub fn count(&self) {
        let (ready, _) = self.decrement();
        if let Some((task, series)) = ready {
            CounterTask::complete(task, series);
        }
    }

    /// Counts still needed.
    pub fn remaining(&self) -> u32 {
        self.state.lock().remaining
    }

    /// Returns the task if this count completed a started counter, and whether
    /// the target has been reached.
    fn decrement(&self) -> (Option<Parked>, bool) {
        let mut state = self.state.lock();
        state.remaining = state.remaining.saturating_sub(1);
        if state.remaining > 0 {
            return (None, false);
        }
        (state.parked.take(), true)
    }

    fn ptr_eq(&self, other: &CounterHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Named counters, each name holding a FIFO of counters that share it.
#[derive(Default)]
pub(crate) struct CounterRegistry {
    named: Mutex<HashMap<String, VecDeque<CounterHandle>>>,
}

impl CounterRegistry {
    fn register(&self, name: &str, handle: CounterHandle) {
        self.named
            .lock()
            .entry(name.to_string())
            .or_default()
            .push_back(handle);
    }

    fn remove(&self, name: &str, handle: &CounterHandle) {
        let mut named = self.named.lock();
        if let Some(list) = named.get_mut(name) {
            list.retain(|h| !h.ptr_eq(handle));
            if list.is_empty() {
                named.remove(name);
            }
        }
    }

    /// Deliver up to `n` counts to the counters registered under `name`, oldest
    /// first. A counter leaves the name once it reached its target. Returns the
    /// number of counts delivered.
    pub(crate) fn count_by_name(&self, name: &str, n: usize) -> usize {
        let mut ready = Vec::new();
        let mut delivered = 0;
        {
            let mut named = self.named.lock();
            if let Some(list) = named.get_mut(name) {
                while delivered < n {
                    let Some(front) = list.front() else { break };
                    let (parked, exhausted) = front.decrement();
                    delivered += 1;
                    if exhausted {
                        list.pop_front();
                    }
                    ready.extend(parked);
                }
                if list.is_empty() {
                    named.remove(name);
                }
            }
        }
        // Completion runs user callbacks, which may count again.
        for (task, series) in ready {
            CounterTask::complete(task, series);
        }
        delivered
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, name: &str) -> bool {
        self.named.lock().contains_key(name)
    }
}

/// Completes after it has been started and counted `target` times.
pub struct CounterTask {
    meta: TaskMeta,
    handle: CounterHandle,
    target: u32,
    name: Option<(String, Arc<CounterRegistry>)>,
    callback: Option<Callback<CounterTask>>,
}

impl CounterTask {
    pub fn new(target: u32) -> Self {
        Self {
            meta: TaskMeta::default(),
            handle: CounterHandle::new(target),
            target,
            name: None,
            callback: None,
        }
    }

    pub(crate) fn named(registry: Arc<CounterRegistry>, name: &str, target: u32) -> Self {
        let mut task = Self::new(target);
        registry.register(name, task.handle.clone());
        task.name = Some((name.to_string(), registry));
        task
    }

    pub fn handle(&self) -> CounterHandle {
        self.handle.clone()
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn count(&self) {
        self.handle.count();
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut CounterTask) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    fn complete(mut task: Box<CounterTask>, series: SeriesWork) {
        task.meta.complete(TaskState::Success, 0);
        finish(task, series);
    }
}

impl Drop for CounterTask {
    fn drop(&mut self) {
        if let Some((name, registry)) = &self.name {
            registry.remove(name, &self.handle);
        }
    }
}

impl TaskInfo for CounterTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }
}

impl Finish for CounterTask {
    const KIND: &'static str = "counter";

    fn take_callback(&mut self) -> Option<Callback<Self>> {
        self.callback.take()
    }
}

impl SubTask for CounterTask {
    fn dispatch(mut self: Box<Self>, series: SeriesWork) {
        self.meta.bind(&series);
        let handle = self.handle.clone();
        let mut state = handle.state.lock();
        if state.remaining == 0 {
            drop(state);
            CounterTask::complete(self, series);
        } else {
            state.parked = Some((self, series));
        }
    }
}
