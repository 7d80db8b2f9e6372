// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Timer dispatch thread.
//!
//! A single thread keeps a min-heap of deadlines and runs each expired action on
//! itself. Actions are expected to be short: anything that may block hands the
//! real work to a pool.
//!
//! A delay too large to express as an [`Instant`] means "never": the action is
//! kept until shutdown and then dropped with the other pending actions.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::errors::RuntimeError;
use crate::executor::Job;

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    action: Job,
}

// Reversed so `BinaryHeap` pops the earliest deadline; `seq` keeps equal
// deadlines in scheduling order.
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

struct Schedule {
    deadline: Option<Instant>,
    action: Job,
}

/// `now + delay`, or `None` when that is past what an [`Instant`] can hold.
pub fn deadline_after(delay: Duration) -> Option<Instant> {
    Instant::now().checked_add(delay)
}

pub struct TimerService {
    sender: Mutex<Option<Sender<Schedule>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimerService {
    pub fn new() -> Result<Self, RuntimeError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let name = "workloom-timer".to_string();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || timer_loop(rx))
            .map_err(|source| RuntimeError::Spawn { name, source })?;
        Ok(Self {
            sender: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Run `action` on the timer thread once `delay` has elapsed.
    pub fn schedule<F>(&self, delay: Duration, action: F) -> Result<(), RuntimeError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_after(delay, Box::new(action))
    }

    pub fn schedule_after(&self, delay: Duration, action: Job) -> Result<(), RuntimeError> {
        self.send(Schedule {
            deadline: deadline_after(delay),
            action,
        })
    }

    pub fn schedule_at(&self, deadline: Instant, action: Job) -> Result<(), RuntimeError> {
        self.send(Schedule {
            deadline: Some(deadline),
            action,
        })
    }

    fn send(&self, schedule: Schedule) -> Result<(), RuntimeError> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(RuntimeError::ShutDown);
        };
        sender
            .send(schedule)
            .map_err(|_| RuntimeError::ShutDown)
    }

    /// Stop the timer thread. Pending actions are dropped without running.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn timer_loop(rx: Receiver<Schedule>) {
    let mut heap: BinaryHeap<TimerEntry> = BinaryHeap::new();
    let mut never: Vec<Job> = Vec::new();
    let mut seq: u64 = 0;

    loop {
        let received = match heap.peek() {
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(next) => {
                let wait = next.deadline.saturating_duration_since(Instant::now());
                rx.recv_timeout(wait)
            }
        };

        match received {
            Ok(Schedule {
                deadline: Some(deadline),
                action,
            }) => {
                seq += 1;
                heap.push(TimerEntry {
                    deadline,
                    seq,
                    action,
                });
            }
            Ok(Schedule { deadline: None, action }) => never.push(action),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        while heap.peek().is_some_and(|e| e.deadline <= now) {
            if let Some(entry) = heap.pop() {
                (entry.action)();
            }
        }
    }
}
