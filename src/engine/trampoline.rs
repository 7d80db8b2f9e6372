// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use super::series::SeriesWork;
use super::task::SubTask;
use crate::executor::panic_message;
use crate::observability::messages::engine::CallbackPanicked;
use crate::observability::messages::StructuredLog;

type Pending = VecDeque<(Box<dyn SubTask>, SeriesWork)>;

thread_local! {
    static PENDING: RefCell<Option<Pending>> = const { RefCell::new(None) };
}

/// Hand `task` its series and let it run.
///
/// A task that completes inside its own `dispatch` asks its series for the
/// next task, which would dispatch again one frame deeper. Nested dispatches on
/// the same thread are queued instead and run by the outermost call, so a long
/// chain of synchronous tasks uses constant stack.
pub(crate) fn dispatch(task: Box<dyn SubTask>, series: SeriesWork) {
    let nested = PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        match pending.as_mut() {
            Some(queue) => {
                queue.push_back((task, series));
                None
            }
            None => {
                *pending = Some(VecDeque::new());
                Some((task, series))
            }
        }
    });

    let Some((mut task, mut series)) = nested else {
        return;
    };
    loop {
        // The queue above must be drained even if a task panics.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.dispatch(series))) {
            let message = panic_message(payload.as_ref());
            CallbackPanicked {
                kind: "dispatch",
                message: &message,
            }
            .log();
        }
        let next = PENDING.with(|pending| {
            let mut pending = pending.borrow_mut();
            let next = pending.as_mut().and_then(VecDeque::pop_front);
            if next.is_none() {
                *pending = None;
            }
            next
        });
        match next {
            Some((t, s)) => {
                task = t;
                series = s;
            }
            None => break,
        }
    }
}
