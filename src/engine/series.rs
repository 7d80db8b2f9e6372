// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use super::parallel::ParallelShared;
use super::task::SubTask;
use super::trampoline;
use crate::errors::EngineError;
use crate::executor::panic_message;
use crate::observability::messages::engine::{CallbackPanicked, SeriesCanceled};
use crate::observability::messages::StructuredLog;

/// Whole-series callback, run once after the last task.
pub type SeriesCallback = Box<dyn FnOnce(&SeriesWork) + Send + 'static>;

/// How a series ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesOutcome {
    /// `true` when [`SeriesWork::cancel`] cut the series short.
    pub canceled: bool,
}

enum CompletionSlot {
    Waiting(Vec<oneshot::Sender<SeriesOutcome>>),
    Done(SeriesOutcome),
}

struct SeriesInner {
    queue: Mutex<VecDeque<Box<dyn SubTask>>>,
    context: Mutex<Option<Box<dyn Any + Send>>>,
    callback: Mutex<Option<SeriesCallback>>,
    completion: Mutex<CompletionSlot>,
    started: AtomicBool,
    canceled: AtomicBool,
    grouped: AtomicBool,
    parent: OnceLock<Arc<ParallelShared>>,
}

/// A strictly sequential chain of tasks.
///
/// `SeriesWork` is a cheap handle; clones refer to the same series. Tasks
/// pushed into it are owned by the series until they are dispatched, and at
/// most one of them runs at any time: the next task is dispatched only after
/// the previous one's callback has returned. Tasks may be pushed at either end
/// at any point, including from the callback of the task currently running.
///
/// Tasks pushed from inside the series callback are dismissed.
#[derive(Clone)]
pub struct SeriesWork {
    inner: Arc<SeriesInner>,
}

impl SeriesWork {
    /// A series holding `first`.
    pub fn new<T: SubTask>(first: T) -> Self {
        let series = Self::empty();
        series.push_back(first);
        series
    }

    /// A series without tasks. Starting it finishes it immediately.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(SeriesInner {
                queue: Mutex::new(VecDeque::new()),
                context: Mutex::new(None),
                callback: Mutex::new(None),
                completion: Mutex::new(CompletionSlot::Waiting(Vec::new())),
                started: AtomicBool::new(false),
                canceled: AtomicBool::new(false),
                grouped: AtomicBool::new(false),
                parent: OnceLock::new(),
            }),
        }
    }

    pub fn push_back<T: SubTask>(&self, task: T) {
        self.push_back_boxed(Box::new(task));
    }

    pub fn push_front<T: SubTask>(&self, task: T) {
        self.push_front_boxed(Box::new(task));
    }

    pub fn push_back_boxed(&self, task: Box<dyn SubTask>) {
        self.inner.queue.lock().push_back(task);
    }

    pub fn push_front_boxed(&self, task: Box<dyn SubTask>) {
        self.inner.queue.lock().push_front(task);
    }

    /// Tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnOnce(&SeriesWork) + Send + 'static,
    {
        *self.inner.callback.lock() = Some(Box::new(callback));
    }

    pub fn set_context<T: Any + Send>(&self, context: T) {
        *self.inner.context.lock() = Some(Box::new(context));
    }

    /// Run `f` on the context if one of type `T` is set.
    ///
    /// The context is moved out of the series while `f` runs, so `f` may call
    /// [`SeriesWork::set_context`] itself; a context set that way replaces the
    /// one `f` was given. If `f` panics the context is lost.
    pub fn with_context<T: Any + Send, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut context = self.take_context::<T>()?;
        let result = f(&mut context);
        let mut slot = self.inner.context.lock();
        if slot.is_none() {
            *slot = Some(Box::new(context));
        }
        Some(result)
    }

    /// Remove and return the context if it has type `T`.
    pub fn take_context<T: Any + Send>(&self) -> Option<T> {
        let mut context = self.inner.context.lock();
        if !context.as_ref()?.is::<T>() {
            return None;
        }
        context.take()?.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    /// Whether the series is a branch of a parallel group.
    pub fn is_grouped(&self) -> bool {
        self.inner.grouped.load(Ordering::Acquire)
    }

    /// Dispatch the first task.
    ///
    /// Branches of a parallel group are started by the group and cannot be
    /// started directly.
    pub fn start(&self) -> Result<(), EngineError> {
        if self.is_grouped() {
            return Err(EngineError::SeriesOwnedByParallel);
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(EngineError::SeriesAlreadyStarted);
        }
        self.advance();
        Ok(())
    }

    /// Stop the series after the task that is running now. Tasks that have
    /// not started are dismissed; the series callback still runs.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
    }

    /// Handle that resolves when the series finishes.
    ///
    /// Every handle is notified, however many are created. If the series is
    /// dropped without finishing, its handles resolve to `None`.
    pub fn completion(&self) -> Completion {
        let (tx, rx) = oneshot::channel();
        match &mut *self.inner.completion.lock() {
            CompletionSlot::Done(outcome) => {
                let _ = tx.send(*outcome);
            }
            CompletionSlot::Waiting(waiters) => waiters.push(tx),
        }
        Completion { rx }
    }

    /// Called by the running task once its callback has returned.
    pub fn task_done(&self) {
        if self.is_canceled() {
            let dismissed: Vec<_> = self.inner.queue.lock().drain(..).collect();
            if !dismissed.is_empty() {
                SeriesCanceled {
                    dismissed: dismissed.len(),
                }
                .log();
            }
            drop(dismissed);
            self.finish();
            return;
        }
        self.advance();
    }

    pub(crate) fn begin(&self) {
        self.inner.started.store(true, Ordering::Release);
        self.advance();
    }

    /// Mark the series as a branch. Fails if it already is one or has started.
    pub(crate) fn claim_for_group(&self) -> Result<(), EngineError> {
        if self.is_started() {
            return Err(EngineError::SeriesAlreadyStarted);
        }
        if self.inner.grouped.swap(true, Ordering::AcqRel) {
            return Err(EngineError::SeriesAlreadyGrouped);
        }
        Ok(())
    }

    pub(crate) fn attach_parent(&self, parent: Arc<ParallelShared>) {
        let _ = self.inner.parent.set(parent);
    }

    fn advance(&self) {
        let next = self.inner.queue.lock().pop_front();
        match next {
            Some(task) => trampoline::dispatch(task, self.clone()),
            None => self.finish(),
        }
    }

    fn finish(&self) {
        let callback = self.inner.callback.lock().take();
        if let Some(callback) = callback {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(self))) {
                let message = panic_message(payload.as_ref());
                CallbackPanicked {
                    kind: "series",
                    message: &message,
                }
                .log();
            }
        }
        self.inner.queue.lock().clear();

        let outcome = SeriesOutcome {
            canceled: self.is_canceled(),
        };
        let previous = std::mem::replace(
            &mut *self.inner.completion.lock(),
            CompletionSlot::Done(outcome),
        );
        if let CompletionSlot::Waiting(waiters) = previous {
            for tx in waiters {
                let _ = tx.send(outcome);
            }
        }

        if let Some(parent) = self.inner.parent.get() {
            parent.branch_done();
        }
    }
}

impl std::fmt::Debug for SeriesWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesWork")
            .field("pending", &self.pending())
            .field("started", &self.is_started())
            .field("canceled", &self.is_canceled())
            .field("grouped", &self.is_grouped())
            .finish()
    }
}

/// Resolves when a series finishes. Await it from async code or call
/// [`Completion::wait`] from a plain thread.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<SeriesOutcome>,
}

impl Completion {
    /// Block the current thread until the series finishes.
    ///
    /// Must not be called from inside an async runtime; `.await` the handle
    /// there instead.
    pub fn wait(self) -> Option<SeriesOutcome> {
        self.rx.blocking_recv().ok()
    }
}

impl Future for Completion {
    type Output = Option<SeriesOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}
