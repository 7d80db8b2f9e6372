// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for task graph events.
//!
//! This module contains message types for logging events related to:
//! * Series cancellation
//! * Parallel group fan-in
//! * Task routines running on a pool
//! * User callbacks and routines that panic

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A canceled series dropped its not-yet-started tasks.
///
/// # Log Level
/// `debug!` - Diagnostic detail
///
/// # Example
/// ```
/// use workloom::observability::messages::engine::SeriesCanceled;
///
/// let msg = SeriesCanceled { dismissed: 3 };
/// tracing::debug!("{}", msg);
/// ```
pub struct SeriesCanceled {
    pub dismissed: usize,
}

impl Display for SeriesCanceled {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Series canceled, dismissed {} pending tasks", self.dismissed)
    }
}

impl StructuredLog for SeriesCanceled {
    fn log(&self) {
        tracing::debug!(dismissed = self.dismissed, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("series_canceled", span_name = name, dismissed = self.dismissed)
    }
}

/// Every branch of a parallel group has finished.
///
/// # Log Level
/// `trace!` - Per-group chatter
pub struct ParallelCompleted {
    pub branches: usize,
}

impl Display for ParallelCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Parallel group completed: {} branches", self.branches)
    }
}

impl StructuredLog for ParallelCompleted {
    fn log(&self) {
        tracing::trace!(branches = self.branches, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!("parallel_completed", span_name = name, branches = self.branches)
    }
}

/// A task or series callback panicked. The series still advances.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct CallbackPanicked<'a> {
    pub kind: &'a str,
    pub message: &'a str,
}

impl Display for CallbackPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Callback of {} panicked: {}", self.kind, self.message)
    }
}

impl StructuredLog for CallbackPanicked<'_> {
    fn log(&self) {
        tracing::error!(kind = self.kind, panic = self.message, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("callback_panicked", span_name = name, kind = self.kind)
    }
}

/// A task's routine starts on a pool thread.
///
/// # Log Level
/// `trace!` - Per-task chatter
pub struct RoutineStarted<'a> {
    pub kind: &'a str,
}

impl Display for RoutineStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Running {} task routine", self.kind)
    }
}

impl StructuredLog for RoutineStarted<'_> {
    fn log(&self) {
        tracing::trace!(kind = self.kind, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("task_routine", span_name = name, kind = self.kind)
    }
}

/// A task's work closure or routine panicked. The task finishes with a task error.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct RoutinePanicked<'a> {
    pub kind: &'a str,
    pub message: &'a str,
}

impl Display for RoutinePanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Routine of {} task panicked: {}", self.kind, self.message)
    }
}

impl StructuredLog for RoutinePanicked<'_> {
    fn log(&self) {
        tracing::error!(kind = self.kind, panic = self.message, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("routine_panicked", span_name = name, kind = self.kind)
    }
}
