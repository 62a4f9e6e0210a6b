//! Tracing integration for observability.
//!
//! The line always logs through the `log` facade. With the `tracing`
//! feature enabled, worker threads additionally enter a `task_execution`
//! span and the coordinator emits the counter and gauge events in
//! [`metrics`](self::metrics).
//!
//! # Example
//!
//! ```rust,ignore
//! use assembly_line::prelude::*;
//! use assembly_line::trace::TracedTask;
//!
//! let line: Line<&'static str> = Line::new()?;
//! line.new_group("io", 4)?;
//! line.start(&CancellationToken::new())?;
//!
//! let span = tracing::info_span!("request", id = 42);
//! let _entered = span.enter();
//! // The task runs inside `request` on its worker thread.
//! line.push(TracedTask::new(my_task))?;
//! ```

use crate::core::{CancellationToken, Category, FollowUps, Result, Task};

/// A task wrapper that carries the submitter's tracing span to the worker.
///
/// Without the `tracing` feature it is a transparent wrapper.
pub struct TracedTask<T> {
    inner: T,
    #[cfg(feature = "tracing")]
    span: tracing::Span,
}

impl<T> TracedTask<T> {
    /// Wrap `task`, capturing the current span
    pub fn new(task: T) -> Self {
        Self {
            inner: task,
            #[cfg(feature = "tracing")]
            span: tracing::Span::current(),
        }
    }

    /// Wrap `task` with an explicit span
    #[cfg(feature = "tracing")]
    pub fn with_span(task: T, span: tracing::Span) -> Self {
        Self { inner: task, span }
    }

    /// The wrapped task
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<K: Category, T: Task<K>> Task<K> for TracedTask<T> {
    fn category(&self) -> K {
        self.inner.category()
    }

    fn execute(&mut self, token: &CancellationToken) -> Result<FollowUps<K>> {
        #[cfg(feature = "tracing")]
        let _guard = self.span.enter();
        self.inner.execute(token)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Metrics recording functions for observability.
///
/// These emit tracing events in the `counter.*` / `gauge.*` / `histogram.*`
/// field convention understood by tracing-to-metrics bridges.
#[cfg(feature = "tracing")]
pub mod metrics {
    use std::time::Duration;

    /// Records a task leaving its queue for a worker.
    #[inline]
    pub fn record_dispatch(category: &str, queue_depth: usize) {
        tracing::trace!(
            counter.tasks_dispatched = 1,
            gauge.queue_depth = queue_depth as i64,
            category = category,
            "task dispatched"
        );
    }

    /// Records task completion with timing.
    #[inline]
    pub fn record_completion(duration: Duration, success: bool) {
        let duration_ms = duration.as_millis() as u64;
        if success {
            tracing::trace!(
                counter.tasks_completed = 1,
                histogram.task_duration_ms = duration_ms,
                "task completed"
            );
        } else {
            tracing::trace!(
                counter.tasks_failed = 1,
                histogram.task_duration_ms = duration_ms,
                "task failed"
            );
        }
    }

    /// Records a task panic.
    #[inline]
    pub fn record_panic(duration: Duration) {
        tracing::trace!(
            counter.tasks_panicked = 1,
            histogram.task_duration_ms = duration.as_millis() as u64,
            "task panicked"
        );
    }

    /// Records the coordinator booting.
    #[inline]
    pub fn record_line_start(line: &str, groups: usize) {
        tracing::info!(line = line, groups = groups, "line started");
    }

    /// Records the coordinator exiting.
    #[inline]
    pub fn record_line_stop(line: &str, tasks_processed: u64, tasks_abandoned: usize) {
        tracing::info!(
            line = line,
            tasks_processed = tasks_processed,
            tasks_abandoned = tasks_abandoned,
            "line terminated"
        );
    }
}
