//! Per-category worker group state owned by the coordinator.
//!
//! Nothing here is shared: the coordinator thread is the only reader and
//! writer, so counts are plain integers and the queue is a plain deque.

use crate::core::category::label;
use crate::core::{BoxedTask, Category, LineError, Result};
use crate::line::report::GroupReport;
use crate::line::worker::TaskOutcome;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Capacity below which the queue is never compacted
const MIN_TRIM_CAPACITY: usize = 64;

/// Staffing and backlog of one group, returned by push, hire and walk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    /// Workers currently hired
    pub workers: usize,
    /// Workers available for new tasks
    pub idle: usize,
    /// Tasks waiting in the queue
    pub queued: usize,
}

impl GroupStatus {
    /// Workers currently running a task for this group
    pub fn busy(&self) -> usize {
        self.workers.saturating_sub(self.idle)
    }
}

/// Counters for one group
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    /// Tasks accepted into the queue (pushes and follow-ups)
    pub submitted: u64,
    /// Tasks pushed while the line was ignoring new work
    pub dropped: u64,
    /// Tasks handed to a worker thread
    pub dispatched: u64,
    /// Tasks that returned `Ok`
    pub completed: u64,
    /// Tasks that returned an error
    pub failed: u64,
    /// Tasks that panicked
    pub panicked: u64,
    /// Tasks lost because no worker thread could be spawned
    pub spawn_failures: u64,
    /// Time spent executing tasks
    pub busy_time: Duration,
    /// Longest single execution observed
    pub max_latency: Duration,
}

impl GroupStats {
    /// Tasks that ran to an outcome (completed + failed + panicked)
    pub fn processed(&self) -> u64 {
        self.completed + self.failed + self.panicked
    }

    /// Success rate as a percentage (100.0 when nothing ran yet)
    pub fn success_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            100.0
        } else {
            (self.completed as f64 / processed as f64) * 100.0
        }
    }

    /// Mean execution time
    pub fn avg_latency(&self) -> Duration {
        match u32::try_from(self.processed()) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.busy_time / n,
            Err(_) => Duration::from_secs_f64(self.busy_time.as_secs_f64() / self.processed() as f64),
        }
    }
}

/// FIFO of pending tasks with periodic storage compaction
pub(crate) struct TaskQueue<K: Category> {
    tasks: VecDeque<BoxedTask<K>>,
    pops_since_trim: usize,
    trim_threshold: usize,
}

impl<K: Category> TaskQueue<K> {
    pub(crate) fn new(trim_threshold: usize) -> Self {
        Self {
            tasks: VecDeque::new(),
            pops_since_trim: 0,
            trim_threshold,
        }
    }

    pub(crate) fn push_back(&mut self, task: BoxedTask<K>) {
        self.tasks.push_back(task);
    }

    pub(crate) fn pop_front(&mut self) -> Option<BoxedTask<K>> {
        let task = self.tasks.pop_front()?;
        self.pops_since_trim += 1;
        if self.trim_threshold > 0 && self.pops_since_trim >= self.trim_threshold {
            self.pops_since_trim = 0;
            self.trim();
        }
        Some(task)
    }

    fn trim(&mut self) {
        let len = self.tasks.len();
        if self.tasks.capacity() > MIN_TRIM_CAPACITY && self.tasks.capacity() > len * 4 {
            self.tasks.shrink_to((len * 2).max(MIN_TRIM_CAPACITY));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.tasks.capacity()
    }

    /// Move the pending tasks out for a walk; must be followed by `restore`
    pub(crate) fn lend(&mut self) -> VecDeque<BoxedTask<K>> {
        std::mem::take(&mut self.tasks)
    }

    pub(crate) fn restore(&mut self, tasks: VecDeque<BoxedTask<K>>) {
        debug_assert!(self.tasks.is_empty(), "queue mutated while lent");
        self.tasks = tasks;
    }

    pub(crate) fn clear(&mut self) -> usize {
        let n = self.tasks.len();
        self.tasks.clear();
        n
    }
}

/// One category's pool: worker counts, pending queue and statistics
pub(crate) struct GroupState<K: Category> {
    index: usize,
    category: K,
    workers: usize,
    idle: usize,
    // Busy workers whose slot disappears when their task completes.
    retiring: usize,
    queue: TaskQueue<K>,
    stats: GroupStats,
}

impl<K: Category> GroupState<K> {
    pub(crate) fn new(index: usize, category: K, trim_threshold: usize) -> Self {
        Self {
            index,
            category,
            workers: 0,
            idle: 0,
            retiring: 0,
            queue: TaskQueue::new(trim_threshold),
            stats: GroupStats::default(),
        }
    }

    pub(crate) fn category(&self) -> &K {
        &self.category
    }

    /// Apply a signed change to the worker count
    ///
    /// Growth raises `workers` and `idle` together. A shrink takes idle slots
    /// first and retires busy workers as they finish; running tasks are never
    /// interrupted. A shrink below zero workers, or growth past `usize::MAX`,
    /// is rejected untouched.
    pub(crate) fn hire(&mut self, delta: isize) -> Result<()> {
        if delta >= 0 {
            let grow = delta.unsigned_abs();
            let (Some(workers), Some(idle)) =
                (self.workers.checked_add(grow), self.idle.checked_add(grow))
            else {
                return Err(LineError::invalid_worker_count(
                    label(&self.category),
                    self.workers,
                    delta,
                ));
            };
            self.workers = workers;
            self.idle = idle;
            return Ok(());
        }

        let cut = delta.unsigned_abs();
        if cut > self.workers {
            return Err(LineError::invalid_worker_count(
                label(&self.category),
                self.workers,
                delta,
            ));
        }

        let from_idle = cut.min(self.idle);
        self.workers -= cut;
        self.idle -= from_idle;
        self.retiring += cut - from_idle;
        Ok(())
    }

    pub(crate) fn enqueue(&mut self, task: BoxedTask<K>) {
        self.stats.submitted += 1;
        self.queue.push_back(task);
    }

    pub(crate) fn record_drop(&mut self) {
        self.stats.dropped += 1;
    }

    /// Claim an idle worker for the oldest pending task
    pub(crate) fn take_next(&mut self) -> Option<BoxedTask<K>> {
        if self.idle == 0 || self.queue.is_empty() {
            return None;
        }
        let task = self.queue.pop_front()?;
        self.idle -= 1;
        self.stats.dispatched += 1;
        Some(task)
    }

    /// Return a worker slot after its task finished (or never started)
    pub(crate) fn release(&mut self) {
        if self.retiring > 0 {
            self.retiring -= 1;
        } else {
            debug_assert!(self.idle < self.workers, "released more slots than hired");
            self.idle = (self.idle + 1).min(self.workers);
        }
    }

    pub(crate) fn record_outcome(&mut self, outcome: &TaskOutcome, elapsed: Duration) {
        match outcome {
            TaskOutcome::Completed => self.stats.completed += 1,
            TaskOutcome::Failed(_) => self.stats.failed += 1,
            TaskOutcome::Panicked(_) => self.stats.panicked += 1,
        }
        self.stats.busy_time += elapsed;
        self.stats.max_latency = self.stats.max_latency.max(elapsed);
    }

    pub(crate) fn record_spawn_failure(&mut self) {
        self.stats.spawn_failures += 1;
    }

    pub(crate) fn queue_mut(&mut self) -> &mut TaskQueue<K> {
        &mut self.queue
    }

    pub(crate) fn status(&self) -> GroupStatus {
        GroupStatus {
            workers: self.workers,
            idle: self.idle,
            queued: self.queue.len(),
        }
    }

    pub(crate) fn snapshot(&self) -> GroupReport<K> {
        GroupReport {
            index: self.index,
            category: self.category.clone(),
            workers: self.workers,
            idle: self.idle,
            retiring: self.retiring,
            queued: self.queue.len(),
            stats: self.stats.clone(),
        }
    }

    /// Drop every pending task, returning how many were discarded
    pub(crate) fn abandon(&mut self) -> usize {
        self.queue.clear()
    }
}
