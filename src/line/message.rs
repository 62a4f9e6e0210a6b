//! Requests delivered to the coordinator's inbox

use crate::core::{BoxedTask, Category, FollowUps, Result, Task};
use crate::line::group::GroupStatus;
use crate::line::report::Report;
use crate::line::worker::TaskOutcome;
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::time::Duration;

/// One coordinator turn's worth of work
pub(crate) enum Message<K: Category> {
    /// Enqueue tasks, each with the category it is routed to
    Push {
        tasks: Vec<(K, BoxedTask<K>)>,
        reply: Sender<PushReceipt>,
    },
    /// Resize a group
    Hire {
        category: K,
        delta: isize,
        reply: Sender<Result<GroupStatus>>,
    },
    /// Lend a group's queue to the caller and pause until it comes back
    Walk {
        category: K,
        reply: Sender<QueueLoan<K>>,
    },
    /// Snapshot every group
    Report { reply: Sender<Report<K>> },
    /// Reply once the line is quiescent
    Wait { reply: Sender<()> },
    /// Stop accepting pushes, drain, terminate
    Finish,
    /// A worker finished its task
    Completion(Completion<K>),
}

/// Acknowledgement of a push
#[derive(Clone, Copy, Debug)]
pub(crate) struct PushReceipt {
    /// Tasks that made it into a queue
    pub accepted: usize,
    /// Status of the category of the last pushed task
    pub status: Option<GroupStatus>,
}

/// Sent by a worker thread once its task is done
pub(crate) struct Completion<K: Category> {
    pub category: K,
    pub name: String,
    pub outcome: TaskOutcome,
    pub follow_ups: FollowUps<K>,
    pub elapsed: Duration,
}

/// A group's pending tasks, on loan to a `walk_tasks` caller
///
/// Dropping the loan hands the tasks back, which resumes the coordinator.
/// This also happens when the visitor panics or the caller never picks
/// the loan up.
pub(crate) struct QueueLoan<K: Category> {
    tasks: VecDeque<BoxedTask<K>>,
    status: GroupStatus,
    give_back: Sender<VecDeque<BoxedTask<K>>>,
}

impl<K: Category> QueueLoan<K> {
    pub(crate) fn new(
        tasks: VecDeque<BoxedTask<K>>,
        status: GroupStatus,
        give_back: Sender<VecDeque<BoxedTask<K>>>,
    ) -> Self {
        Self {
            tasks,
            status,
            give_back,
        }
    }

    pub(crate) fn status(&self) -> GroupStatus {
        self.status
    }

    pub(crate) fn visit<F>(&self, mut visitor: F)
    where
        F: FnMut(usize, &dyn Task<K>),
    {
        for (index, task) in self.tasks.iter().enumerate() {
            visitor(index, task.as_ref());
        }
    }
}

impl<K: Category> Drop for QueueLoan<K> {
    fn drop(&mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        // The coordinator waits on this; it only fails once the line is gone.
        let _ = self.give_back.send(tasks);
    }
}
