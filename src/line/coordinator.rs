//! The coordinator: sole owner of every queue, worker count and lifecycle flag
//!
//! # Turn structure
//!
//! ```text
//! loop {
//!   ├─► cancel signal pending?  ──► terminate (no dispatch)
//!   ├─► receive one message
//!   │     push / hire / walk / report / wait / finish / completion
//!   ├─► apply it, reply if the caller waits
//!   ├─► dispatch: idle workers × queued tasks, per group, FIFO
//!   └─► settle: load == 0 → release waiters; draining → terminate
//! }
//! ```
//!
//! Producers and workers never touch this state; they only hand messages
//! to the inbox, so no lock guards the queues.

use crate::core::category::label;
use crate::core::{CancellationReason, CancellationToken, Category};
use crate::line::config::LineConfig;
use crate::line::group::{GroupState, GroupStatus};
use crate::line::message::{Completion, Message, PushReceipt, QueueLoan};
use crate::line::report::{LineState, Report};
use crate::line::worker::{TaskOutcome, WorkerLauncher};
use chrono::Utc;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use log::{debug, error, info, trace, warn};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// How the coordinator loop ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Termination {
    Drained,
    Cancelled,
}

pub(crate) struct Coordinator<K: Category> {
    line_id: Uuid,
    name: String,
    trim_threshold: usize,
    groups: Vec<GroupState<K>>,
    index: HashMap<K, usize>,
    load: usize,
    accepting: bool,
    drain_requested: bool,
    state: LineState,
    waiters: Vec<Sender<()>>,
    launcher: WorkerLauncher<K>,
    token: CancellationToken,
    inbox: Receiver<Message<K>>,
    cancel: Receiver<()>,
    // Dropped last: its disconnection is the terminal signal.
    _done: Sender<()>,
}

impl<K: Category> Coordinator<K> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        line_id: Uuid,
        config: &LineConfig,
        seed: Vec<(K, usize)>,
        launcher: WorkerLauncher<K>,
        token: CancellationToken,
        inbox: Receiver<Message<K>>,
        cancel: Receiver<()>,
        done: Sender<()>,
    ) -> Self {
        let mut coordinator = Self {
            line_id,
            name: config.name.clone(),
            trim_threshold: config.trim_threshold,
            groups: Vec::new(),
            index: HashMap::new(),
            load: 0,
            accepting: true,
            drain_requested: false,
            state: LineState::Running,
            waiters: Vec::new(),
            launcher,
            token,
            inbox,
            cancel,
            _done: done,
        };

        for (category, workers) in seed {
            let shown = label(&category);
            let group = coordinator.group_mut(category);
            let delta = isize::try_from(workers).unwrap_or(isize::MAX);
            if let Err(e) = group.hire(delta) {
                warn!("line '{}': seed hire for {} rejected: {}", config.name, shown, e);
            }
        }

        coordinator
    }

    /// Run turns until the line terminates
    pub(crate) fn run(mut self) {
        info!(
            "line '{}' ({}) started with {} groups",
            self.name,
            self.line_id,
            self.groups.len()
        );
        #[cfg(feature = "tracing")]
        crate::trace::metrics::record_line_start(&self.name, self.groups.len());

        let termination = loop {
            // Cancel wins over any message that is ready in the same turn.
            if self.cancel.try_recv().is_ok() || self.token.is_cancelled() {
                break Termination::Cancelled;
            }

            // The launcher keeps an inbox sender alive, so a disconnect means teardown.
            let message = select! {
                recv(self.cancel) -> _ => None,
                recv(self.inbox) -> message => message.ok(),
            };
            let Some(message) = message else {
                break Termination::Cancelled;
            };
            self.handle(message);

            self.dispatch();

            if self.settle() {
                break Termination::Drained;
            }
        };

        self.terminate(termination);
    }

    fn handle(&mut self, message: Message<K>) {
        match message {
            Message::Push { tasks, reply } => {
                let receipt = self.push(tasks);
                let _ = reply.send(receipt);
            }
            Message::Hire {
                category,
                delta,
                reply,
            } => {
                let shown = label(&category);
                let group = self.group_mut(category);
                let result = group.hire(delta).map(|()| group.status());
                match &result {
                    Ok(status) => debug!(
                        "line '{}': hired {} in {} -> {} workers, {} idle, {} queued",
                        self.name, delta, shown, status.workers, status.idle, status.queued
                    ),
                    Err(e) => warn!("line '{}': rejected hire: {}", self.name, e),
                }
                let _ = reply.send(result);
            }
            Message::Walk { category, reply } => self.walk(category, reply),
            Message::Report { reply } => {
                let _ = reply.send(self.report());
            }
            Message::Wait { reply } => {
                if self.load == 0 {
                    let _ = reply.send(());
                } else {
                    debug!(
                        "line '{}': wait queued behind {} outstanding tasks",
                        self.name, self.load
                    );
                    self.waiters.push(reply);
                }
            }
            Message::Finish => {
                if !self.drain_requested {
                    debug!(
                        "line '{}': finish requested with {} outstanding tasks",
                        self.name, self.load
                    );
                }
                self.accepting = false;
                self.drain_requested = true;
                self.state = LineState::Draining;
            }
            Message::Completion(completion) => self.complete(completion),
        }
    }

    fn push(&mut self, tasks: Vec<(K, crate::core::BoxedTask<K>)>) -> PushReceipt {
        let accepting = self.accepting;
        let mut accepted = 0;
        let mut status = None;

        for (category, task) in tasks {
            if accepting {
                let group = self.group_mut(category);
                group.enqueue(task);
                accepted += 1;
                status = Some(group.status());
                continue;
            }

            trace!("task '{}' dropped: line is not accepting work", task.name());
            // A dropped task never opens a group of its own.
            status = Some(match self.index.get(&category) {
                Some(&idx) => {
                    let group = &mut self.groups[idx];
                    group.record_drop();
                    group.status()
                }
                None => GroupStatus::default(),
            });
        }

        self.load += accepted;
        PushReceipt { accepted, status }
    }

    fn walk(&mut self, category: K, reply: Sender<QueueLoan<K>>) {
        let Some(&idx) = self.index.get(&category) else {
            let (give_back, _) = bounded(1);
            let _ = reply.send(QueueLoan::new(
                VecDeque::new(),
                GroupStatus::default(),
                give_back,
            ));
            return;
        };

        let group = &mut self.groups[idx];
        let status = group.status();
        let tasks = group.queue_mut().lend();
        let (give_back, returned) = bounded(1);

        // A loan that cannot be delivered is dropped here and hands itself back.
        let _ = reply.send(QueueLoan::new(tasks, status, give_back));

        match returned.recv() {
            Ok(tasks) => self.groups[idx].queue_mut().restore(tasks),
            Err(_) => error!(
                "line '{}': queue of {} was not returned after a walk",
                self.name,
                label(self.groups[idx].category())
            ),
        }
    }

    fn complete(&mut self, completion: Completion<K>) {
        let Completion {
            category,
            name,
            outcome,
            follow_ups,
            elapsed,
        } = completion;

        self.load = self.load.saturating_sub(1);
        {
            let group = self.group_mut(category);
            group.release();
            group.record_outcome(&outcome, elapsed);
        }

        if outcome == TaskOutcome::Completed && !follow_ups.is_empty() {
            trace!(
                "line '{}': task '{}' produced {} follow-ups",
                self.name,
                name,
                follow_ups.len()
            );
        }

        for task in follow_ups {
            let target = task.category();
            self.group_mut(target).enqueue(task);
            self.load += 1;
        }
    }

    /// Launch as many queued tasks as there are idle workers, per group
    fn dispatch(&mut self) {
        for group in self.groups.iter_mut() {
            while let Some(task) = group.take_next() {
                let name = task.name().to_string();
                let category = group.category().clone();

                #[cfg(feature = "tracing")]
                crate::trace::metrics::record_dispatch(&label(&category), group.status().queued);

                trace!("line '{}': dispatching '{}' to {}", self.name, name, label(&category));

                if let Err(e) = self.launcher.launch(category, task) {
                    error!("line '{}': task '{}' lost: {}", self.name, name, e);
                    group.release();
                    group.record_spawn_failure();
                    self.load = self.load.saturating_sub(1);
                    break;
                }
            }
        }
    }

    /// Release waiters on quiescence; returns true when a drain is complete
    fn settle(&mut self) -> bool {
        if self.load > 0 {
            return false;
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
        self.drain_requested
    }

    fn report(&self) -> Report<K> {
        Report {
            line_id: self.line_id,
            taken_at: Utc::now(),
            state: self.state,
            accepting: self.accepting,
            drain_requested: self.drain_requested,
            waiters: self.waiters.len(),
            load: self.load,
            groups: self.groups.iter().map(GroupState::snapshot).collect(),
        }
    }

    fn terminate(&mut self, termination: Termination) {
        self.state = LineState::Terminated;
        self.accepting = false;

        let abandoned: usize = self.groups.iter_mut().map(GroupState::abandon).sum();
        let processed: u64 = self.groups.iter().map(|g| g.snapshot().stats.processed()).sum();

        // Dropping the senders fails the pending waits with `Closed`.
        self.waiters.clear();

        if termination == Termination::Drained {
            self.token
                .cancel_with_reason(CancellationReason::LineTerminated);
        }

        match termination {
            Termination::Drained => info!(
                "line '{}' ({}) finished: {} tasks processed",
                self.name, self.line_id, processed
            ),
            Termination::Cancelled => info!(
                "line '{}' ({}) cancelled: {} tasks processed, {} in flight, {} queued tasks abandoned",
                self.name,
                self.line_id,
                processed,
                self.load.saturating_sub(abandoned),
                abandoned
            ),
        }
        #[cfg(feature = "tracing")]
        crate::trace::metrics::record_line_stop(&self.name, processed, abandoned);
    }

    fn group_mut(&mut self, category: K) -> &mut GroupState<K> {
        let idx = match self.index.get(&category) {
            Some(&idx) => idx,
            None => {
                let idx = self.groups.len();
                trace!("line '{}': new group {} at index {}", self.name, label(&category), idx);
                self.groups
                    .push(GroupState::new(idx, category.clone(), self.trim_threshold));
                self.index.insert(category, idx);
                idx
            }
        };
        &mut self.groups[idx]
    }
}
