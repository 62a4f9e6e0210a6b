//! Public handles: [`Line`] and [`Group`]

use crate::core::category::label;
use crate::core::{BoxedTask, CancellationToken, Category, LineError, Result, Task};
use crate::line::config::LineConfig;
use crate::line::coordinator::Coordinator;
use crate::line::group::GroupStatus;
use crate::line::message::Message;
use crate::line::report::Report;
use crate::line::worker::WorkerLauncher;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Upper bound on how long dropping the last handle waits for the coordinator
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles a started line needs on every call
#[derive(Clone)]
struct Running {
    token: CancellationToken,
    done: Receiver<()>,
}

struct Shared<K: Category> {
    id: Uuid,
    config: LineConfig,
    inbox: Sender<Message<K>>,
    mailbox: Mutex<Option<Receiver<Message<K>>>>,
    // Also serializes `start` against `new_group`.
    seed: Mutex<Vec<(K, usize)>>,
    running: RwLock<Option<Running>>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl<K: Category> Shared<K> {
    fn running(&self) -> Result<Running> {
        self.running
            .read()
            .clone()
            .ok_or_else(|| LineError::not_started(self.id))
    }

    /// Send a request and block for its reply
    fn request<T, F>(&self, build: F) -> Result<T>
    where
        F: FnOnce(Sender<T>) -> Message<K>,
    {
        self.running()?;
        let (reply, response) = bounded(1);
        self.inbox
            .send(build(reply))
            .map_err(|_| LineError::closed(self.id))?;
        response.recv().map_err(|_| LineError::closed(self.id))
    }
}

impl<K: Category> Drop for Shared<K> {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }

        let Some(handle) = self.coordinator.get_mut().take() else {
            return;
        };
        // A queued task holding the last handle can be dropped by the coordinator.
        if handle.thread().id() == thread::current().id() {
            return;
        }

        let start = Instant::now();
        while !handle.is_finished() {
            if start.elapsed() >= JOIN_TIMEOUT {
                log::warn!(
                    "line '{}' ({}): coordinator did not stop within {}s, detaching it",
                    self.config.name,
                    self.id,
                    JOIN_TIMEOUT.as_secs()
                );
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if handle.join().is_err() {
            log::error!(
                "line '{}' ({}): coordinator panicked",
                self.config.name,
                self.id
            );
        }
    }
}

/// A production line: worker groups keyed by category, fed by one coordinator
///
/// `Line` is a cheap handle; clones share the same coordinator. Dropping the
/// last handle of a started line cancels it.
///
/// # Example
///
/// ```rust
/// use assembly_line::prelude::*;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// # fn main() -> Result<()> {
/// let line: Line<&'static str> = Line::new()?;
/// line.new_group("print", 2)?;
/// line.start(&CancellationToken::new())?;
///
/// let printed = Arc::new(AtomicUsize::new(0));
/// for _ in 0..4 {
///     let printed = Arc::clone(&printed);
///     line.push(EffectTask::new("print", move |_: &CancellationToken| {
///         printed.fetch_add(1, Ordering::SeqCst);
///     }))?;
/// }
///
/// line.finish()?;
/// assert_eq!(printed.load(Ordering::SeqCst), 4);
/// # Ok(())
/// # }
/// ```
pub struct Line<K: Category> {
    shared: Arc<Shared<K>>,
}

impl<K: Category> Clone for Line<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: Category> std::fmt::Debug for Line<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Line")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("started", &self.is_started())
            .finish()
    }
}

impl<K: Category> Line<K> {
    /// Create a line with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(LineConfig::default())
    }

    /// Create a line with the given configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn with_config(config: LineConfig) -> Result<Self> {
        config.validate()?;

        let (inbox, mailbox) = bounded(0);
        Ok(Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                config,
                inbox,
                mailbox: Mutex::new(Some(mailbox)),
                seed: Mutex::new(Vec::new()),
                running: RwLock::new(None),
                coordinator: Mutex::new(None),
            }),
        })
    }

    /// Start the coordinator
    ///
    /// The line derives a child of `ctx`; every task receives that child, and
    /// cancelling `ctx` cancels the line.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` on a second call and `SpawnError` if the
    /// coordinator thread cannot be created. A line whose start failed stays
    /// unusable.
    pub fn start(&self, ctx: &CancellationToken) -> Result<()> {
        let shared = &self.shared;
        let mut seed = shared.seed.lock();

        let inbox = shared
            .mailbox
            .lock()
            .take()
            .ok_or_else(|| LineError::already_started(shared.id))?;

        let token = ctx.child();
        let (cancel_tx, cancel_rx) = bounded(1);
        token.on_cancel_always(move || {
            let _ = cancel_tx.try_send(());
        });
        let (done_tx, done_rx) = bounded(0);

        let launcher = WorkerLauncher::new(
            shared.config.name.clone(),
            shared.config.worker_stack_size,
            shared.config.catch_panics,
            token.clone(),
            shared.inbox.clone(),
        );
        let coordinator = Coordinator::new(
            shared.id,
            &shared.config,
            std::mem::take(&mut *seed),
            launcher,
            token.clone(),
            inbox,
            cancel_rx,
            done_tx,
        );

        let thread_name = format!("{}-coordinator", shared.config.name);
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || coordinator.run())
            .map_err(|e| LineError::spawn_with_source(thread_name, "cannot start coordinator", e))?;

        *shared.coordinator.lock() = Some(handle);
        *shared.running.write() = Some(Running {
            token,
            done: done_rx,
        });
        Ok(())
    }

    /// Whether `start` succeeded
    pub fn is_started(&self) -> bool {
        self.shared.running.read().is_some()
    }

    /// Whether the coordinator has stopped
    pub fn is_terminated(&self) -> bool {
        self.shared
            .running
            .read()
            .as_ref()
            .is_some_and(|r| matches!(r.done.try_recv(), Err(TryRecvError::Disconnected)))
    }

    /// Identifier of this line in logs and reports
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// The configuration the line was built with
    pub fn config(&self) -> &LineConfig {
        &self.shared.config
    }

    /// The line's own cancellation token, once started
    pub fn token(&self) -> Option<CancellationToken> {
        self.shared.running.read().as_ref().map(|r| r.token.clone())
    }

    /// Hire `workers` workers for `category` and return a handle to its group
    ///
    /// Before `start` the hire is recorded and applied when the coordinator
    /// boots.
    pub fn new_group(&self, category: K, workers: usize) -> Result<Group<K>> {
        let delta = isize::try_from(workers)
            .map_err(|_| LineError::invalid_worker_count(label(&category), 0, isize::MAX))?;

        {
            let mut seed = self.shared.seed.lock();
            if self.shared.running.read().is_none() {
                seed.push((category.clone(), workers));
                return Ok(self.group(category));
            }
        }

        self.hire(category.clone(), delta)?;
        Ok(self.group(category))
    }

    /// A handle to `category`'s group; nothing is sent to the coordinator
    pub fn group(&self, category: K) -> Group<K> {
        Group {
            line: self.clone(),
            category,
        }
    }

    /// Push a task to the group of its own category
    ///
    /// Returns the group's status as observed before this turn's dispatch.
    /// After `finish` the task is dropped and the status is unchanged.
    pub fn push<T>(&self, task: T) -> Result<GroupStatus>
    where
        T: Task<K> + 'static,
    {
        self.push_boxed(Box::new(task))
    }

    /// Push an already boxed task
    pub fn push_boxed(&self, task: BoxedTask<K>) -> Result<GroupStatus> {
        let category = task.category();
        self.push_routed(category, task)
    }

    fn push_routed(&self, category: K, task: BoxedTask<K>) -> Result<GroupStatus> {
        let receipt = self.shared.request(|reply| Message::Push {
            tasks: vec![(category, task)],
            reply,
        })?;
        Ok(receipt.status.unwrap_or_default())
    }

    /// Push a batch in one turn, preserving order
    ///
    /// Returns how many tasks were accepted (0 once `finish` was requested).
    pub fn push_all<I>(&self, tasks: I) -> Result<usize>
    where
        I: IntoIterator<Item = BoxedTask<K>>,
    {
        let tasks: Vec<(K, BoxedTask<K>)> = tasks
            .into_iter()
            .map(|task| (task.category(), task))
            .collect();
        let receipt = self
            .shared
            .request(|reply| Message::Push { tasks, reply })?;
        Ok(receipt.accepted)
    }

    /// Resize `category`'s group by `delta` workers
    ///
    /// Shrinking takes idle workers first; the rest retire once their task
    /// completes. Running tasks are never interrupted.
    ///
    /// # Errors
    ///
    /// `InvalidWorkerCount` if `-delta` exceeds the hired workers; the group
    /// is left unchanged.
    pub fn hire(&self, category: K, delta: isize) -> Result<GroupStatus> {
        self.shared.request(|reply| Message::Hire {
            category,
            delta,
            reply,
        })?
    }

    /// Visit `category`'s pending tasks in queue order
    ///
    /// The coordinator pauses for the duration of the visit: keep the visitor
    /// short and never call back into the line from it.
    pub fn walk_tasks<F>(&self, category: K, visitor: F) -> Result<GroupStatus>
    where
        F: FnMut(usize, &dyn Task<K>),
    {
        let loan = self
            .shared
            .request(|reply| Message::Walk { category, reply })?;
        loan.visit(visitor);
        Ok(loan.status())
    }

    /// Snapshot every group and the lifecycle flags
    pub fn report(&self) -> Result<Report<K>> {
        self.shared.request(|reply| Message::Report { reply })
    }

    /// Block until no task is queued or running
    ///
    /// The line stays open afterwards.
    ///
    /// # Errors
    ///
    /// `Closed` if the line terminates first, or already has.
    pub fn wait(&self) -> Result<()> {
        self.shared.request(|reply| Message::Wait { reply })
    }

    /// Stop accepting pushes, drain every queue and follow-up, terminate
    ///
    /// Blocks until the coordinator has stopped. Idempotent.
    pub fn finish(&self) -> Result<()> {
        let running = self.shared.running()?;
        log::debug!("line '{}': finish", self.shared.config.name);
        // A failed send means the coordinator is already on its way out.
        let _ = self.shared.inbox.send(Message::Finish);
        let _ = running.done.recv();
        Ok(())
    }

    /// Stop on the coordinator's next turn, abandoning queued work
    ///
    /// Running tasks are not interrupted but see their token cancelled.
    /// Blocks until the coordinator has stopped. Idempotent.
    pub fn cancel(&self) -> Result<()> {
        let running = self.shared.running()?;
        log::debug!("line '{}': cancel", self.shared.config.name);
        running.token.cancel();
        let _ = running.done.recv();
        Ok(())
    }
}

/// Handle to one category's worker group
#[derive(Clone, Debug)]
pub struct Group<K: Category> {
    line: Line<K>,
    category: K,
}

impl<K: Category> Group<K> {
    /// The category this group serves
    pub fn category(&self) -> &K {
        &self.category
    }

    /// The line owning this group
    pub fn line(&self) -> &Line<K> {
        &self.line
    }

    /// Push a task to this group regardless of the task's own category
    ///
    /// Follow-ups it returns are still routed by their own categories.
    pub fn push<T>(&self, task: T) -> Result<GroupStatus>
    where
        T: Task<K> + 'static,
    {
        self.line.push_routed(self.category.clone(), Box::new(task))
    }

    /// Resize this group by `delta` workers
    pub fn hire(&self, delta: isize) -> Result<GroupStatus> {
        self.line.hire(self.category.clone(), delta)
    }

    /// Visit this group's pending tasks in queue order
    pub fn walk_tasks<F>(&self, visitor: F) -> Result<GroupStatus>
    where
        F: FnMut(usize, &dyn Task<K>),
    {
        self.line.walk_tasks(self.category.clone(), visitor)
    }

    /// Current workers, idle workers and queue depth
    pub fn status(&self) -> Result<GroupStatus> {
        self.hire(0)
    }
}
