//! Worker threads: one per dispatched task

use crate::core::category::label;
use crate::core::{BoxedTask, CancellationToken, Category, FollowUps, LineError, Result};
use crate::line::message::{Completion, Message};
use crossbeam_channel::Sender;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{span, Level};

/// How a task's execution ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TaskOutcome {
    /// `execute` returned `Ok`
    Completed,
    /// `execute` returned an error
    Failed(String),
    /// `execute` panicked
    Panicked(String),
}

/// Spawns worker threads that report back to the coordinator
pub(crate) struct WorkerLauncher<K: Category> {
    line_name: String,
    stack_size: Option<usize>,
    catch_panics: bool,
    token: CancellationToken,
    inbox: Sender<Message<K>>,
}

impl<K: Category> WorkerLauncher<K> {
    pub(crate) fn new(
        line_name: String,
        stack_size: Option<usize>,
        catch_panics: bool,
        token: CancellationToken,
        inbox: Sender<Message<K>>,
    ) -> Self {
        Self {
            line_name,
            stack_size,
            catch_panics,
            token,
            inbox,
        }
    }

    /// Run `task` on a fresh thread
    ///
    /// The thread sends exactly one completion, even when panics are not
    /// caught and the task unwinds the thread. If the line has terminated in
    /// the meantime the completion is discarded.
    pub(crate) fn launch(&self, category: K, task: BoxedTask<K>) -> Result<()> {
        let thread_name = format!("{}-{}", self.line_name, label(&category));

        let mut builder = thread::Builder::new().name(thread_name.clone());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }

        let token = self.token.clone();
        let inbox = self.inbox.clone();
        let catch_panics = self.catch_panics;

        builder
            .spawn(move || {
                let mut guard = UnwindGuard {
                    inbox: &inbox,
                    category: Some(category.clone()),
                    name: task.name().to_string(),
                    start: Instant::now(),
                };
                let completion = execute(category, task, &token, catch_panics);
                guard.disarm();
                // Err only once the coordinator is gone.
                let _ = inbox.send(Message::Completion(completion));
            })
            .map(|_| ())
            .map_err(|e| LineError::spawn_with_source(thread_name, "cannot start worker", e))
    }
}

/// Reports a panicked completion if the worker thread unwinds before
/// `execute` returns, so the slot and the line's load are always settled
struct UnwindGuard<'a, K: Category> {
    inbox: &'a Sender<Message<K>>,
    category: Option<K>,
    name: String,
    start: Instant,
}

impl<K: Category> UnwindGuard<'_, K> {
    fn disarm(&mut self) {
        self.category = None;
    }
}

impl<K: Category> Drop for UnwindGuard<'_, K> {
    fn drop(&mut self) {
        let Some(category) = self.category.take() else {
            return;
        };
        let elapsed = self.start.elapsed();
        log::error!(
            "task '{}' in {} unwound its worker thread",
            self.name,
            label(&category)
        );
        #[cfg(feature = "tracing")]
        crate::trace::metrics::record_panic(elapsed);

        let _ = self.inbox.send(Message::Completion(Completion {
            category,
            name: std::mem::take(&mut self.name),
            outcome: TaskOutcome::Panicked("worker thread unwound".to_string()),
            follow_ups: Vec::new(),
            elapsed,
        }));
    }
}

/// Execute a single task, isolating failures and panics
fn execute<K: Category>(
    category: K,
    mut task: BoxedTask<K>,
    token: &CancellationToken,
    catch_panics: bool,
) -> Completion<K> {
    let name = task.name().to_string();

    #[cfg(feature = "tracing")]
    let task_span = span!(
        Level::DEBUG,
        "task_execution",
        task = %name,
        category = %label(&category)
    );
    #[cfg(feature = "tracing")]
    let _task_guard = task_span.enter();

    let start = Instant::now();

    let result = if catch_panics {
        catch_unwind(AssertUnwindSafe(|| task.execute(token)))
    } else {
        Ok(task.execute(token))
    };

    let elapsed = start.elapsed();

    let (outcome, follow_ups): (TaskOutcome, FollowUps<K>) = match result {
        Ok(Ok(follow_ups)) => {
            log::trace!(
                "task '{}' in {} completed in {:?} with {} follow-ups",
                name,
                label(&category),
                elapsed,
                follow_ups.len()
            );
            #[cfg(feature = "tracing")]
            crate::trace::metrics::record_completion(elapsed, true);
            (TaskOutcome::Completed, follow_ups)
        }
        Ok(Err(e)) => {
            log::warn!("task '{}' in {} failed: {}", name, label(&category), e);
            #[cfg(feature = "tracing")]
            crate::trace::metrics::record_completion(elapsed, false);
            (TaskOutcome::Failed(e.to_string()), Vec::new())
        }
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            log::error!("task '{}' in {} panicked: {}", name, label(&category), panic_msg);
            #[cfg(feature = "tracing")]
            crate::trace::metrics::record_panic(elapsed);
            (TaskOutcome::Panicked(panic_msg), Vec::new())
        }
    };

    Completion {
        category,
        name,
        outcome,
        follow_ups,
        elapsed,
    }
}
