//! Task trait and closure adapters

use crate::core::cancellation::CancellationToken;
use crate::core::category::{label, Category};
use crate::core::error::{LineError, Result};
use std::fmt;

/// Tasks to enqueue once a task completes
pub type FollowUps<K> = Vec<BoxedTask<K>>;

/// A boxed task that can be sent across threads
pub type BoxedTask<K> = Box<dyn Task<K>>;

/// A unit of work routed to the worker group of its category
///
/// Ownership moves to the line on push and to exactly one worker thread on
/// dispatch. `execute` runs at most once.
pub trait Task<K: Category>: Send {
    /// Category whose worker group runs this task
    fn category(&self) -> K;

    /// Run the task
    ///
    /// The returned tasks are appended to the back of their own categories'
    /// queues, even while the line is draining.
    ///
    /// # Errors
    ///
    /// An error completes the task with no follow-ups. It is logged and
    /// counted in the group statistics, never raised to callers of the line.
    fn execute(&mut self, token: &CancellationToken) -> Result<FollowUps<K>>;

    /// Name for logs, walk visitors and statistics
    fn name(&self) -> &str {
        "Task"
    }
}

impl<'a, K: Category> fmt::Debug for dyn Task<K> + 'a {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({} @ {})", self.name(), label(&self.category()))
    }
}

/// A task built from a closure that may produce follow-ups
pub struct ClosureTask<K, F>
where
    K: Category,
    F: FnOnce(&CancellationToken) -> Result<FollowUps<K>> + Send,
{
    category: K,
    closure: Option<F>,
    name: String,
}

impl<K, F> ClosureTask<K, F>
where
    K: Category,
    F: FnOnce(&CancellationToken) -> Result<FollowUps<K>> + Send,
{
    /// Create a new closure task
    pub fn new(category: K, closure: F) -> Self {
        Self {
            category,
            closure: Some(closure),
            name: "ClosureTask".to_string(),
        }
    }

    /// Create a new closure task with a custom name
    pub fn with_name<S: Into<String>>(category: K, closure: F, name: S) -> Self {
        Self {
            category,
            closure: Some(closure),
            name: name.into(),
        }
    }
}

impl<K, F> Task<K> for ClosureTask<K, F>
where
    K: Category,
    F: FnOnce(&CancellationToken) -> Result<FollowUps<K>> + Send,
{
    fn category(&self) -> K {
        self.category.clone()
    }

    fn execute(&mut self, token: &CancellationToken) -> Result<FollowUps<K>> {
        match self.closure.take() {
            Some(closure) => closure(token),
            None => Err(LineError::execution(
                &self.name,
                "closure already executed - cannot execute twice",
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A side-effect-only task: never yields follow-ups
pub struct EffectTask<K, F>
where
    K: Category,
    F: FnOnce(&CancellationToken) + Send,
{
    category: K,
    effect: Option<F>,
    name: String,
}

impl<K, F> EffectTask<K, F>
where
    K: Category,
    F: FnOnce(&CancellationToken) + Send,
{
    /// Create a new effect task
    pub fn new(category: K, effect: F) -> Self {
        Self {
            category,
            effect: Some(effect),
            name: "EffectTask".to_string(),
        }
    }

    /// Create a new effect task with a custom name
    pub fn with_name<S: Into<String>>(category: K, effect: F, name: S) -> Self {
        Self {
            category,
            effect: Some(effect),
            name: name.into(),
        }
    }
}

impl<K, F> Task<K> for EffectTask<K, F>
where
    K: Category,
    F: FnOnce(&CancellationToken) + Send,
{
    fn category(&self) -> K {
        self.category.clone()
    }

    fn execute(&mut self, token: &CancellationToken) -> Result<FollowUps<K>> {
        match self.effect.take() {
            Some(effect) => {
                effect(token);
                Ok(Vec::new())
            }
            None => Err(LineError::execution(
                &self.name,
                "effect already executed - cannot execute twice",
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
