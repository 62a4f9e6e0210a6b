//! Core types and traits for the assembly line

pub mod cancellation;
pub mod category;
pub mod error;
pub mod task;

pub use cancellation::{CancellationCallbackGuard, CancellationReason, CancellationToken};
pub use category::Category;
pub use error::{LineError, Result};
pub use task::{BoxedTask, ClosureTask, EffectTask, FollowUps, Task};
