//! Convenient re-exports for common types and traits

pub use crate::core::{
    BoxedTask, CancellationReason, CancellationToken, Category, ClosureTask, EffectTask,
    FollowUps, LineError, Result, Task,
};
pub use crate::line::{Group, GroupStatus, Line, LineConfig, LineState, Report};
