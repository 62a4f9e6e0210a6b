//! The line: coordinator, worker groups and their public handles

pub mod config;
mod coordinator;
pub mod group;
mod handle;
mod message;
pub mod report;
mod worker;

pub use config::{LineConfig, MIN_STACK_SIZE};
pub use group::{GroupStats, GroupStatus};
pub use handle::{Group, Line};
pub use report::{GroupReport, LineState, Report};
