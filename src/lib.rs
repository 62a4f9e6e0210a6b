//! # Assembly Line
//!
//! A concurrent task scheduler: a production line of worker groups keyed by
//! task category, fed by a single coordinator thread.
//!
//! ## Features
//!
//! - **Per-category groups**: each category gets its own FIFO queue and a
//!   worker count that can grow or shrink while tasks run
//! - **Follow-up tasks**: a task returns the tasks that continue its work,
//!   routed by their own categories
//! - **Lock-free bookkeeping**: one coordinator owns every queue and counter;
//!   producers and workers only hand it messages
//! - **Graceful drain**: `finish` drains queued work and follow-ups before
//!   stopping, `cancel` stops on the next turn
//! - **Introspection**: JSON-serializable reports and paused queue walks
//!
//! ## Quick Start
//!
//! ```rust
//! use assembly_line::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let line: Line<&'static str> = Line::new()?;
//! line.new_group("greet", 1)?;
//! line.new_group("print", 8)?;
//! line.start(&CancellationToken::new())?;
//!
//! for who in ["Ada", "Brian", "Grace"] {
//!     line.push(ClosureTask::new("greet", move |_: &CancellationToken| {
//!         let message = format!("Hello, {}!", who);
//!         let print: BoxedTask<&'static str> =
//!             Box::new(EffectTask::new("print", move |_: &CancellationToken| {
//!                 println!("{}", message);
//!             }));
//!         Ok(vec![print])
//!     }))?;
//! }
//!
//! // Drains the greetings and the print tasks they produced.
//! line.finish()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use assembly_line::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let config = LineConfig::new("ingest")
//!     .with_trim_threshold(256)
//!     .with_worker_stack_size(512 * 1024);
//!
//! let line: Line<u32> = Line::with_config(config)?;
//! line.start(&CancellationToken::new())?;
//! line.hire(0, 4)?;
//! # line.cancel()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Tasks
//!
//! ```rust
//! use assembly_line::prelude::*;
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
//! enum Stage {
//!     Split,
//!     Count,
//! }
//!
//! struct Split(String);
//!
//! impl Task<Stage> for Split {
//!     fn category(&self) -> Stage {
//!         Stage::Split
//!     }
//!
//!     fn execute(&mut self, token: &CancellationToken) -> Result<FollowUps<Stage>> {
//!         token.check()?;
//!         let mut follow_ups: FollowUps<Stage> = Vec::new();
//!         for word in self.0.split_whitespace() {
//!             let word = word.to_string();
//!             follow_ups.push(Box::new(EffectTask::new(Stage::Count, move |_: &CancellationToken| {
//!                 let _ = word.len();
//!             })));
//!         }
//!         Ok(follow_ups)
//!     }
//!
//!     fn name(&self) -> &str {
//!         "Split"
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let line = Line::new()?;
//! line.new_group(Stage::Split, 1)?;
//! line.new_group(Stage::Count, 4)?;
//! line.start(&CancellationToken::new())?;
//!
//! line.push(Split("the quick brown fox".to_string()))?;
//! line.wait()?;
//!
//! let report = line.report()?;
//! assert_eq!(report.group(&Stage::Count).map(|g| g.stats.completed), Some(4));
//! # line.finish()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod line;
pub mod prelude;
pub mod trace;

pub use crate::core::{
    BoxedTask, CancellationReason, CancellationToken, Category, ClosureTask, EffectTask,
    FollowUps, LineError, Result, Task,
};
pub use crate::line::{
    Group, GroupReport, GroupStats, GroupStatus, Line, LineConfig, LineState, Report,
};
