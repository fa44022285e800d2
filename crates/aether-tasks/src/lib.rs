//! Task-graph splitter for the aether compiler.
//!
//! Rewrites a comp-level AST into an entry comp plus a table of
//! independently-scheduled tasks, cut at `Standalone` barriers and
//! pipeline seams. The scheduler the tasks run under is external; tasks
//! are addressed by opaque ids and synchronize through bounded
//! single-producer single-consumer queues.

pub mod error;
pub mod split;
pub mod table;

pub use error::{Result, SplitError};
pub use split::{insert_tasks, insert_tasks_folded};
pub use table::{EXTERNAL_IN, EXTERNAL_OUT, Placement, TaskInfo, TaskTable};
