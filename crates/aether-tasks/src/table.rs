//! The task table: opaque ids, queue allocation, and per-task metadata.
//!
//! Tasks reference each other by id, never by pointer, so the table and
//! the comp trees inside it stay strictly tree-shaped.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use aether_ast::Comp;
use aether_foundation::{QueueId, TaskId};

/// External input queue of the whole split program, reused from the
/// caller at the entry seam.
pub const EXTERNAL_IN: QueueId = QueueId(0);

/// External output queue of the whole split program.
pub const EXTERNAL_OUT: QueueId = QueueId(1);

/// Scheduler placement hint for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// Pin to its own worker; used for standalone-marked tasks.
    Alone,
    Shared,
    Unspecified,
}

/// One entry of the task table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    /// The task body; contains no `Standalone` nodes.
    pub body: Comp,
    pub input_queue: QueueId,
    pub output_queue: QueueId,
    pub placement: Placement,
}

/// Tasks addressable by opaque id, plus the queue id allocator.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TaskTable {
    tasks: IndexMap<TaskId, TaskInfo>,
    next_task: u32,
    seam_queues: u32,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task body and return its fresh id.
    pub fn insert(
        &mut self,
        body: Comp,
        input_queue: QueueId,
        output_queue: QueueId,
        placement: Placement,
    ) -> TaskId {
        let id = TaskId(self.next_task);
        self.next_task += 1;
        debug!(task = %id, in_queue = %input_queue, out_queue = %output_queue, ?placement, "task registered");
        self.tasks.insert(
            id,
            TaskInfo {
                body,
                input_queue,
                output_queue,
                placement,
            },
        );
        id
    }

    /// Allocate a fresh queue for a pipeline seam. Ids 0 and 1 are
    /// reserved for the caller's external endpoints.
    pub fn fresh_queue(&mut self) -> QueueId {
        let id = QueueId(2 + self.seam_queues);
        self.seam_queues += 1;
        debug!(queue = %id, "seam queue allocated");
        id
    }

    /// Number of seam queues allocated so far (external endpoints not
    /// included).
    pub fn seam_queue_count(&self) -> usize {
        self.seam_queues as usize
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskInfo> {
        self.tasks.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskInfo> {
        self.tasks.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &TaskInfo)> {
        self.tasks.iter().map(|(id, info)| (*id, info))
    }
}
