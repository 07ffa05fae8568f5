use runtime::task::{TaskOutcome, TaskStatus};
use runtime::task_queue::TaskQueue;

use crate::request::TileId;

/// Tile task queue with bounded concurrency and view-driven priorities.
///
/// This is a thin wrapper over `runtime::TaskQueue` so streaming can own its
/// scheduling policy without duplicating queue logic.
#[derive(Debug)]
pub struct TileQueue {
    inner: TaskQueue<TileId>,
}

impl TileQueue {
    pub fn new(concurrency: usize) -> Self {
        Self {
            inner: TaskQueue::new(concurrency),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn running_len(&self) -> usize {
        self.inner.running_len()
    }

    pub fn status(&self, id: TileId) -> Option<TaskStatus> {
        self.inner.status(id)
    }

    pub fn is_stale(&self, id: TileId) -> bool {
        self.inner.is_stale(id)
    }

    pub fn enqueue(&mut self, id: TileId, priority: f64) {
        self.inner.enqueue(id, priority);
    }

    pub fn set_priority(&mut self, id: TileId, priority: f64) {
        self.inner.set_priority(id, priority);
    }

    pub fn disable_all(&mut self) {
        self.inner.disable_all();
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn pump(&mut self) -> Vec<TileId> {
        self.inner.pump()
    }

    pub fn settle(&mut self, id: TileId, outcome: TaskOutcome) -> Vec<TileId> {
        self.inner.settle(id, outcome)
    }

    pub fn settled_done(&self) -> u64 {
        self.inner.settled_done()
    }

    pub fn settled_error(&self) -> u64 {
        self.inner.settled_error()
    }
}
