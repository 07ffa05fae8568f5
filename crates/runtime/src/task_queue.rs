use std::collections::{BTreeMap, BTreeSet};

use crate::task::{Task, TaskOutcome, TaskStatus};

/// Deterministic, bounded-concurrency task queue keyed by an ordered id.
///
/// Key properties:
/// - At most `concurrency` keys are running at any instant.
/// - Dispatch order is total: `(priority, insertion sequence)`, smaller
///   priority first, equal priorities in enqueue order.
/// - `disable_all` is a soft pause: it makes every tracked task ineligible
///   for dispatch without touching in-flight work; `set_priority` re-enables
///   a task the current pass still wants.
/// - `clear` is the hard teardown: every tracked task is dropped and late
///   settlements become no-ops, so stale work can be detected and discarded.
///
/// The queue never executes work itself. [`TaskQueue::pump`] hands out the
/// keys whose work should start and [`TaskQueue::settle`] takes completions
/// back, returning the follow-on batch. This keeps scheduling replayable and
/// testable without an async runtime.
#[derive(Debug)]
pub struct TaskQueue<K> {
    concurrency: usize,
    next_seq: u64,
    tasks: BTreeMap<K, Task>,
    running: BTreeSet<K>,
    settled_done: u64,
    settled_error: u64,
}

impl<K: Ord + Copy> TaskQueue<K> {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            next_seq: 0,
            tasks: BTreeMap::new(),
            running: BTreeSet::new(),
            settled_done: 0,
            settled_error: 0,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of tracked (not yet settled) tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn is_tracked(&self, key: K) -> bool {
        self.tasks.contains_key(&key)
    }

    pub fn status(&self, key: K) -> Option<TaskStatus> {
        let task = self.tasks.get(&key)?;
        Some(if self.running.contains(&key) {
            TaskStatus::Running
        } else if task.wanted {
            TaskStatus::Pending
        } else {
            TaskStatus::Disabled
        })
    }

    /// True when a completion for `key` no longer has a live claim: the task
    /// was torn down (or never dispatched) while its work was in flight.
    /// Callers must check this before applying a result.
    pub fn is_stale(&self, key: K) -> bool {
        !self.running.contains(&key)
    }

    pub fn settled_done(&self) -> u64 {
        self.settled_done
    }

    pub fn settled_error(&self) -> u64 {
        self.settled_error
    }

    /// Registers a new pending task.
    ///
    /// The caller must guarantee `key` is not already tracked; the seen-set
    /// diff upstream establishes that each key is enqueued at most once.
    pub fn enqueue(&mut self, key: K, priority: f64) {
        debug_assert!(!self.tasks.contains_key(&key), "key enqueued twice");
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.tasks.insert(
            key,
            Task {
                priority,
                seq,
                wanted: true,
            },
        );
    }

    /// Updates a tracked task's priority and marks it wanted again.
    ///
    /// No-op for untracked keys: a task that already settled (and was
    /// removed) stays settled, which is what makes the once-per-session
    /// attempt policy hold without extra bookkeeping here.
    pub fn set_priority(&mut self, key: K, priority: f64) {
        if let Some(task) = self.tasks.get_mut(&key) {
            task.priority = priority;
            task.wanted = true;
        }
    }

    /// Soft pause: makes every tracked task ineligible for dispatch.
    ///
    /// Running work is unaffected; a later `set_priority` restores
    /// eligibility. Called once per visibility pass before re-enabling the
    /// tiles the pass still wants.
    pub fn disable_all(&mut self) {
        for task in self.tasks.values_mut() {
            task.wanted = false;
        }
    }

    /// Hard teardown: cancels every tracked task and empties the queue.
    ///
    /// The only point where in-flight work is told to discard its eventual
    /// result — completions arriving afterwards find their key stale.
    pub fn clear(&mut self) {
        self.tasks.clear();
        self.running.clear();
    }

    /// Tops the running set up to the concurrency limit and returns the keys
    /// whose work should start now, in dispatch order.
    pub fn pump(&mut self) -> Vec<K> {
        let mut started = Vec::new();
        while self.running.len() < self.concurrency {
            let next = self
                .tasks
                .iter()
                .filter(|(k, t)| t.wanted && !self.running.contains(*k))
                .min_by(|(_, a), (_, b)| {
                    a.priority
                        .total_cmp(&b.priority)
                        .then_with(|| a.seq.cmp(&b.seq))
                })
                .map(|(k, _)| *k);

            let Some(key) = next else {
                break;
            };
            self.running.insert(key);
            started.push(key);
        }
        started
    }

    /// Records the completion of a running task and pumps again.
    ///
    /// Settling an untracked or torn-down key is a no-op returning no new
    /// work; otherwise the task is removed from both containers and the
    /// returned batch is the follow-on dispatch.
    pub fn settle(&mut self, key: K, outcome: TaskOutcome) -> Vec<K> {
        if !self.running.remove(&key) {
            return Vec::new();
        }
        self.tasks.remove(&key);
        match outcome {
            TaskOutcome::Done => self.settled_done += 1,
            TaskOutcome::Error => self.settled_error += 1,
        }
        self.pump()
    }
}
