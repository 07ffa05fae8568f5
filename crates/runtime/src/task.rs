/// Externally observable state of a queued task.
///
/// Internally a task carries independent flags (`wanted`, plus membership in
/// the queue's running set); the status is derived from them. Visibility
/// passes only ever toggle `wanted`, and settlement is reported exactly once
/// through [`crate::TaskQueue::settle`], so there is no status field a late
/// completion handler could silently overwrite.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Tracked but not wanted by the latest visibility pass.
    Disabled,
    /// Wanted and eligible for the next free slot.
    Pending,
    /// Dispatched; its work is in flight.
    Running,
}

/// How a dispatched task's work ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Done,
    Error,
}

#[derive(Debug, Clone)]
pub(crate) struct Task {
    /// Smaller values run earlier.
    pub priority: f64,
    /// Insertion sequence; breaks priority ties in enqueue order.
    pub seq: u64,
    /// Toggled by visibility passes. A running task keeps running when this
    /// drops to false; the flag only gates dispatch eligibility.
    pub wanted: bool,
}
