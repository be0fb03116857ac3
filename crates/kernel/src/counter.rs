use std::sync::atomic::{AtomicU32, Ordering};

/// Execution counter of one kernel session. Bumped once per non-silent
/// execute request and echoed in `execute_input`, `execute_result` and
/// `execute_reply`.
#[derive(Debug, Default)]
pub struct ExecutionCounter(AtomicU32);

impl ExecutionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments and returns the new count.
    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}
