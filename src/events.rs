//! Result and status delivery seams.
//!
//! The scheduler pushes every terminal job outcome through a [`ResultHandler`]
//! and every status transition through a [`StatusEventHandler`]. Both are
//! synchronous callbacks; the transport layer adapts them onto the wire.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::job::JobResult;
use crate::scheduler::{FarmStatus, MachineStatus};

/// Receives each job's terminal result exactly once. Infallible by signature:
/// a handler that cannot deliver must swallow the failure itself.
pub trait ResultHandler: Send + Sync {
    fn handle_result(&self, result: JobResult);
}

/// Receives scheduler and machine status transitions, fired synchronously.
pub trait StatusEventHandler: Send + Sync {
    fn scheduler_status_changed(&self, status: FarmStatus);

    fn machine_status_changed(&self, machine_id: &str, status: MachineStatus);
}

/// Event handler that ignores every transition.
pub struct NoopEventHandler;

impl StatusEventHandler for NoopEventHandler {
    fn scheduler_status_changed(&self, _status: FarmStatus) {}

    fn machine_status_changed(&self, _machine_id: &str, _status: MachineStatus) {}
}

/// An unbounded channel sender works directly as a result sink; tests and the
/// transport layer drain the receiving end.
impl ResultHandler for tokio::sync::mpsc::UnboundedSender<JobResult> {
    fn handle_result(&self, result: JobResult) {
        // A dropped receiver means nobody is listening; the result still
        // counts as delivered.
        let _ = self.send(result);
    }
}

/// Wraps the farm's result sink with completion accounting.
///
/// The completed counter is incremented strictly after the inner handler
/// returns, so `wait_until_finished` observes full delivery rather than mere
/// scheduling.
pub struct ResultCounter {
    inner: Arc<dyn ResultHandler>,
    completed: AtomicU64,
}

impl ResultCounter {
    pub fn new(inner: Arc<dyn ResultHandler>) -> Self {
        Self {
            inner,
            completed: AtomicU64::new(0),
        }
    }

    pub fn handle(&self, result: JobResult) {
        self.inner.handle_result(result);
        self.completed.fetch_add(1, Ordering::Release);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobOutcome;

    #[test]
    fn result_counter_counts_after_delivery() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let counter = ResultCounter::new(Arc::new(tx));
        assert_eq!(counter.completed(), 0);

        counter.handle(JobResult::new("m1", "j1", JobOutcome::Aborted));
        assert_eq!(counter.completed(), 1);
        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered.machine_id, "m1");
        assert_eq!(delivered.job_id, "j1");
        assert_eq!(delivered.outcome, JobOutcome::Aborted);
    }

    #[test]
    fn dropped_receiver_still_counts() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<JobResult>();
        drop(rx);
        let counter = ResultCounter::new(Arc::new(tx));
        counter.handle(JobResult::new("m1", "j1", JobOutcome::MachineTerminated));
        assert_eq!(counter.completed(), 1);
    }
}
