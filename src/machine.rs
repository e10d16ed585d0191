//! A machine: one sandboxed execution context with its own engine instance,
//! job queue, and bindings.
//!
//! Two locks guard a machine. The execution lock serializes the sequencer
//! currently running the machine against administrative calls that touch the
//! queue or bindings; taking it can wait for up to one time slice. The control
//! lock covers cheap bookkeeping (pending job ids, the running job, the
//! termination flag, last-active time) and is never held across an await or an
//! evaluation, so status queries and in-flight aborts never wait on a slice.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::bindings::Bindings;
use crate::engine::ScriptEngine;
use crate::error::{FarmError, Result};
use crate::events::ResultCounter;
use crate::job::{Job, JobOutcome, JobResult, JobStatus};

struct ExecState {
    engine: Box<dyn ScriptEngine>,
    queue: VecDeque<Job>,
    bindings: Bindings,
}

struct Control {
    queued_ids: HashSet<String>,
    running: Option<String>,
    abort_requested: HashSet<String>,
    terminated: bool,
    last_active: Instant,
}

pub struct Machine {
    id: String,
    queue_capacity: usize,
    exec: Arc<Mutex<ExecState>>,
    control: StdMutex<Control>,
}

impl Machine {
    pub(crate) fn new(id: String, engine: Box<dyn ScriptEngine>, queue_capacity: usize) -> Self {
        Self {
            id,
            queue_capacity,
            exec: Arc::new(Mutex::new(ExecState {
                engine,
                queue: VecDeque::new(),
                bindings: Bindings::new(),
            })),
            control: StdMutex::new(Control {
                queued_ids: HashSet::new(),
                running: None,
                abort_requested: HashSet::new(),
                terminated: false,
                last_active: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Appends a job to the queue. Validation happens against the control
    /// state, so a rejected submission never waits; an accepted one reserves
    /// its id and may then wait for up to one time slice for the sequencer
    /// currently holding this machine to yield before the job lands.
    pub(crate) async fn submit(&self, job: Job) -> Result<()> {
        {
            let mut ctl = self.control();
            if ctl.terminated {
                return Err(FarmError::MachineNotFound(self.id.clone()));
            }
            if ctl.queued_ids.len() >= self.queue_capacity {
                return Err(FarmError::MachineQueueFull(self.id.clone()));
            }
            if ctl.queued_ids.contains(&job.id) || ctl.running.as_deref() == Some(job.id.as_str()) {
                return Err(FarmError::JobAlreadyExists {
                    machine_id: self.id.clone(),
                    job_id: job.id,
                });
            }
            ctl.queued_ids.insert(job.id.clone());
            ctl.last_active = Instant::now();
        }
        tracing::debug!(machine_id = %self.id, job_id = %job.id, "job queued");
        let mut exec = self.exec.lock().await;
        exec.queue.push_back(job);
        Ok(())
    }

    /// Best-effort cancellation. A queued job is removed and resolves to an
    /// `Aborted` result immediately; a job currently evaluating is flagged and
    /// its result is tagged `Aborted` when evaluation returns, even if it
    /// finished successfully in the meantime.
    pub(crate) async fn abort(&self, job_id: &str, sink: &ResultCounter) -> Result<()> {
        {
            let mut ctl = self.control();
            if ctl.running.as_deref() == Some(job_id) {
                ctl.abort_requested.insert(job_id.to_string());
                tracing::debug!(machine_id = %self.id, job_id, "abort requested for running job");
                return Ok(());
            }
            if !ctl.queued_ids.contains(job_id) {
                return Err(FarmError::JobNotFound(job_id.to_string()));
            }
        }

        // Queued: remove it under the execution lock. The job may start and
        // finish in the window before the lock is acquired.
        let mut exec = self.exec.lock().await;
        if let Some(pos) = exec.queue.iter().position(|j| j.id == job_id) {
            if let Some(job) = exec.queue.remove(pos) {
                {
                    let mut ctl = self.control();
                    ctl.queued_ids.remove(&job.id);
                    ctl.last_active = Instant::now();
                }
                tracing::debug!(machine_id = %self.id, job_id, "queued job aborted");
                sink.handle(JobResult::new(self.id.clone(), job.id, JobOutcome::Aborted));
            }
        }
        // Otherwise the job raced with execution and already resolved through
        // its own result.
        Ok(())
    }

    /// Queued or running; completed and aborted jobs are not retained.
    pub(crate) fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        let ctl = self.control();
        if ctl.running.as_deref() == Some(job_id) {
            Ok(JobStatus::Running)
        } else if ctl.queued_ids.contains(job_id) {
            Ok(JobStatus::Queued)
        } else {
            Err(FarmError::JobNotFound(job_id.to_string()))
        }
    }

    pub(crate) async fn get_bindings(&self, names: Option<&[String]>) -> Bindings {
        let exec = self.exec.lock().await;
        match names {
            Some(names) => exec.bindings.subset(names),
            None => exec.bindings.clone(),
        }
    }

    pub(crate) async fn set_bindings(&self, bindings: Bindings) {
        let mut exec = self.exec.lock().await;
        exec.bindings.merge(bindings);
        self.control().last_active = Instant::now();
    }

    /// One time slice of execution, called by a sequencer holding this
    /// machine. Evaluates queued jobs in FIFO order until the slice budget is
    /// exhausted or the queue drains. Returns whether work remains.
    ///
    /// Engines evaluate synchronously, so the slice body runs on the blocking
    /// thread pool; runtime worker threads stay free for timers and
    /// administrative calls no matter how long an evaluation takes.
    pub(crate) async fn work(self: &Arc<Self>, slice: Duration, sink: &Arc<ResultCounter>) -> bool {
        let mut exec = Arc::clone(&self.exec).lock_owned().await;
        let machine = Arc::clone(self);
        let sink = Arc::clone(sink);
        let slice_result =
            tokio::task::spawn_blocking(move || machine.run_slice(&mut exec, slice, &sink)).await;
        match slice_result {
            Ok(more) => more,
            Err(join_error) => {
                tracing::error!(machine_id = %self.id, error = %join_error, "execution slice panicked");
                false
            }
        }
    }

    fn run_slice(&self, exec: &mut ExecState, slice: Duration, sink: &ResultCounter) -> bool {
        let deadline = Instant::now() + slice;

        loop {
            if self.control().terminated {
                self.drain_terminated(exec, sink);
                return false;
            }

            let Some(job) = exec.queue.pop_front() else {
                break;
            };
            {
                let mut ctl = self.control();
                ctl.queued_ids.remove(&job.id);
                ctl.running = Some(job.id.clone());
            }

            let ExecState {
                engine, bindings, ..
            } = &mut *exec;
            let outcome = match engine.evaluate(&job.expression, bindings) {
                Ok(value) => JobOutcome::Value(value),
                Err(error) => JobOutcome::EvaluationFailed(error),
            };

            let aborted = {
                let mut ctl = self.control();
                ctl.running = None;
                ctl.last_active = Instant::now();
                ctl.abort_requested.remove(&job.id)
            };
            let outcome = if aborted { JobOutcome::Aborted } else { outcome };

            tracing::debug!(machine_id = %self.id, job_id = %job.id, "job finished");
            sink.handle(JobResult::new(self.id.clone(), job.id, outcome));

            if Instant::now() >= deadline {
                break;
            }
        }

        !exec.queue.is_empty() && !self.control().terminated
    }

    /// Marks the machine dead and resolves every never-run job to a
    /// `MachineTerminated` result. Waits for an in-progress slice to yield.
    pub(crate) async fn terminate(&self, sink: &ResultCounter) {
        self.control().terminated = true;
        let mut exec = self.exec.lock().await;
        self.drain_terminated(&mut exec, sink);
    }

    /// Eviction predicate: live, no queued or running work, idle past `ttl`.
    /// Never waits on the execution lock.
    pub(crate) fn is_idle(&self, ttl: Duration) -> bool {
        let ctl = self.control();
        !ctl.terminated
            && ctl.running.is_none()
            && ctl.queued_ids.is_empty()
            && ctl.last_active.elapsed() >= ttl
    }

    fn drain_terminated(&self, exec: &mut ExecState, sink: &ResultCounter) {
        while let Some(job) = exec.queue.pop_front() {
            tracing::debug!(machine_id = %self.id, job_id = %job.id, "orphaned job resolved");
            sink.handle(JobResult::new(
                self.id.clone(),
                job.id,
                JobOutcome::MachineTerminated,
            ));
        }
        let mut ctl = self.control();
        ctl.queued_ids.clear();
        ctl.abort_requested.clear();
    }

    fn control(&self) -> std::sync::MutexGuard<'_, Control> {
        self.control.lock().expect("machine control lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::calc::CalcEngine;
    use crate::events::ResultCounter;
    use std::sync::Arc;

    fn machine(capacity: usize) -> Arc<Machine> {
        Arc::new(Machine::new("m1".to_string(), Box::new(CalcEngine), capacity))
    }

    fn counting_sink() -> (
        Arc<ResultCounter>,
        tokio::sync::mpsc::UnboundedReceiver<JobResult>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Arc::new(ResultCounter::new(Arc::new(tx))), rx)
    }

    #[tokio::test]
    async fn work_runs_jobs_in_submission_order() {
        let m = machine(16);
        let (sink, mut rx) = counting_sink();
        m.submit(Job::new("j1", "1 + 1")).await.unwrap();
        m.submit(Job::new("j2", "2 + 2")).await.unwrap();

        let more = m.work(Duration::from_secs(1), &sink).await;
        assert!(!more);
        assert_eq!(rx.try_recv().unwrap().job_id, "j1");
        assert_eq!(rx.try_recv().unwrap().job_id, "j2");
        assert_eq!(sink.completed(), 2);
    }

    #[tokio::test]
    async fn duplicate_job_id_rejected_while_pending() {
        let m = machine(16);
        m.submit(Job::new("j1", "1")).await.unwrap();
        let err = m.submit(Job::new("j1", "2")).await.unwrap_err();
        assert!(matches!(err, FarmError::JobAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn queue_capacity_enforced() {
        let m = machine(1);
        m.submit(Job::new("j1", "1")).await.unwrap();
        let err = m.submit(Job::new("j2", "2")).await.unwrap_err();
        assert!(matches!(err, FarmError::MachineQueueFull(_)));
    }

    #[tokio::test]
    async fn abort_queued_job_resolves_aborted() {
        let m = machine(16);
        let (sink, mut rx) = counting_sink();
        m.submit(Job::new("j1", "1")).await.unwrap();
        m.abort("j1", &sink).await.unwrap();

        let result = rx.try_recv().unwrap();
        assert_eq!(result.outcome, JobOutcome::Aborted);
        assert!(matches!(
            m.job_status("j1"),
            Err(FarmError::JobNotFound(_))
        ));

        // Nothing left to execute.
        assert!(!m.work(Duration::from_secs(1), &sink).await);
        assert_eq!(sink.completed(), 1);
    }

    #[tokio::test]
    async fn abort_unknown_job_fails() {
        let m = machine(16);
        let (sink, _rx) = counting_sink();
        assert!(matches!(
            m.abort("nope", &sink).await,
            Err(FarmError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn terminate_orphans_pending_jobs() {
        let m = machine(16);
        let (sink, mut rx) = counting_sink();
        m.submit(Job::new("j1", "1")).await.unwrap();
        m.submit(Job::new("j2", "2")).await.unwrap();

        m.terminate(&sink).await;
        assert_eq!(rx.try_recv().unwrap().outcome, JobOutcome::MachineTerminated);
        assert_eq!(rx.try_recv().unwrap().outcome, JobOutcome::MachineTerminated);
        assert_eq!(sink.completed(), 2);

        let err = m.submit(Job::new("j3", "3")).await.unwrap_err();
        assert!(matches!(err, FarmError::MachineNotFound(_)));
    }

    #[tokio::test]
    async fn evaluation_error_carried_in_result() {
        let m = machine(16);
        let (sink, mut rx) = counting_sink();
        m.submit(Job::new("j1", "1 / 0")).await.unwrap();
        m.work(Duration::from_secs(1), &sink).await;

        let result = rx.try_recv().unwrap();
        assert!(matches!(result.outcome, JobOutcome::EvaluationFailed(_)));
    }

    #[tokio::test]
    async fn bindings_survive_between_jobs() {
        let m = machine(16);
        let (sink, mut rx) = counting_sink();
        m.submit(Job::new("j1", "x = 21")).await.unwrap();
        m.submit(Job::new("j2", "x * 2")).await.unwrap();
        m.work(Duration::from_secs(1), &sink).await;

        let _ = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(second.value(), Some(&serde_json::Value::from(42)));

        let all = m.get_bindings(None).await;
        assert_eq!(all.get("x"), Some(&serde_json::Value::from(21)));
    }

    #[tokio::test]
    async fn is_idle_respects_pending_work() {
        let m = machine(16);
        let (sink, _rx) = counting_sink();
        assert!(m.is_idle(Duration::ZERO));

        m.submit(Job::new("j1", "1")).await.unwrap();
        assert!(!m.is_idle(Duration::ZERO));

        m.work(Duration::from_secs(1), &sink).await;
        assert!(m.is_idle(Duration::ZERO));
        assert!(!m.is_idle(Duration::from_secs(3600)));
    }
}
