//! The scheduler: single administrative entry point for the farm.
//!
//! Owns the machine registry, the ready queue, scheduler-wide status, and the
//! completion counters. Every administrative call serializes through one
//! async mutex and exits quickly; execution happens in the sequencer tasks,
//! outside that lock. Idle machines are reclaimed lazily: an eviction scan
//! runs at the tail of mutating calls, at most once per configured interval,
//! so a scheduler that receives no calls at all never evicts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::bindings::Bindings;
use crate::config::FarmConfig;
use crate::engine::EngineRegistry;
use crate::error::{FarmError, Result};
use crate::events::{ResultCounter, ResultHandler, StatusEventHandler};
use crate::job::{Job, JobStatus};
use crate::machine::Machine;
use crate::ready_queue::ReadyQueue;
use crate::sequencer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FarmStatus {
    Active,
    ActiveFull,
    Inactive,
}

impl std::fmt::Display for FarmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FarmStatus::Active => write!(f, "active"),
            FarmStatus::ActiveFull => write!(f, "active_full"),
            FarmStatus::Inactive => write!(f, "inactive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineStatus {
    Active,
    NotFound,
}

impl std::fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineStatus::Active => write!(f, "active"),
            MachineStatus::NotFound => write!(f, "not_found"),
        }
    }
}

struct SchedulerState {
    machines: HashMap<String, Arc<Machine>>,
    status: FarmStatus,
    last_cleanup: Instant,
}

impl SchedulerState {
    fn ensure_active(&self) -> Result<()> {
        if self.status == FarmStatus::Inactive {
            return Err(FarmError::SchedulerTerminated);
        }
        Ok(())
    }

    fn machine(&self, machine_id: &str) -> Result<Arc<Machine>> {
        self.machines
            .get(machine_id)
            .cloned()
            .ok_or_else(|| FarmError::MachineNotFound(machine_id.to_string()))
    }
}

pub struct Scheduler {
    config: FarmConfig,
    engines: EngineRegistry,
    events: Arc<dyn StatusEventHandler>,
    results: Arc<ResultCounter>,
    ready: Arc<ReadyQueue>,
    sequencers: usize,
    sequencer_handles: StdMutex<Vec<JoinHandle<()>>>,
    jobs_received: AtomicU64,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    /// Creates a scheduler and spawns its sequencer pool.
    /// Must be called within a tokio runtime.
    pub fn new(
        config: FarmConfig,
        engines: EngineRegistry,
        results: Arc<dyn ResultHandler>,
        events: Arc<dyn StatusEventHandler>,
    ) -> Arc<Self> {
        tracing::info!(
            sequencers = config.sequencers,
            max_machines = config.max_machines,
            "instantiating scheduler"
        );

        let results = Arc::new(ResultCounter::new(results));
        let ready = Arc::new(ReadyQueue::new());

        // A pool of zero sequencers would strand every job.
        let sequencers = config.sequencers.max(1);
        let handles = (0..sequencers)
            .map(|index| sequencer::spawn(index, ready.clone(), results.clone(), config.time_slice))
            .collect();

        events.scheduler_status_changed(FarmStatus::Active);

        Arc::new(Self {
            config,
            engines,
            events,
            results,
            ready,
            sequencers,
            sequencer_handles: StdMutex::new(handles),
            jobs_received: AtomicU64::new(0),
            state: Mutex::new(SchedulerState {
                machines: HashMap::new(),
                status: FarmStatus::Active,
                last_cleanup: Instant::now(),
            }),
        })
    }

    /// Creates an empty machine running an engine for `language`.
    pub async fn spawn_machine(&self, machine_id: &str, language: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        st.ensure_active()?;

        if machine_id.is_empty() {
            return Err(FarmError::InvalidMachineId);
        }
        if st.status == FarmStatus::ActiveFull {
            return Err(FarmError::SchedulerFull);
        }
        if st.machines.contains_key(machine_id) {
            return Err(FarmError::MachineAlreadyExists(machine_id.to_string()));
        }
        let factory = self
            .engines
            .resolve(language)
            .ok_or_else(|| FarmError::UnsupportedEngine(language.to_string()))?;

        let machine = Arc::new(Machine::new(
            machine_id.to_string(),
            factory.create_engine(),
            self.config.job_queue_capacity,
        ));
        st.machines.insert(machine_id.to_string(), machine);
        tracing::info!(machine_id, language, "machine spawned");

        if st.machines.len() >= self.config.max_machines {
            self.set_status(&mut st, FarmStatus::ActiveFull);
        }
        self.events
            .machine_status_changed(machine_id, MachineStatus::Active);

        self.cleanup(&mut st).await;
        Ok(())
    }

    /// Enqueues a job on the given machine and marks the machine ready.
    pub async fn submit_job(&self, machine_id: &str, job: Job) -> Result<()> {
        let mut st = self.state.lock().await;
        st.ensure_active()?;

        let machine = st.machine(machine_id)?;
        // May wait for up to one time slice if a sequencer holds the machine.
        machine.submit(job).await?;
        self.ready.offer_distinct(machine);
        self.jobs_received.fetch_add(1, Ordering::Release);

        self.cleanup(&mut st).await;
        Ok(())
    }

    /// Requests cancellation of a queued or running job. Best-effort: the
    /// job's single result reports `Aborted` unless it already resolved.
    pub async fn abort_job(&self, machine_id: &str, job_id: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        st.ensure_active()?;

        let machine = st.machine(machine_id)?;
        machine.abort(job_id, self.results.as_ref()).await?;

        self.cleanup(&mut st).await;
        Ok(())
    }

    /// Destroys a machine. Jobs never run resolve to `MachineTerminated`
    /// results; a full scheduler relaxes back to `Active`.
    pub async fn terminate_machine(&self, machine_id: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        st.ensure_active()?;

        tracing::info!(machine_id, "terminating machine");
        self.terminate_locked(&mut st, machine_id).await?;

        self.cleanup(&mut st).await;
        Ok(())
    }

    /// All bindings of the machine, or only the named subset.
    pub async fn get_bindings(
        &self,
        machine_id: &str,
        names: Option<&[String]>,
    ) -> Result<Bindings> {
        let st = self.state.lock().await;
        st.ensure_active()?;

        let machine = st.machine(machine_id)?;
        Ok(machine.get_bindings(names).await)
    }

    /// Merge-updates the machine's bindings with the given pairs.
    pub async fn set_bindings(&self, machine_id: &str, bindings: Bindings) -> Result<()> {
        let st = self.state.lock().await;
        st.ensure_active()?;

        let machine = st.machine(machine_id)?;
        machine.set_bindings(bindings).await;
        Ok(())
    }

    /// Status of a queued or running job. Completed and aborted jobs are not
    /// retained: querying one yields `JobNotFound`.
    pub async fn job_status(&self, machine_id: &str, job_id: &str) -> Result<JobStatus> {
        let st = self.state.lock().await;
        st.ensure_active()?;

        let machine = st.machine(machine_id)?;
        machine.job_status(job_id)
    }

    /// Never fails: a machine is either registered or not found.
    pub async fn machine_status(&self, machine_id: &str) -> MachineStatus {
        let st = self.state.lock().await;
        if st.machines.contains_key(machine_id) {
            MachineStatus::Active
        } else {
            MachineStatus::NotFound
        }
    }

    pub async fn status(&self) -> FarmStatus {
        self.state.lock().await.status
    }

    pub async fn machine_count(&self) -> usize {
        self.state.lock().await.machines.len()
    }

    /// Jobs accepted by `submit_job` so far.
    pub fn jobs_received(&self) -> u64 {
        self.jobs_received.load(Ordering::Acquire)
    }

    /// Jobs whose single result has been fully delivered to the result sink.
    pub fn jobs_completed(&self) -> u64 {
        self.results.completed()
    }

    /// Shuts the farm down: every sequencer exits its pull loop, every
    /// registered machine is terminated (pending jobs resolve to
    /// `MachineTerminated` results), and every later administrative call
    /// fails with `SchedulerTerminated`.
    pub async fn shutdown(&self) {
        let mut st = self.state.lock().await;
        if st.status == FarmStatus::Inactive {
            return;
        }
        tracing::info!("shutting down scheduler");

        self.ready.clear();
        // One sentinel per sequencer; a sentinel cannot be deduplicated away.
        for _ in 0..self.sequencers {
            self.ready.offer_shutdown();
        }

        let machines: Vec<(String, Arc<Machine>)> = st.machines.drain().collect();
        for (machine_id, machine) in machines {
            machine.terminate(self.results.as_ref()).await;
            self.events
                .machine_status_changed(&machine_id, MachineStatus::NotFound);
        }

        // Each sequencer exits once it consumes its sentinel; confirm that
        // rather than leaving the tasks detached.
        let handles: Vec<JoinHandle<()>> = self
            .sequencer_handles
            .lock()
            .expect("sequencer handle lock poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            if handle.await.is_err() {
                tracing::warn!("sequencer task panicked");
            }
        }

        self.set_status(&mut st, FarmStatus::Inactive);
    }

    /// Blocks until every job received has produced its result.
    ///
    /// Busy-polls on `wait_poll_interval`, taking the administrative lock only
    /// around the comparison. There is no cancellation: a job that never
    /// finishes stalls this call forever. Callers needing a bounded wait must
    /// wrap it in a timeout.
    pub async fn wait_until_finished(&self) {
        loop {
            {
                let _st = self.state.lock().await;
                if self.results.completed() >= self.jobs_received.load(Ordering::Acquire) {
                    return;
                }
            }
            tokio::time::sleep(self.config.wait_poll_interval).await;
        }
    }

    async fn terminate_locked(&self, st: &mut SchedulerState, machine_id: &str) -> Result<()> {
        let machine = st
            .machines
            .remove(machine_id)
            .ok_or_else(|| FarmError::MachineNotFound(machine_id.to_string()))?;
        self.ready.remove(machine_id);

        machine.terminate(self.results.as_ref()).await;
        self.events
            .machine_status_changed(machine_id, MachineStatus::NotFound);

        if st.machines.len() < self.config.max_machines && st.status != FarmStatus::Active {
            self.set_status(st, FarmStatus::Active);
        }
        Ok(())
    }

    /// Lazy idle eviction: gated by the cleanup interval, disabled entirely by
    /// a negative time-to-live.
    async fn cleanup(&self, st: &mut SchedulerState) {
        if self.config.machine_time_to_live_ms < 0 {
            return;
        }
        let now = Instant::now();
        if now.duration_since(st.last_cleanup) < self.config.cleanup_interval {
            return;
        }

        let ttl = Duration::from_millis(self.config.machine_time_to_live_ms as u64);
        let expired: Vec<String> = st
            .machines
            .iter()
            .filter(|(_, machine)| machine.is_idle(ttl))
            .map(|(id, _)| id.clone())
            .collect();

        for machine_id in expired {
            tracing::info!(machine_id = %machine_id, "evicting idle machine");
            // A not-found race means the machine was terminated explicitly.
            if let Err(FarmError::MachineNotFound(_)) =
                self.terminate_locked(st, &machine_id).await
            {
                tracing::warn!(machine_id = %machine_id, "idle machine already terminated");
            }
        }

        st.last_cleanup = now;
    }

    fn set_status(&self, st: &mut SchedulerState, status: FarmStatus) {
        st.status = status;
        tracing::debug!(status = %status, "scheduler status changed");
        self.events.scheduler_status_changed(status);
    }
}
