use std::time::Duration;

/// Configuration for a scheduler instance.
///
/// All knobs are fixed at construction. The defaults are sized for a small
/// shared farm; tests typically shrink the intervals.
#[derive(Debug, Clone)]
pub struct FarmConfig {
    /// Maximum number of concurrently registered machines.
    pub max_machines: usize,

    /// Idle time-to-live for a machine, in milliseconds.
    /// A negative value disables idle eviction entirely.
    pub machine_time_to_live_ms: i64,

    /// Minimum gap between two idle-eviction scans. Cleanup is lazy: it only
    /// runs at the tail of administrative calls, never on a timer.
    pub cleanup_interval: Duration,

    /// Number of sequencer tasks draining the ready queue.
    pub sequencers: usize,

    /// Round-robin quantum: how long one sequencer may spend on one machine
    /// before yielding it back to the ready queue.
    pub time_slice: Duration,

    /// Per-machine bound on queued jobs.
    pub job_queue_capacity: usize,

    /// Polling interval used by `wait_until_finished`.
    pub wait_poll_interval: Duration,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            max_machines: 16,
            machine_time_to_live_ms: 300_000,
            cleanup_interval: Duration::from_secs(30),
            sequencers: 4,
            time_slice: Duration::from_millis(50),
            job_queue_capacity: 1024,
            wait_poll_interval: Duration::from_millis(100),
        }
    }
}

impl FarmConfig {
    pub fn with_max_machines(mut self, max_machines: usize) -> Self {
        self.max_machines = max_machines;
        self
    }

    pub fn with_machine_time_to_live_ms(mut self, ttl_ms: i64) -> Self {
        self.machine_time_to_live_ms = ttl_ms;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_sequencers(mut self, sequencers: usize) -> Self {
        self.sequencers = sequencers;
        self
    }

    pub fn with_time_slice(mut self, time_slice: Duration) -> Self {
        self.time_slice = time_slice;
        self
    }

    pub fn with_job_queue_capacity(mut self, capacity: usize) -> Self {
        self.job_queue_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn farm_config_default() {
        let cfg = FarmConfig::default();
        assert_eq!(cfg.max_machines, 16);
        assert_eq!(cfg.machine_time_to_live_ms, 300_000);
        assert_eq!(cfg.cleanup_interval, Duration::from_secs(30));
        assert_eq!(cfg.sequencers, 4);
        assert_eq!(cfg.time_slice, Duration::from_millis(50));
        assert_eq!(cfg.job_queue_capacity, 1024);
        assert_eq!(cfg.wait_poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn farm_config_builders() {
        let cfg = FarmConfig::default()
            .with_max_machines(1)
            .with_machine_time_to_live_ms(-1)
            .with_cleanup_interval(Duration::from_millis(10))
            .with_sequencers(2)
            .with_time_slice(Duration::from_millis(5))
            .with_job_queue_capacity(8);
        assert_eq!(cfg.max_machines, 1);
        assert_eq!(cfg.machine_time_to_live_ms, -1);
        assert_eq!(cfg.cleanup_interval, Duration::from_millis(10));
        assert_eq!(cfg.sequencers, 2);
        assert_eq!(cfg.time_slice, Duration::from_millis(5));
        assert_eq!(cfg.job_queue_capacity, 8);
    }

    #[test]
    fn negative_ttl_means_no_eviction() {
        let cfg = FarmConfig::default().with_machine_time_to_live_ms(-1);
        assert!(cfg.machine_time_to_live_ms < 0);
    }
}
