use thiserror::Error;

#[derive(Error, Debug)]
pub enum FarmError {
    #[error("Machine not found: {0}")]
    MachineNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job already exists on machine {machine_id}: {job_id}")]
    JobAlreadyExists { machine_id: String, job_id: String },

    #[error("Machine already exists: {0}")]
    MachineAlreadyExists(String),

    #[error("Job queue is full on machine: {0}")]
    MachineQueueFull(String),

    #[error("Scheduler is at machine capacity")]
    SchedulerFull,

    #[error("Unsupported engine language: {0}")]
    UnsupportedEngine(String),

    #[error("Machine id must be non-empty")]
    InvalidMachineId,

    #[error("{operation} timed out after {waited_ms}ms")]
    Timeout {
        operation: &'static str,
        waited_ms: u64,
    },

    #[error("Scheduler has been terminated")]
    SchedulerTerminated,

    #[error("Farm transport closed")]
    TransportClosed,

    #[error("Unexpected response for {operation}")]
    UnexpectedResponse { operation: &'static str },
}

pub type Result<T> = std::result::Result<T, FarmError>;
