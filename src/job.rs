use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::EvalError;

/// Status of a job still known to its machine. Completed and aborted jobs are
/// not retained; querying one yields `JobNotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
        }
    }
}

/// A unit of work: an expression queued against exactly one machine, under a
/// caller-assigned id that is unique per machine while the job is pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub expression: String,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            expression: expression.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// The engine evaluated the expression to a value.
    Value(Value),
    /// The engine failed to evaluate the expression.
    EvaluationFailed(EvalError),
    /// The job was aborted before or during evaluation.
    Aborted,
    /// The owning machine was terminated before the job ran.
    MachineTerminated,
}

/// The result of a job, delivered to the result sink exactly once per job
/// that ever entered a machine's queue, including aborted and orphaned ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub machine_id: String,
    pub job_id: String,
    pub outcome: JobOutcome,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    pub(crate) fn new(
        machine_id: impl Into<String>,
        job_id: impl Into<String>,
        outcome: JobOutcome,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            job_id: job_id.into(),
            outcome,
            completed_at: Utc::now(),
        }
    }

    /// The evaluated value, if the job completed successfully.
    pub fn value(&self) -> Option<&Value> {
        match &self.outcome {
            JobOutcome::Value(v) => Some(v),
            _ => None,
        }
    }
}
