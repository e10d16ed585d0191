//! Synchronous convenience wrappers over the request/response seam.
//!
//! Remote interaction is asynchronous by design, but many callers would
//! rather wait for a command to complete than juggle completion handlers.
//! Each wrapper here issues one request and waits on its reply, bounded by a
//! caller-supplied timeout in milliseconds; a non-positive timeout waits
//! indefinitely. An elapsed budget surfaces as [`FarmError::Timeout`], which
//! is distinct from any failure the farm itself reported: it means no answer
//! arrived in time, not that the operation failed.

use std::time::Duration;

use crate::bindings::Bindings;
use crate::client::{FarmClient, FarmRequest, FarmResponse};
use crate::error::{FarmError, Result};
use crate::job::{Job, JobStatus};
use crate::scheduler::MachineStatus;

pub struct SyncClient {
    inner: FarmClient,
}

impl SyncClient {
    pub fn new(inner: FarmClient) -> Self {
        Self { inner }
    }

    pub async fn spawn_machine(
        &self,
        machine_id: &str,
        language: &str,
        timeout_ms: i64,
    ) -> Result<()> {
        let request = FarmRequest::SpawnMachine {
            machine_id: machine_id.to_string(),
            language: language.to_string(),
        };
        match self.call("spawn_machine", request, timeout_ms).await? {
            FarmResponse::MachineSpawned => Ok(()),
            _ => Err(FarmError::UnexpectedResponse {
                operation: "spawn_machine",
            }),
        }
    }

    pub async fn submit_job(&self, machine_id: &str, job: Job, timeout_ms: i64) -> Result<()> {
        let request = FarmRequest::SubmitJob {
            machine_id: machine_id.to_string(),
            job,
        };
        match self.call("submit_job", request, timeout_ms).await? {
            FarmResponse::JobSubmitted => Ok(()),
            _ => Err(FarmError::UnexpectedResponse {
                operation: "submit_job",
            }),
        }
    }

    pub async fn ping_job(
        &self,
        machine_id: &str,
        job_id: &str,
        timeout_ms: i64,
    ) -> Result<JobStatus> {
        let request = FarmRequest::PingJob {
            machine_id: machine_id.to_string(),
            job_id: job_id.to_string(),
        };
        match self.call("ping_job", request, timeout_ms).await? {
            FarmResponse::JobStatus(status) => Ok(status),
            _ => Err(FarmError::UnexpectedResponse {
                operation: "ping_job",
            }),
        }
    }

    pub async fn abort_job(&self, machine_id: &str, job_id: &str, timeout_ms: i64) -> Result<()> {
        let request = FarmRequest::AbortJob {
            machine_id: machine_id.to_string(),
            job_id: job_id.to_string(),
        };
        match self.call("abort_job", request, timeout_ms).await? {
            FarmResponse::JobAborted => Ok(()),
            _ => Err(FarmError::UnexpectedResponse {
                operation: "abort_job",
            }),
        }
    }

    pub async fn get_bindings(
        &self,
        machine_id: &str,
        names: Option<Vec<String>>,
        timeout_ms: i64,
    ) -> Result<Bindings> {
        let request = FarmRequest::GetBindings {
            machine_id: machine_id.to_string(),
            names,
        };
        match self.call("get_bindings", request, timeout_ms).await? {
            FarmResponse::Bindings(bindings) => Ok(bindings),
            _ => Err(FarmError::UnexpectedResponse {
                operation: "get_bindings",
            }),
        }
    }

    pub async fn set_bindings(
        &self,
        machine_id: &str,
        bindings: Bindings,
        timeout_ms: i64,
    ) -> Result<()> {
        let request = FarmRequest::SetBindings {
            machine_id: machine_id.to_string(),
            bindings,
        };
        match self.call("set_bindings", request, timeout_ms).await? {
            FarmResponse::BindingsSet => Ok(()),
            _ => Err(FarmError::UnexpectedResponse {
                operation: "set_bindings",
            }),
        }
    }

    pub async fn terminate_machine(&self, machine_id: &str, timeout_ms: i64) -> Result<()> {
        let request = FarmRequest::TerminateMachine {
            machine_id: machine_id.to_string(),
        };
        match self.call("terminate_machine", request, timeout_ms).await? {
            FarmResponse::MachineTerminated => Ok(()),
            _ => Err(FarmError::UnexpectedResponse {
                operation: "terminate_machine",
            }),
        }
    }

    pub async fn ping_machine(&self, machine_id: &str, timeout_ms: i64) -> Result<MachineStatus> {
        let request = FarmRequest::PingMachine {
            machine_id: machine_id.to_string(),
        };
        match self.call("ping_machine", request, timeout_ms).await? {
            FarmResponse::MachineStatus(status) => Ok(status),
            _ => Err(FarmError::UnexpectedResponse {
                operation: "ping_machine",
            }),
        }
    }

    async fn call(
        &self,
        operation: &'static str,
        request: FarmRequest,
        timeout_ms: i64,
    ) -> Result<FarmResponse> {
        if timeout_ms > 0 {
            let budget = Duration::from_millis(timeout_ms as u64);
            match tokio::time::timeout(budget, self.inner.request(request)).await {
                Ok(result) => result,
                Err(_) => Err(FarmError::Timeout {
                    operation,
                    waited_ms: timeout_ms as u64,
                }),
            }
        } else {
            self.inner.request(request).await
        }
    }
}
