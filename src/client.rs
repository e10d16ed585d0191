//! In-process request/response seam for remote callers.
//!
//! The wire transport proper lives outside this crate; this module is the
//! boundary it plugs into. Requests are correlated by a fresh request id,
//! carried over a bounded channel to a dispatcher task, and answered through
//! a per-request oneshot. [`FarmClient`] is the caller's half.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bindings::Bindings;
use crate::error::{FarmError, Result};
use crate::job::{Job, JobStatus};
use crate::scheduler::{MachineStatus, Scheduler};

const REQUEST_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum FarmRequest {
    SpawnMachine {
        machine_id: String,
        language: String,
    },
    SubmitJob {
        machine_id: String,
        job: Job,
    },
    PingJob {
        machine_id: String,
        job_id: String,
    },
    AbortJob {
        machine_id: String,
        job_id: String,
    },
    GetBindings {
        machine_id: String,
        names: Option<Vec<String>>,
    },
    SetBindings {
        machine_id: String,
        bindings: Bindings,
    },
    TerminateMachine {
        machine_id: String,
    },
    PingMachine {
        machine_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FarmResponse {
    MachineSpawned,
    JobSubmitted,
    JobStatus(JobStatus),
    JobAborted,
    Bindings(Bindings),
    BindingsSet,
    MachineTerminated,
    MachineStatus(MachineStatus),
}

struct Envelope {
    request_id: Uuid,
    request: FarmRequest,
    reply: oneshot::Sender<Result<FarmResponse>>,
}

/// Handle for issuing requests against a served scheduler.
#[derive(Clone)]
pub struct FarmClient {
    tx: mpsc::Sender<Envelope>,
}

impl FarmClient {
    pub async fn request(&self, request: FarmRequest) -> Result<FarmResponse> {
        let (reply, rx) = oneshot::channel();
        let envelope = Envelope {
            request_id: Uuid::new_v4(),
            request,
            reply,
        };
        self.tx
            .send(envelope)
            .await
            .map_err(|_| FarmError::TransportClosed)?;
        rx.await.map_err(|_| FarmError::TransportClosed)?
    }
}

/// Spawns the dispatcher task translating requests into scheduler calls.
/// The task exits when the token is cancelled or every client is dropped.
pub fn serve(
    scheduler: Arc<Scheduler>,
    shutdown: CancellationToken,
) -> (FarmClient, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Envelope>(REQUEST_CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("farm dispatcher stopped");
                    break;
                }
                envelope = rx.recv() => {
                    let Some(Envelope { request_id, request, reply }) = envelope else {
                        break;
                    };
                    tracing::debug!(request_id = %request_id, "dispatching farm request");
                    let response = dispatch(&scheduler, request).await;
                    // The caller may have timed out and dropped its receiver.
                    let _ = reply.send(response);
                }
            }
        }
    });

    (FarmClient { tx }, handle)
}

async fn dispatch(scheduler: &Scheduler, request: FarmRequest) -> Result<FarmResponse> {
    match request {
        FarmRequest::SpawnMachine {
            machine_id,
            language,
        } => {
            scheduler.spawn_machine(&machine_id, &language).await?;
            Ok(FarmResponse::MachineSpawned)
        }
        FarmRequest::SubmitJob { machine_id, job } => {
            scheduler.submit_job(&machine_id, job).await?;
            Ok(FarmResponse::JobSubmitted)
        }
        FarmRequest::PingJob { machine_id, job_id } => {
            let status = scheduler.job_status(&machine_id, &job_id).await?;
            Ok(FarmResponse::JobStatus(status))
        }
        FarmRequest::AbortJob { machine_id, job_id } => {
            scheduler.abort_job(&machine_id, &job_id).await?;
            Ok(FarmResponse::JobAborted)
        }
        FarmRequest::GetBindings { machine_id, names } => {
            let bindings = scheduler
                .get_bindings(&machine_id, names.as_deref())
                .await?;
            Ok(FarmResponse::Bindings(bindings))
        }
        FarmRequest::SetBindings {
            machine_id,
            bindings,
        } => {
            scheduler.set_bindings(&machine_id, bindings).await?;
            Ok(FarmResponse::BindingsSet)
        }
        FarmRequest::TerminateMachine { machine_id } => {
            scheduler.terminate_machine(&machine_id).await?;
            Ok(FarmResponse::MachineTerminated)
        }
        FarmRequest::PingMachine { machine_id } => {
            let status = scheduler.machine_status(&machine_id).await;
            Ok(FarmResponse::MachineStatus(status))
        }
    }
}
