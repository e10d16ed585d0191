//! Sequencers: the fixed pool of tasks draining the ready queue.
//!
//! Each sequencer loops: pull the next machine, let it execute for one time
//! slice, and re-offer it if work remains. Pulling a shutdown sentinel ends
//! the loop. Fairness across machines falls out of the ready queue's
//! deduplicated FIFO order, not out of anything a sequencer does.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::events::ResultCounter;
use crate::ready_queue::{ReadyQueue, Slot};

pub(crate) fn spawn(
    index: usize,
    ready: Arc<ReadyQueue>,
    results: Arc<ResultCounter>,
    time_slice: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(sequencer = index, "sequencer started");
        loop {
            match ready.take().await {
                Slot::Shutdown => {
                    tracing::debug!(sequencer = index, "sequencer stopped");
                    break;
                }
                Slot::Machine(machine) => {
                    let more = machine.work(time_slice, &results).await;
                    if more {
                        ready.offer_distinct(machine);
                    }
                }
            }
        }
    })
}
