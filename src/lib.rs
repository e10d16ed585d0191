//! script-farm: a shared compute farm for lightweight script machines.
//!
//! Clients spawn named "machines" (sandboxed script-execution contexts),
//! submit jobs (expressions) to them, and retrieve results. A fixed pool of
//! sequencer tasks drains a fair, deduplicated ready queue, giving every
//! machine at most one time slice of attention per round regardless of how
//! many jobs it has pending. Idle machines are evicted lazily; every job that
//! ever entered a queue resolves to exactly one result, which is what makes
//! `wait_until_finished` sound.
//!
//! The remote wire transport and the script engines themselves live outside
//! this crate; see [`client`] and [`engine`] for the seams they plug into.

pub mod bindings;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod job;
pub mod machine;
pub mod ready_queue;
pub mod scheduler;
mod sequencer;
pub mod sync;

pub use error::{FarmError, Result};
