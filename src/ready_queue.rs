//! The fair, deduplicated FIFO of machines with pending work.
//!
//! Sequencers block on [`ReadyQueue::take`]; administrative code offers
//! machines with [`ReadyQueue::offer_distinct`]. A machine already present is
//! not inserted twice: a client hammering one machine cannot buy it more than
//! one slot of sequencer attention. Shutdown sentinels bypass deduplication
//! so each sequencer can be told to exit exactly once.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::machine::Machine;

/// One entry pulled from the queue: a machine to execute, or the signal for
/// the pulling sequencer to exit.
pub enum Slot {
    Machine(Arc<Machine>),
    Shutdown,
}

#[derive(Default)]
struct Inner {
    slots: VecDeque<Slot>,
    queued: HashSet<String>,
}

pub struct ReadyQueue {
    inner: Mutex<Inner>,
    available: Semaphore,
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            available: Semaphore::new(0),
        }
    }

    /// Appends the machine unless it is already queued.
    /// Returns whether the machine was inserted.
    pub fn offer_distinct(&self, machine: Arc<Machine>) -> bool {
        {
            let mut inner = self.lock();
            if !inner.queued.insert(machine.id().to_string()) {
                return false;
            }
            inner.slots.push_back(Slot::Machine(machine));
        }
        self.available.add_permits(1);
        true
    }

    /// Appends one shutdown sentinel.
    pub fn offer_shutdown(&self) {
        self.lock().slots.push_back(Slot::Shutdown);
        self.available.add_permits(1);
    }

    /// Removes and returns the head entry, waiting while the queue is empty.
    pub async fn take(&self) -> Slot {
        loop {
            // The semaphore is never closed.
            let permit = self
                .available
                .acquire()
                .await
                .expect("ready queue semaphore closed");
            permit.forget();

            let mut inner = self.lock();
            if let Some(slot) = inner.slots.pop_front() {
                if let Slot::Machine(machine) = &slot {
                    inner.queued.remove(machine.id());
                }
                return slot;
            }
            // An entry was removed out from under this permit; wait again.
        }
    }

    /// Removes the machine with the given id, if queued.
    pub fn remove(&self, machine_id: &str) {
        let mut inner = self.lock();
        if inner.queued.remove(machine_id) {
            inner
                .slots
                .retain(|slot| !matches!(slot, Slot::Machine(m) if m.id() == machine_id));
        }
    }

    /// Drops every queued entry, sentinels included.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.slots.clear();
        inner.queued.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("ready queue lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::calc::CalcEngine;

    fn machine(id: &str) -> Arc<Machine> {
        Arc::new(Machine::new(id.to_string(), Box::new(CalcEngine), 16))
    }

    #[tokio::test]
    async fn take_returns_fifo_order() {
        let queue = ReadyQueue::new();
        queue.offer_distinct(machine("a"));
        queue.offer_distinct(machine("b"));

        match queue.take().await {
            Slot::Machine(m) => assert_eq!(m.id(), "a"),
            Slot::Shutdown => panic!("unexpected sentinel"),
        }
        match queue.take().await {
            Slot::Machine(m) => assert_eq!(m.id(), "b"),
            Slot::Shutdown => panic!("unexpected sentinel"),
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn offer_is_deduplicated() {
        let queue = ReadyQueue::new();
        let m = machine("a");
        assert!(queue.offer_distinct(m.clone()));
        assert!(!queue.offer_distinct(m.clone()));
        assert_eq!(queue.len(), 1);

        // Once taken, the machine may be offered again.
        let _ = queue.take().await;
        assert!(queue.offer_distinct(m));
    }

    #[tokio::test]
    async fn sentinels_bypass_dedup() {
        let queue = ReadyQueue::new();
        queue.offer_shutdown();
        queue.offer_shutdown();
        assert_eq!(queue.len(), 2);
        assert!(matches!(queue.take().await, Slot::Shutdown));
        assert!(matches!(queue.take().await, Slot::Shutdown));
    }

    #[tokio::test]
    async fn remove_skips_removed_machine() {
        let queue = ReadyQueue::new();
        queue.offer_distinct(machine("a"));
        queue.offer_distinct(machine("b"));
        queue.remove("a");

        match queue.take().await {
            Slot::Machine(m) => assert_eq!(m.id(), "b"),
            Slot::Shutdown => panic!("unexpected sentinel"),
        }
    }

    #[tokio::test]
    async fn take_blocks_until_offer() {
        let queue = Arc::new(ReadyQueue::new());
        let taker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.take().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!taker.is_finished());

        queue.offer_distinct(machine("a"));
        match taker.await.unwrap() {
            Slot::Machine(m) => assert_eq!(m.id(), "a"),
            Slot::Shutdown => panic!("unexpected sentinel"),
        }
    }
}
