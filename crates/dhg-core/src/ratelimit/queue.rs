//! FIFO wait queue

use std::collections::VecDeque;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A caller waiting for admission
#[derive(Debug)]
pub(super) struct Waiter {
    pub id: u64,
    pub cost: f64,
    pub enqueued_at: Instant,
    pub grant: oneshot::Sender<()>,
}

/// Pending callers in arrival order
#[derive(Debug, Default)]
pub(super) struct WaitQueue {
    entries: VecDeque<Waiter>,
    next_id: u64,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a caller at the tail, returning its id and completion signal
    pub fn push(&mut self, cost: f64, now: Instant) -> (u64, oneshot::Receiver<()>) {
        let (grant, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(Waiter {
            id,
            cost,
            enqueued_at: now,
            grant,
        });
        (id, rx)
    }

    /// Cost requested by the head of the queue
    pub fn front_cost(&self) -> Option<f64> {
        self.entries.front().map(|w| w.cost)
    }

    pub fn pop_front(&mut self) -> Option<Waiter> {
        self.entries.pop_front()
    }

    /// Remove an entry from any position; the others keep their order
    pub fn remove(&mut self, id: u64) -> Option<Waiter> {
        let index = self.entries.iter().position(|w| w.id == id)?;
        self.entries.remove(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn ids(&self) -> Vec<u64> {
        self.entries.iter().map(|w| w.id).collect()
    }
}
