//! In-process substrates.
//!
//! These implement every substrate trait without a platform underneath:
//! windows, sessions and peripherals live in shared memory and deliver
//! messages over unbounded queues. Test hooks (`close`, `deliver`,
//! `simulate_link_loss`, `fail_writes`) let callers provoke the failure
//! modes real platforms produce.

mod bluetooth;
mod presentation;
mod window;

pub use bluetooth::{MemoryBluetooth, MemoryPeripheral};
pub use presentation::{MemoryPresentation, MemoryPresentationService, MemorySession};
pub use window::{MemoryBrowser, MemoryWindow, MemoryWindowHandle};

use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A set of event listeners. Listeners whose receiver was dropped are pruned
/// on the next broadcast.
pub(crate) struct Listeners<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.senders).push(tx);
        rx
    }

    /// Deliver `event` to every live listener and return how many received it.
    pub(crate) fn broadcast(&self, event: T) -> usize {
        let mut senders = lock(&self.senders);
        senders.retain(|tx| tx.send(event.clone()).is_ok());
        senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_listeners_are_pruned() {
        let listeners = Listeners::new();
        let mut kept = listeners.subscribe();
        let dropped = listeners.subscribe();
        drop(dropped);

        assert_eq!(listeners.broadcast(7u32), 1);
        assert_eq!(kept.try_recv().ok(), Some(7));
    }
}
