//! Bookkeeping shared by the transports.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds a transport's current substrate link.
///
/// Every installed link gets a fresh epoch. Pump tasks tear down by epoch so
/// a late event from a replaced link can never clear its successor.
pub(crate) struct LinkSlot<L> {
    current: Mutex<Option<(u64, L)>>,
    next_epoch: AtomicU64,
}

impl<L> LinkSlot<L> {
    pub(crate) fn new() -> Self {
        Self {
            current: Mutex::new(None),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Store `link`, returning its epoch and any link it replaced.
    pub(crate) fn install(&self, link: L) -> (u64, Option<L>) {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let previous = lock(&self.current).replace((epoch, link));
        (epoch, previous.map(|(_, link)| link))
    }

    pub(crate) fn take(&self) -> Option<L> {
        lock(&self.current).take().map(|(_, link)| link)
    }

    /// Take the link only if it is still the one installed at `epoch`.
    pub(crate) fn take_if(&self, epoch: u64) -> Option<L> {
        let mut current = lock(&self.current);
        match current.as_ref() {
            Some((installed, _)) if *installed == epoch => current.take().map(|(_, link)| link),
            _ => None,
        }
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(Option<&L>) -> R) -> R {
        let current = lock(&self.current);
        f(current.as_ref().map(|(_, link)| link))
    }

    /// Modify the link in place if it is still the one installed at `epoch`.
    pub(crate) fn update_if(&self, epoch: u64, f: impl FnOnce(&mut L)) -> bool {
        match lock(&self.current).as_mut() {
            Some((installed, link)) if *installed == epoch => {
                f(link);
                true
            }
            _ => false,
        }
    }
}

/// Sets a flag for as long as the guard lives.
pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    pub(crate) fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_epoch_cannot_take_successor() {
        let slot = LinkSlot::new();
        let (first, _) = slot.install("first");
        let (second, replaced) = slot.install("second");
        assert_eq!(replaced, Some("first"));

        assert_eq!(slot.take_if(first), None);
        assert!(!slot.update_if(first, |link| *link = "clobbered"));
        assert!(slot.update_if(second, |_| {}));
        assert_eq!(slot.take_if(second), Some("second"));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn busy_guard_clears_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _busy = BusyGuard::set(&flag);
            assert!(flag.load(Ordering::SeqCst));
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
