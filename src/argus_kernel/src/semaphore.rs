//! Counting semaphore (§4.2).

use core::cell::Cell;

use argus_core::{Named, Port, Result, Status, Timeout};

use crate::list::IntrusiveList;
use crate::wait::FifoWaitAdapter;
use crate::Kernel;

/// A counting semaphore. Caller-owned, `'static` storage, built with
/// [`Semaphore::new`].
pub struct Semaphore<P: Port> {
    name: &'static str,
    count: Cell<u32>,
    waiters: IntrusiveList<FifoWaitAdapter<P>>,
    deleted: Cell<bool>,
    #[cfg(feature = "created_registry")]
    registered: Cell<bool>,
}

impl<P: Port> Semaphore<P> {
    pub const fn new(name: &'static str, initial_count: u32) -> Self {
        Self {
            name,
            count: Cell::new(initial_count),
            waiters: IntrusiveList::new(),
            deleted: Cell::new(false),
            #[cfg(feature = "created_registry")]
            registered: Cell::new(false),
        }
    }

    pub fn get_count(&self) -> u32 {
        self.count.get()
    }
}

impl<P: Port> Named for Semaphore<P> {
    fn name(&self) -> &str {
        self.name
    }
}

unsafe impl<P: Port> Sync for Semaphore<P> {}

impl<P: Port> Kernel<P> {
    /// Acquire `sem`, blocking up to `timeout` if its count is currently
    /// zero (§4.2 "get").
    pub fn semaphore_get(&'static self, sem: &'static Semaphore<P>, timeout: Timeout) -> Result<()> {
        #[cfg(feature = "created_registry")]
        crate::debug::ensure_registered(&self.registry.semaphores, &sem.registered, sem);
        let guard = self.lock();
        if sem.count.get() > 0 {
            sem.count.set(sem.count.get() - 1);
            drop(guard);
            return Ok(());
        }
        if timeout.is_no_wait() {
            drop(guard);
            return Err(Status::Timeout);
        }
        if self.in_interrupt() {
            drop(guard);
            return Err(Status::NotFromInterrupt);
        }
        let status = self.block_current(guard, &sem.waiters, timeout, false);
        status.into_result()
    }

    /// Release `sem`: wake a waiter if any, else increment the count.
    /// Interrupt-safe (§4.2 "put").
    pub fn semaphore_put(&'static self, sem: &'static Semaphore<P>) {
        #[cfg(feature = "created_registry")]
        crate::debug::ensure_registered(&self.registry.semaphores, &sem.registered, sem);
        let guard = self.lock();
        self.semaphore_put_locked(sem);
        self.dispatch_if_needed(guard);
    }

    /// The body of `put`, usable by callers (e.g. the run-loop notification
    /// path) that already hold the kernel lock and must not trigger a
    /// dispatch until their own, outer critical section ends.
    pub(crate) fn semaphore_put_locked(&'static self, sem: &'static Semaphore<P>) {
        if self.wake_one(&sem.waiters, Status::Success).is_none() {
            sem.count.set(sem.count.get() + 1);
        }
    }

    /// Unblock every waiter on `sem` with `ObjectDeleted` (§4.2 "delete").
    pub fn semaphore_delete(&'static self, sem: &'static Semaphore<P>) {
        let guard = self.lock();
        sem.deleted.set(true);
        if !sem.waiters.is_empty() {
            log::warn!("semaphore {} deleted with waiters still blocked on it", sem.name());
        }
        self.wake_all(&sem.waiters, Status::ObjectDeleted);
        self.dispatch_if_needed(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakePort;
    use quickcheck_macros::quickcheck;

    // Sum of puts minus gets on a never-deleted semaphore equals the current
    // count minus the initial count (§8 "Invariants"). Every put/get below is
    // non-blocking: a `get` against a zero count with `Timeout::NoWait` just
    // fails rather than parking, so no current thread is needed.
    #[quickcheck]
    fn count_tracks_puts_minus_gets(initial: u8, puts: u8, gets: u8) -> bool {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let sem: &'static Semaphore<FakePort> = Box::leak(Box::new(Semaphore::new("s", initial as u32)));

        for _ in 0..puts {
            kernel.semaphore_put(sem);
        }
        let mut successful_gets = 0i64;
        for _ in 0..gets {
            if kernel.semaphore_get(sem, Timeout::NoWait).is_ok() {
                successful_gets += 1;
            }
        }
        let expected = initial as i64 + puts as i64 - successful_gets;
        sem.get_count() as i64 == expected
    }

    #[test]
    fn get_with_no_wait_on_zero_count_fails_without_blocking() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let sem: &'static Semaphore<FakePort> = Box::leak(Box::new(Semaphore::new("s", 0)));
        // Would panic on `current_thread().expect(..)` inside `block_current`
        // if this ever took the blocking path.
        assert_eq!(kernel.semaphore_get(sem, Timeout::NoWait), Err(Status::Timeout));
        assert_eq!(sem.get_count(), 0);
    }
}
