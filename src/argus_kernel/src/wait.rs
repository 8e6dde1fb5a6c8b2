//! The blocking protocol shared by every primitive that can suspend a
//! caller: semaphore, mutex, queue, channel (§5 "Blocking protocol").

use argus_core::{Port, Status, Timeout};

use crate::klock::CpuLockGuard;
use crate::list::{Adapter, IntrusiveList};
use crate::thread::{Thread, ThreadState};
use crate::Kernel;

/// A wait set ordered FIFO (semaphore, queue, channel).
pub(crate) struct FifoWaitAdapter<P: Port>(core::marker::PhantomData<P>);
impl<P: Port> Adapter for FifoWaitAdapter<P> {
    type Node = Thread<P>;
    fn link(node: &Thread<P>) -> &crate::list::Link<Thread<P>> {
        &node.wait_link
    }
}

/// A wait set ordered by descending priority (mutex).
pub(crate) struct PriorityWaitAdapter<P: Port>(core::marker::PhantomData<P>);
impl<P: Port> Adapter for PriorityWaitAdapter<P> {
    type Node = Thread<P>;
    fn link(node: &Thread<P>) -> &crate::list::Link<Thread<P>> {
        &node.wait_link
    }
}

impl<P: Port> Kernel<P> {
    /// Block the current thread on `wait_set` with the given timeout,
    /// release the lock, and run the scheduler; returns the thread's
    /// unblock-status once woken (§5).
    ///
    /// `sorted_by_priority` selects FIFO append (semaphore/queue/channel) vs
    /// priority-descending insertion (mutex).
    pub(crate) fn block_current<A>(
        &'static self,
        guard: CpuLockGuard<'_, P>,
        wait_set: &'static IntrusiveList<A>,
        timeout: Timeout,
        sorted_by_priority: bool,
    ) -> Status
    where
        A: Adapter<Node = Thread<P>>,
    {
        let me = self.current_thread().expect("block from non-thread context");

        self.ready.remove(me);
        me.state.set(ThreadState::Blocked);
        me.unblock_status.set(Status::Success);

        if sorted_by_priority {
            wait_set.insert_sorted(me, |t| t.priority().get(), true);
        } else {
            wait_set.push_back(me);
        }
        me.wait_set.set(Some(wait_set));

        if let Timeout::Millis(ms) = timeout {
            let ticks = argus_core::ms_to_ticks(ms, self.ms_per_tick.get());
            let wakeup = self.tick.get().wrapping_add(ticks);
            me.wakeup.set(wakeup);
            self.sleeping.insert_sorted(me, |t| t.wakeup.get(), false);
        }

        self.request_reschedule();
        self.dispatch_if_needed(guard);

        me.unblock_status.get()
    }

    /// Wake one waiter off `wait_set`, set its unblock-status, and move it to
    /// ready. Returns the woken thread so callers that need its identity
    /// (queue/channel rendezvous, mutex ownership transfer) can use it.
    /// Requests a reschedule if the woken thread outranks `current`.
    pub(crate) fn wake_one<A>(
        &'static self,
        wait_set: &IntrusiveList<A>,
        status: Status,
    ) -> Option<&'static Thread<P>>
    where
        A: Adapter<Node = Thread<P>>,
    {
        let woken = wait_set.pop_front()?;
        self.finish_wake(woken, status);
        Some(woken)
    }

    /// Wake every waiter on `wait_set` with `status` (used by `delete`).
    pub(crate) fn wake_all<A>(&'static self, wait_set: &IntrusiveList<A>, status: Status)
    where
        A: Adapter<Node = Thread<P>>,
    {
        while let Some(woken) = wait_set.pop_front() {
            self.finish_wake(woken, status);
        }
    }

    /// Finish waking a thread that has already been unlinked from its wait
    /// list by the caller (direct hand-offs in the mutex/queue/channel
    /// rendezvous paths pop a waiter before they know the hand-off will
    /// succeed, so they call this instead of [`Kernel::wake_one`]).
    pub(crate) fn finish_wake(&'static self, woken: &'static Thread<P>, status: Status) {
        // A finite-timeout waiter sits on the sleeping set via `sched_link`
        // at the same time as the object's `wait_link`; drop it there too so
        // the tick handler does not see it again.
        if woken.state() == ThreadState::Blocked && woken.sched_link.is_linked() {
            self.sleeping.remove(woken);
        }
        woken.wait_set.set(None);
        woken.unblock_status.set(status);
        woken.state.set(ThreadState::Ready);
        self.ready.insert_ready(woken);

        let current_prio = self.current_thread().map(|t| t.priority().get()).unwrap_or(0);
        if woken.priority().get() > current_prio {
            self.request_reschedule();
        }
    }
}
