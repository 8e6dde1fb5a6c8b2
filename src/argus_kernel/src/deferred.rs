//! Deferred-action queue: operations posted from interrupt context that are
//! too elaborate to run in-ISR, drained under the kernel lock at the
//! outermost interrupt return (§5 "Deferred actions").

use core::cell::Cell;

use argus_core::{Named, Port};

use crate::klock::CpuLockGuard;
use crate::timer::Timer;
use crate::Kernel;

/// Capacity of the deferred-action ring. Sized generously for a
/// single-producer-from-ISR queue; overflow is a programming error (too many
/// interrupt-context timer operations between IRQ returns) and is reported
/// rather than silently dropped, mirroring the run-loop perform-queue's
/// "MUST NOT silently drop" rule (§9).
pub const DEFERRED_QUEUE_CAPACITY: usize = 8;

#[derive(Clone, Copy)]
pub(crate) enum DeferredAction<P: Port> {
    TimerStart(&'static Timer<P>),
    TimerStop(&'static Timer<P>),
}

pub(crate) struct DeferredQueue<P: Port> {
    slots: [Cell<Option<DeferredAction<P>>>; DEFERRED_QUEUE_CAPACITY],
    head: Cell<usize>,
    count: Cell<usize>,
}

impl<P: Port> DeferredQueue<P> {
    pub const fn new() -> Self {
        Self {
            slots: [
                Cell::new(None),
                Cell::new(None),
                Cell::new(None),
                Cell::new(None),
                Cell::new(None),
                Cell::new(None),
                Cell::new(None),
                Cell::new(None),
            ],
            head: Cell::new(0),
            count: Cell::new(0),
        }
    }

    fn push(&self, action: DeferredAction<P>) -> bool {
        if self.count.get() == DEFERRED_QUEUE_CAPACITY {
            return false;
        }
        let tail = (self.head.get() + self.count.get()) % DEFERRED_QUEUE_CAPACITY;
        self.slots[tail].set(Some(action));
        self.count.set(self.count.get() + 1);
        true
    }

    fn pop(&self) -> Option<DeferredAction<P>> {
        if self.count.get() == 0 {
            return None;
        }
        let head = self.head.get();
        let action = self.slots[head].take();
        self.head.set((head + 1) % DEFERRED_QUEUE_CAPACITY);
        self.count.set(self.count.get() - 1);
        action
    }
}

impl<P: Port> Kernel<P> {
    /// Post a deferred action from interrupt context. Returns `false` on
    /// overflow (the caller should log/assert; this is not expected in
    /// normal operation with the default capacity).
    pub(crate) fn post_deferred(&self, action: DeferredAction<P>) -> bool {
        self.deferred.push(action)
    }

    pub(crate) fn drain_deferred(&'static self, guard: CpuLockGuard<'_, P>) {
        while let Some(action) = self.deferred.pop() {
            match action {
                DeferredAction::TimerStart(timer) => {
                    log::trace!("draining deferred timer_start for {}", timer.name());
                    self.timer_start_locked(timer);
                }
                DeferredAction::TimerStop(timer) => {
                    log::trace!("draining deferred timer_stop for {}", timer.name());
                    self.timer_stop_locked(timer);
                }
            }
        }
        self.reschedule_locked(guard);
    }
}
