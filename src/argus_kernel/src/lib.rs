//! A small preemptive real-time microkernel core.
//!
//! [`Kernel<P>`] is the process-wide singleton: it owns the ready,
//! suspended, and sleeping sets, the current-thread pointer, the tick
//! counter, and the deferred-action queue, generic over a single [`Port`]
//! implementation that supplies the CPU/board glue (see `argus_port_std`
//! for a hosted one). Every other primitive in this crate ([`Semaphore`],
//! [`Mutex`], [`Queue`], [`Channel`], [`Timer`], [`RunLoop`]) is built on top
//! of [`Kernel`] and the shared blocking protocol in [`wait`].
#![cfg_attr(not(test), no_std)]

extern crate alloc as _; // silence unused-extern lints on `no_std` builds with allocator features disabled off by default; not otherwise used.

mod channel;
pub mod debug;
mod deferred;
mod klock;
mod list;
mod mutex;
mod queue;
mod runloop;
mod sched;
mod semaphore;
#[cfg(test)]
mod test_support;
mod thread;
mod timer;
mod wait;

pub use channel::Channel;
pub use deferred::DEFERRED_QUEUE_CAPACITY;
pub use mutex::Mutex;
pub use queue::Queue;
pub use runloop::{RunLoop, RunLoopStatus};
pub use sched::MIN_STACK_SIZE;
pub use semaphore::Semaphore;
pub use thread::{Thread, ThreadState};
pub use timer::{Timer, TimerMode};

use core::cell::Cell;

use argus_core::{Port, Ticks};

use crate::deferred::DeferredQueue;
use crate::list::IntrusiveList;
use crate::runloop::RunLoopListAdapter;
use crate::sched::{ReadyAdapter, SleepingAdapter, SuspendedAdapter};

#[cfg(feature = "system_load")]
use crate::debug::LoadCounter;
#[cfg(feature = "created_registry")]
use crate::debug::Registries;

/// The process-wide kernel singleton, generic over the CPU/board [`Port`].
///
/// An application places exactly one `Kernel<P>` in `'static` storage,
/// calls [`Kernel::init`] once with the idle thread's storage, and then
/// drives it from the port's interrupt handlers via [`Kernel::tick_isr`]
/// and [`Kernel::yield_isr`].
pub struct Kernel<P: Port> {
    pub(crate) port: P,
    pub(crate) current: Cell<Option<&'static Thread<P>>>,
    pub(crate) ready: IntrusiveList<ReadyAdapter<P>>,
    pub(crate) suspended: IntrusiveList<SuspendedAdapter<P>>,
    pub(crate) sleeping: IntrusiveList<SleepingAdapter<P>>,
    pub(crate) idle: Cell<Option<&'static Thread<P>>>,
    pub(crate) tick: Cell<Ticks>,
    pub(crate) irq_depth: Cell<u32>,
    pub(crate) reschedule_needed: Cell<bool>,
    pub(crate) running: Cell<bool>,
    pub(crate) ms_per_tick: Cell<u32>,
    pub(crate) deferred: DeferredQueue<P>,
    /// Every run-loop with at least one timer ever started, so the tick
    /// handler can find expired timers without the application tracking a
    /// registry itself (§4.1 step 3).
    pub(crate) run_loops: IntrusiveList<RunLoopListAdapter<P>>,
    #[cfg(feature = "system_load")]
    pub(crate) load: LoadCounter,
    #[cfg(feature = "created_registry")]
    pub(crate) registry: Registries<P>,
}

// Safety: see the matching note on `Thread`; every field is touched only
// while `klock::CpuLockGuard` is held.
unsafe impl<P: Port> Sync for Kernel<P> {}

impl<P: Port> Kernel<P> {
    /// Construct a kernel around a `Port`. Does not yet have an idle thread
    /// or a running thread; call [`Kernel::init`] before starting it.
    pub const fn new(port: P) -> Self {
        Self {
            port,
            current: Cell::new(None),
            ready: IntrusiveList::new(),
            suspended: IntrusiveList::new(),
            sleeping: IntrusiveList::new(),
            idle: Cell::new(None),
            tick: Cell::new(Ticks::ZERO),
            irq_depth: Cell::new(0),
            reschedule_needed: Cell::new(false),
            running: Cell::new(false),
            ms_per_tick: Cell::new(argus_core::DEFAULT_MS_PER_TICK),
            deferred: DeferredQueue::new(),
            run_loops: IntrusiveList::new(),
            #[cfg(feature = "system_load")]
            load: LoadCounter::new(),
            #[cfg(feature = "created_registry")]
            registry: Registries::new(),
        }
    }

    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    /// The thread currently running, if the kernel has been started.
    pub fn current_thread(&self) -> Option<&'static Thread<P>> {
        self.current.get()
    }

    /// Whether the CPU is presently executing interrupt-context code, per
    /// the IRQ-depth counter maintained by [`Kernel::irq_enter`] /
    /// [`Kernel::irq_exit`] (§5).
    pub fn in_interrupt(&self) -> bool {
        self.irq_depth.get() > 0
    }

    /// Initialize the kernel: install the idle thread (priority 0, already
    /// spawned with stack space by the caller via [`Kernel::spawn_thread`])
    /// and start the tick timer. Must be called exactly once, before any
    /// other thread is resumed, from the thread that will become the boot
    /// context.
    pub fn init(&'static self, idle: &'static Thread<P>, ms_per_tick: u32) {
        debug_assert_eq!(idle.priority(), argus_core::Priority::IDLE);
        self.idle.set(Some(idle));
        self.ms_per_tick.set(ms_per_tick);
        self.port.init_system();

        let guard = self.lock();
        idle.state.set(ThreadState::Ready);
        self.ready.push_back(idle);
        drop(guard);

        self.port.init_tick_timer(ms_per_tick);
        self.running.set(true);
        self.start_first_thread();
    }

    /// Called by the port's context-switch exception handler. Runs the
    /// scheduler and transfers control to whichever thread it selects.
    pub fn yield_isr(&'static self) {
        let guard = self.lock();
        self.reschedule_locked(guard);
    }

    /// Called by the port's periodic tick interrupt handler (§4.1 step 4).
    /// Self-contained: wraps its own body in [`Kernel::irq_enter`] /
    /// [`Kernel::irq_exit`], matching the single-call port contract
    /// (`kernel_periodic_timer_isr`, §6).
    pub fn tick_isr(&'static self) {
        self.irq_enter();
        let guard = self.lock();
        let now = self.tick.get().wrapping_add(1);
        self.tick.set(now);

        #[cfg(feature = "system_load")]
        self.load.observe_tick(self.current_thread(), self.idle.get());

        while let Some(candidate) = self.sleeping.front() {
            if !candidate.wakeup.get().has_elapsed(now) {
                break;
            }
            self.sleeping.remove(candidate);
            if let Some(wait_set) = candidate.wait_set.take() {
                // Timed out of an object wait set: the tick handler is
                // authoritative over this removal, not the object side (§9
                // "open questions"), because at this point we only have the
                // thread, not the object it was blocked on.
                wait_set.remove_node(candidate);
                candidate.unblock_status.set(argus_core::Status::Timeout);
            }
            candidate.state.set(ThreadState::Ready);
            self.ready.insert_sorted(candidate, |t| t.priority().get(), true);
        }
        drop(guard);

        // Timer callbacks run with the lock released (§5); `drain_timers`
        // manages its own lock/unlock cycle per expired timer.
        self.drain_timers();

        let guard = self.lock();
        self.reschedule_needed.set(true);
        drop(guard);
        self.irq_exit();
    }

    /// Enter interrupt context; pairs with [`Kernel::irq_exit`]. Called by
    /// any port-level interrupt handler that invokes kernel API functions
    /// (the tick handler wraps itself; a UART/timer peripheral ISR calling
    /// `semaphore.put()` should wrap its own body the same way).
    pub fn irq_enter(&self) {
        self.irq_depth.set(self.irq_depth.get() + 1);
    }

    /// Leave interrupt context. At the outermost level, drains the
    /// deferred-action queue and honors a pending reschedule request (§5).
    pub fn irq_exit(&'static self) {
        let depth = self.irq_depth.get() - 1;
        self.irq_depth.set(depth);
        if depth == 0 {
            let guard = self.lock();
            self.drain_deferred(guard);
        }
    }
}
