//! Thread control block and the states a thread moves through.

use core::cell::{Cell, UnsafeCell};

use argus_core::{Named, Port, Priority, Status, Ticks};

use crate::list::{Link, WaitSetHandle};
use crate::runloop::RunLoop;
use crate::Kernel;

/// A thread's lifecycle state (§3, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but never resumed, or explicitly suspended.
    Suspended,
    /// Eligible to run, sitting in the ready set.
    Ready,
    /// The single thread currently executing.
    Running,
    /// Blocked on a semaphore/mutex/queue/channel wait set.
    Blocked,
    /// Sleeping until a wakeup tick.
    Sleeping,
    /// The entry function has returned.
    Done,
}

/// A kernel thread. Caller-owned: the application places a `Thread` in
/// `'static` storage (a `static` or leaked allocation) and calls
/// [`Kernel::spawn_thread`](crate::Kernel::spawn_thread) to hand it initial
/// stack space before resuming it.
pub struct Thread<P: Port> {
    pub(crate) name: &'static str,
    pub(crate) priority: Cell<Priority>,
    /// The priority this thread runs at absent any mutex-inheritance boost.
    pub(crate) base_priority: Cell<Priority>,
    pub(crate) state: Cell<ThreadState>,
    pub(crate) wakeup: Cell<Ticks>,
    pub(crate) unblock_status: Cell<Status>,
    /// Rendezvous/queue scratch value: the address of the caller's
    /// source/destination buffer while blocked in `send`/`receive`.
    pub(crate) scratch: Cell<usize>,
    pub(crate) run_loop: Cell<Option<&'static RunLoop<P>>>,
    pub(crate) context: UnsafeCell<Option<P::ThreadContext>>,
    /// The kernel this thread was spawned against, recovered by the entry
    /// trampoline to report completion back to [`Kernel::finish_current`].
    pub(crate) kernel: Cell<Option<&'static Kernel<P>>>,
    entry: Cell<Option<fn(usize)>>,
    arg: Cell<usize>,
    /// Membership in exactly one of {ready, suspended, sleeping}.
    pub(crate) sched_link: Link<Thread<P>>,
    /// Membership in at most one object's wait set, simultaneously with
    /// `sched_link` being on the sleeping set if a finite timeout applies.
    pub(crate) wait_link: Link<Thread<P>>,
    /// The wait set `wait_link` is presently threaded into, if any. Lets the
    /// tick handler's sleep-list walk and object `delete` calls unlink a
    /// thread from an object wait set they did not block it on themselves
    /// (§9: "the tick handler makes the [wakeup] authoritative").
    pub(crate) wait_set: Cell<Option<&'static dyn WaitSetHandle<Thread<P>>>>,
}

impl<P: Port> Thread<P> {
    /// Build a thread control block in the `Suspended` state with no stack
    /// prepared yet. Must be finished with
    /// [`Kernel::spawn_thread`](crate::Kernel::spawn_thread) before use.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            priority: Cell::new(Priority::IDLE),
            base_priority: Cell::new(Priority::IDLE),
            state: Cell::new(ThreadState::Suspended),
            wakeup: Cell::new(Ticks::ZERO),
            unblock_status: Cell::new(Status::Success),
            scratch: Cell::new(0),
            run_loop: Cell::new(None),
            context: UnsafeCell::new(None),
            kernel: Cell::new(None),
            entry: Cell::new(None),
            arg: Cell::new(0),
            sched_link: Link::new(),
            wait_link: Link::new(),
            wait_set: Cell::new(None),
        }
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority.get()
    }

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state.get()
    }

    #[inline]
    pub fn current_run_loop(&self) -> Option<&'static RunLoop<P>> {
        self.run_loop.get()
    }

    /// Safety: the thread's context is written once by
    /// [`Kernel::spawn_thread`](crate::Kernel::spawn_thread) before the
    /// thread is ever linked into the ready set, and never replaced after,
    /// so concurrent shared access during dispatch is sound.
    pub(crate) unsafe fn context(&self) -> &P::ThreadContext {
        (*self.context.get())
            .as_ref()
            .expect("thread context read before spawn_thread")
    }

    pub(crate) fn set_context(&self, ctx: P::ThreadContext) {
        unsafe {
            *self.context.get() = Some(ctx);
        }
    }

    pub(crate) fn set_entry(&self, entry: fn(usize), arg: usize) {
        self.entry.set(Some(entry));
        self.arg.set(arg);
    }

    /// Invoked by the port-specific trampoline once it has transferred
    /// control into this thread for the first time.
    pub fn run_entry(&self) {
        let entry = self.entry.get().expect("thread spawned without an entry");
        let arg = self.arg.get();
        entry(arg);
    }
}

impl<P: Port> Named for Thread<P> {
    fn name(&self) -> &str {
        self.name
    }
}

// Safety: every field is only ever touched while the kernel lock is held
// (see `klock`), which serializes access across threads and interrupt
// context alike, so the lack of any individual field being `Sync` on its
// own is sound at the granularity this type is actually used at.
unsafe impl<P: Port> Sync for Thread<P> {}
