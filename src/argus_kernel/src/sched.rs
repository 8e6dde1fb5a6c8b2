//! The scheduler: ready/suspended/sleeping set management, dispatch, and the
//! thread lifecycle operations built on them (§4.1).

use argus_core::{Named, Port, Priority, Result, Status, Ticks, Timeout};

use crate::klock::CpuLockGuard;
use crate::list::{Adapter, IntrusiveList, Link};
use crate::thread::{Thread, ThreadState};
use crate::Kernel;

pub(crate) struct ReadyAdapter<P: Port>(core::marker::PhantomData<P>);
impl<P: Port> Adapter for ReadyAdapter<P> {
    type Node = Thread<P>;
    fn link(node: &Thread<P>) -> &Link<Thread<P>> {
        &node.sched_link
    }
}

pub(crate) struct SuspendedAdapter<P: Port>(core::marker::PhantomData<P>);
impl<P: Port> Adapter for SuspendedAdapter<P> {
    type Node = Thread<P>;
    fn link(node: &Thread<P>) -> &Link<Thread<P>> {
        &node.sched_link
    }
}

pub(crate) struct SleepingAdapter<P: Port>(core::marker::PhantomData<P>);
impl<P: Port> Adapter for SleepingAdapter<P> {
    type Node = Thread<P>;
    fn link(node: &Thread<P>) -> &Link<Thread<P>> {
        &node.sched_link
    }
}

/// A conservative floor on thread stack size (§4.1 "stack-size ≥ sizeof
/// (initial context frame)"). The actual minimum a port needs for its saved
/// context is port-specific; this crate has no way to query it generically,
/// so callers targeting a tight real port should size stacks well above
/// this floor rather than relying on it as a precise bound.
pub const MIN_STACK_SIZE: usize = 64;

impl<P: Port> IntrusiveList<ReadyAdapter<P>> {
    pub(crate) fn insert_ready(&self, thread: &'static Thread<P>) {
        self.insert_sorted(thread, |t| t.priority().get(), true);
    }
}

impl<P: Port> Kernel<P> {
    pub(crate) fn start_first_thread(&'static self) {
        let guard = self.lock();
        self.reschedule_locked(guard);
    }

    /// Pick the highest-priority Ready thread and dispatch to it if it
    /// differs from `current` (§4.1 "Scheduler policy"/"invocation").
    pub(crate) fn reschedule_locked(&'static self, guard: CpuLockGuard<'_, P>) {
        if !self.reschedule_needed.get() {
            drop(guard);
            return;
        }
        self.reschedule_needed.set(false);

        let next = match self.ready.front() {
            Some(t) => t,
            None => self.idle.get().expect("kernel not initialized"),
        };

        let outgoing = self.current.get();
        if let Some(out) = outgoing {
            if out.state() == ThreadState::Running {
                out.state.set(ThreadState::Ready);
                self.ready.insert_ready(out);
            }
        }

        self.ready.remove(next);
        next.state.set(ThreadState::Running);
        self.current.set(Some(next));

        drop(guard);

        if outgoing.map(|o| core::ptr::eq(o, next)).unwrap_or(false) {
            return;
        }
        log::trace!(
            "dispatch: {} -> {}",
            outgoing.map(Named::name).unwrap_or("<boot>"),
            next.name(),
        );
        let outgoing_ctx = outgoing.map(|o| unsafe { o.context() });
        self.port.dispatch(outgoing_ctx, unsafe { next.context() });
    }

    /// Request that the scheduler run at the next safe opportunity (outside
    /// interrupt context, immediately; inside, at the outermost IRQ return).
    pub(crate) fn request_reschedule(&'static self) {
        self.reschedule_needed.set(true);
        if !self.in_interrupt() {
            self.port.request_context_switch();
        }
    }

    /// Finish a [`Thread`] built with [`Thread::new`]: synthesize its
    /// initial stack frame and set its static priority. The thread remains
    /// `Suspended` until [`Kernel::resume`] is called.
    pub fn spawn_thread(
        &'static self,
        thread: &'static Thread<P>,
        stack: &'static mut [u8],
        entry: fn(usize),
        arg: usize,
        priority: u8,
    ) -> Result<()> {
        let priority = Priority::new_user(priority)?;
        self.finish_thread(thread, stack, entry, arg, priority)?;
        log::debug!("spawned thread {} at priority {}", thread.name(), priority.get());
        Ok(())
    }

    /// Finish the kernel's idle thread the same way [`Kernel::spawn_thread`]
    /// finishes a user thread, except at [`Priority::IDLE`] (§4.1
    /// "priority 0 rejected except for the kernel's own idle thread"), which
    /// `spawn_thread` cannot assign since it validates through
    /// [`Priority::new_user`]. The returned thread is still `Suspended`;
    /// [`Kernel::init`] is what makes it `Ready`.
    pub fn spawn_idle_thread(
        &'static self,
        thread: &'static Thread<P>,
        stack: &'static mut [u8],
        entry: fn(usize),
        arg: usize,
    ) -> Result<()> {
        self.finish_thread(thread, stack, entry, arg, Priority::IDLE)?;
        log::debug!("spawned idle thread {}", thread.name());
        Ok(())
    }

    fn finish_thread(
        &'static self,
        thread: &'static Thread<P>,
        stack: &'static mut [u8],
        entry: fn(usize),
        arg: usize,
        priority: Priority,
    ) -> Result<()> {
        if stack.len() < MIN_STACK_SIZE {
            return Err(Status::StackTooSmall);
        }
        thread.priority.set(priority);
        thread.base_priority.set(priority);
        thread.set_entry(entry, arg);
        thread.kernel.set(Some(self));
        #[cfg(feature = "created_registry")]
        self.registry.threads.register(thread);
        let ctx = self.port.prepare_stack(stack, entry_trampoline::<P>, thread as *const _ as usize);
        thread.set_context(ctx);
        Ok(())
    }

    /// Resume a thread: Suspended/Sleeping -> Ready (§4.1 "Suspend/resume").
    pub fn resume(&'static self, thread: &'static Thread<P>) {
        let guard = self.lock();
        match thread.state() {
            ThreadState::Ready | ThreadState::Running => {
                drop(guard);
                return;
            }
            ThreadState::Suspended => {
                self.suspended.remove(thread);
            }
            ThreadState::Sleeping => {
                self.sleeping.remove(thread);
            }
            ThreadState::Blocked | ThreadState::Done => {
                drop(guard);
                return;
            }
        }
        thread.state.set(ThreadState::Ready);
        self.ready.insert_ready(thread);

        let current_prio = self.current_thread().map(|t| t.priority().get()).unwrap_or(0);
        if thread.priority().get() > current_prio {
            self.request_reschedule();
        }
        self.dispatch_if_needed(guard);
    }

    /// Suspend a thread, removing it from whichever set it occupies.
    pub fn suspend(&'static self, thread: &'static Thread<P>) {
        let guard = self.lock();
        match thread.state() {
            ThreadState::Ready | ThreadState::Running => self.ready.remove(thread),
            ThreadState::Sleeping => self.sleeping.remove(thread),
            ThreadState::Suspended => {
                drop(guard);
                return;
            }
            ThreadState::Blocked | ThreadState::Done => {
                drop(guard);
                return;
            }
        }
        let was_self = self.current_thread().map(|t| core::ptr::eq(t, thread)).unwrap_or(false);
        thread.state.set(ThreadState::Suspended);
        self.suspended.push_back(thread);
        if was_self {
            self.request_reschedule();
        }
        self.dispatch_if_needed(guard);
    }

    /// Change a thread's static priority, re-sorting whichever ordered set
    /// it currently belongs to (§4.1 "Set-priority").
    pub fn set_priority(&'static self, thread: &'static Thread<P>, priority: u8) -> Result<()> {
        let priority = Priority::new_user(priority)?;
        let guard = self.lock();
        if thread.base_priority.get() == priority {
            drop(guard);
            return Ok(());
        }
        thread.base_priority.set(priority);
        // Only bump the effective priority if the thread is not currently
        // boosted above its new base by mutex inheritance.
        if thread.priority.get().get() < priority.get() || !thread.wait_link.is_linked() {
            thread.priority.set(priority);
        }
        match thread.state() {
            ThreadState::Ready | ThreadState::Running => {
                self.ready.remove(thread);
                self.ready.insert_ready(thread);
            }
            _ => {}
        }
        self.request_reschedule();
        self.dispatch_if_needed(guard);
        Ok(())
    }

    /// Sleep the calling thread for `timeout` (§4.1 "Sleep").
    pub fn sleep(&'static self, timeout: Timeout) {
        match timeout {
            Timeout::NoWait => {}
            Timeout::Infinite => {
                let guard = self.lock();
                let me = self.current_thread().expect("sleep from non-thread context");
                self.suspend_locked(guard, me);
            }
            Timeout::Millis(ms) => {
                let guard = self.lock();
                let ticks = argus_core::ms_to_ticks(ms, self.ms_per_tick.get());
                let wakeup = self.tick.get().wrapping_add(ticks);
                self.sleep_until_tick(guard, wakeup);
            }
        }
    }

    /// Sleep the calling thread until an absolute deadline, `abs_ms`
    /// milliseconds converted to ticks; a deadline already passed is a no-op
    /// (§4.1 "sleep-until").
    pub fn sleep_until(&'static self, abs_ms: u32) {
        let guard = self.lock();
        let wakeup = Ticks(argus_core::ms_to_ticks(abs_ms, self.ms_per_tick.get()));
        self.sleep_until_tick(guard, wakeup);
    }

    /// Sleep until an absolute tick deadline; a deadline already passed is a
    /// no-op (§4.1).
    pub(crate) fn sleep_until_tick(&'static self, guard: CpuLockGuard<'_, P>, wakeup: Ticks) {
        if wakeup.has_elapsed(self.tick.get()) {
            drop(guard);
            return;
        }
        let me = self.current_thread().expect("sleep from non-thread context");
        self.ready.remove(me);
        me.wakeup.set(wakeup);
        me.state.set(ThreadState::Sleeping);
        self.sleeping.insert_sorted(me, |t| t.wakeup.get(), false);
        self.request_reschedule();
        self.dispatch_if_needed(guard);
    }

    fn suspend_locked(&'static self, guard: CpuLockGuard<'_, P>, thread: &'static Thread<P>) {
        self.ready.remove(thread);
        thread.state.set(ThreadState::Suspended);
        self.suspended.push_back(thread);
        self.request_reschedule();
        self.dispatch_if_needed(guard);
    }

    /// Run the scheduler now if we are in thread context, otherwise just
    /// leave `reschedule_needed` set for the outermost IRQ return.
    pub(crate) fn dispatch_if_needed(&'static self, guard: CpuLockGuard<'_, P>) {
        if self.in_interrupt() {
            drop(guard);
            return;
        }
        self.reschedule_locked(guard);
    }

    /// Mark the calling thread `Done`; invoked by the entry trampoline after
    /// the user entry function returns (§4.1 "Initial stack").
    pub(crate) fn finish_current(&'static self) -> ! {
        let guard = self.lock();
        let me = self.current_thread().expect("finish_current outside a thread");
        log::debug!("thread {} finished", me.name());
        self.ready.remove(me);
        me.state.set(ThreadState::Done);
        self.request_reschedule();
        self.reschedule_locked(guard);
        unreachable!("scheduler dispatched away from a Done thread and never returned")
    }

    /// Delete `thread`, detaching it from whatever set it currently occupies.
    /// A thread may not delete itself while `Running`: it must suspend or
    /// finish (returning from its entry function) first (§4.1 "delete").
    pub fn thread_delete(&'static self, thread: &'static Thread<P>) -> Result<()> {
        let guard = self.lock();
        if thread.state() == ThreadState::Running {
            drop(guard);
            return Err(Status::InvalidState);
        }
        match thread.state() {
            ThreadState::Ready => self.ready.remove(thread),
            ThreadState::Suspended => self.suspended.remove(thread),
            ThreadState::Sleeping => self.sleeping.remove(thread),
            ThreadState::Blocked => {
                if let Some(wait_set) = thread.wait_set.get() {
                    wait_set.remove_node(thread);
                    thread.wait_set.set(None);
                }
                if thread.sched_link.is_linked() {
                    self.sleeping.remove(thread);
                }
            }
            ThreadState::Running | ThreadState::Done => {}
        }
        thread.state.set(ThreadState::Done);
        self.request_reschedule();
        self.dispatch_if_needed(guard);
        Ok(())
    }

    pub fn get_state(&self, thread: &Thread<P>) -> ThreadState {
        thread.state()
    }

    pub fn get_priority(&self, thread: &Thread<P>) -> u8 {
        thread.priority().get()
    }
}

/// Installed as every thread's saved-context entry point by
/// [`Kernel::spawn_thread`]; runs the user entry function and then marks the
/// thread Done (§4.1 "Initial stack").
fn entry_trampoline<P: Port>(thread_ptr: usize) {
    let thread = unsafe { &*(thread_ptr as *const Thread<P>) };
    thread.run_entry();
    let kernel = thread.kernel.get().expect("thread run without spawn_thread");
    kernel.finish_current();
}
