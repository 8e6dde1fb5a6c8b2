//! A hosted [`Port`] implementation: one real OS thread per kernel
//! [`Thread`](argus_kernel::Thread), gated by a [`Mutex`]+[`Condvar`] pair
//! standing in for the saved-context/exception-return machinery a real CPU
//! gives a port for free, plus a background thread driving the periodic
//! tick. Exists so `argus-kernel` can be exercised by `cargo test` without
//! target hardware; see `r3_port_std` for the teacher's equivalent.
//!
//! Every kernel-initiated block/resume (sleep, semaphore/mutex/queue/
//! channel/run-loop waits) happens on the blocking thread's own OS thread,
//! which this port can park and wake precisely. What it cannot do without
//! unsafe OS-level thread suspension is forcibly preempt a thread's
//! in-progress, non-blocking user code at an arbitrary instruction the way
//! a hardware tick interrupt can; see [`StdPort::dispatch`] for how an
//! interrupt-driven reschedule away from such a thread degrades instead of
//! deadlocking. Every end-to-end test in this crate blocks on a kernel
//! primitive frequently enough that this never matters in practice.

mod gate;

use std::cell::{Cell, RefCell};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::Duration;

use argus_core::port::IrqState;
use argus_core::Port;
use argus_kernel::Kernel;

use gate::Gate;

/// The kernel singleton this port drives, set once by [`install`] before
/// [`Kernel::init`] runs. A crate-level static rather than a `StdPort`
/// field: the background tick thread spawned by
/// [`Port::init_tick_timer`] needs a way to call back into the kernel
/// despite `argus_core::Port` having no dependency on `argus_kernel`, the
/// same problem `r3_port_std` solves with its own `static PORT_STATE`.
static KERNEL: OnceLock<&'static Kernel<StdPort>> = OnceLock::new();

/// The single global critical section every `StdPort` critical-section call
/// masks against, standing in for "disable the scheduler-relevant
/// interrupts".
static CRIT: Mutex<()> = Mutex::new(());

thread_local! {
    /// Nesting depth of this OS thread's critical-section entries, so a
    /// nested [`Port::enter_critical`] can be a no-op per the trait's
    /// contract without re-locking [`CRIT`].
    static CRIT_DEPTH: Cell<u32> = Cell::new(0);
    /// The real lock held by the outermost [`Port::enter_critical`] on this
    /// OS thread, released by the matching outermost
    /// [`Port::leave_critical`].
    static CRIT_GUARD: RefCell<Option<MutexGuard<'static, ()>>> = RefCell::new(None);
    /// The gate this OS thread parks on between dispatches, if it is
    /// backing a kernel thread (unset on the boot thread and the
    /// tick-generator thread). Lets [`StdPort::dispatch`] tell a voluntary,
    /// in-thread-context reschedule (the calling thread *is* `outgoing`)
    /// apart from one driven by the tick thread on someone else's behalf.
    static MY_GATE: Cell<*const Gate> = Cell::new(core::ptr::null());
}

/// Register the kernel singleton a later `Port::init_tick_timer` call's
/// background thread should drive. Must be called exactly once, before
/// [`Kernel::init`].
pub fn install(kernel: &'static Kernel<StdPort>) {
    if KERNEL.set(kernel).is_err() {
        panic!("argus_port_std::install called more than once");
    }
}

/// The opaque per-thread state [`StdPort`] attaches to every
/// [`Thread`](argus_kernel::Thread): the OS thread's run gate.
pub struct StdThreadContext {
    gate: Arc<Gate>,
}

/// A hosted `Port`: see the module documentation.
#[derive(Default)]
pub struct StdPort {
    _private: (),
}

impl StdPort {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Port for StdPort {
    type ThreadContext = StdThreadContext;

    fn init_system(&self) {
        log::debug!("argus_port_std: host threads stand in for privileged-stack setup, nothing to do");
    }

    /// Spawn a dedicated background thread that calls
    /// [`Kernel::tick_isr`] once per quantum.
    fn init_tick_timer(&self, ms_per_tick: u32) {
        thread::Builder::new()
            .name("argus-tick".into())
            .spawn(move || loop {
                thread::sleep(Duration::from_millis(u64::from(ms_per_tick)));
                let kernel = KERNEL
                    .get()
                    .expect("argus_port_std::install must be called before Kernel::init");
                kernel.tick_isr();
            })
            .expect("failed to spawn the tick-generator thread");
    }

    /// Spawn the OS thread backing a kernel thread. `stack` is ignored: the
    /// real stack this thread runs on is whatever the host OS gives the
    /// spawned thread, not the caller-provided buffer (a hosted-port
    /// simplification; `stack_guard`'s sentinel scan is a no-op under this
    /// port for the same reason).
    fn prepare_stack(&self, _stack: &mut [u8], entry: fn(usize), arg: usize) -> Self::ThreadContext {
        let gate = Arc::new(Gate::new());
        let spawned_gate = Arc::clone(&gate);
        thread::Builder::new()
            .name(format!("argus-thread-{arg:#x}"))
            .spawn(move || {
                MY_GATE.with(|g| g.set(Arc::as_ptr(&spawned_gate)));
                spawned_gate.wait();
                entry(arg);
                // `entry` is `argus_kernel`'s trampoline, which calls
                // `Kernel::finish_current` and never returns here: its final
                // dispatch-away signals the next thread and then finds this
                // thread *is* `outgoing`, parking it on `spawned_gate`
                // forever. This is reached only if that invariant breaks.
                loop {
                    spawned_gate.wait();
                }
            })
            .expect("failed to spawn kernel thread's backing OS thread");
        StdThreadContext { gate }
    }

    /// Transfer control from `outgoing` to `incoming`.
    ///
    /// When the calling OS thread *is* `outgoing` (every voluntary
    /// reschedule: sleep, semaphore/mutex/queue/channel/run-loop waits, and
    /// the synchronous `request_context_switch` below), this blocks until
    /// `outgoing` is dispatched to again, exactly modeling an exception
    /// return that "resumes" only when the hardware later switches back.
    ///
    /// When it is not (the tick-generator thread rescheduling away from
    /// whatever thread happened to be `Running`), there is no safe way to
    /// suspend that thread's OS thread without unsafe signal-based
    /// preemption (see the module docs), so this signals `incoming` and
    /// returns; `outgoing`'s OS thread keeps running until it next reaches
    /// a blocking kernel call of its own.
    fn dispatch(&self, outgoing: Option<&Self::ThreadContext>, incoming: &Self::ThreadContext) {
        incoming.gate.signal();
        match outgoing {
            Some(out) => {
                let out_ptr: *const Gate = Arc::as_ptr(&out.gate);
                let is_self = MY_GATE.with(|g| g.get() == out_ptr);
                if is_self {
                    out.gate.wait();
                }
            }
            None => park_calling_thread_forever(),
        }
    }

    /// Implemented as an immediate, synchronous call into
    /// [`Kernel::yield_isr`] rather than a deferred "pend an exception":
    /// this is only ever called from thread context (never while
    /// `in_interrupt()`, per [`argus_kernel::Kernel::request_reschedule`]),
    /// so it runs on the calling (outgoing, if preempted) thread's own OS
    /// thread and `dispatch`'s self-check above applies correctly.
    fn request_context_switch(&self) {
        if let Some(kernel) = KERNEL.get() {
            kernel.yield_isr();
        }
    }

    fn irq_state(&self) -> IrqState {
        match KERNEL.get() {
            Some(kernel) if kernel.in_interrupt() => IrqState::InterruptContext,
            _ => IrqState::ThreadContext,
        }
    }

    fn enter_critical(&self) -> bool {
        let depth = CRIT_DEPTH.with(Cell::get);
        if depth > 0 {
            CRIT_DEPTH.with(|d| d.set(depth + 1));
            return true;
        }
        let guard = CRIT.lock().expect("argus_port_std critical-section mutex poisoned");
        CRIT_GUARD.with(|g| *g.borrow_mut() = Some(guard));
        CRIT_DEPTH.with(|d| d.set(1));
        false
    }

    fn leave_critical(&self, was_already_masked: bool) {
        let depth = CRIT_DEPTH.with(Cell::get);
        debug_assert!(depth > 0, "leave_critical without a matching enter_critical");
        CRIT_DEPTH.with(|d| d.set(depth - 1));
        if !was_already_masked {
            debug_assert_eq!(depth, 1, "leave_critical(false) must be the outermost release");
            CRIT_GUARD.with(|g| *g.borrow_mut() = None);
        }
    }

    fn halt(&self) -> ! {
        log::error!("argus_port_std: halt() called on an unrecoverable kernel assertion failure");
        std::process::abort();
    }

    /// No real interrupt to wait for; yield the OS thread's timeslice
    /// briefly so the idle thread doesn't spin the host CPU.
    fn wait_for_interrupt(&self) {
        thread::sleep(Duration::from_millis(1));
    }
}

/// Park the calling OS thread forever: used for `dispatch(None, _)`, the
/// boot context's one-way jump into the first real thread, which on real
/// hardware is an exception return that never comes back.
fn park_calling_thread_forever() -> ! {
    let lock = Mutex::new(());
    let cond = Condvar::new();
    let mut guard = lock.lock().expect("boot-park mutex poisoned");
    loop {
        guard = cond.wait(guard).expect("boot-park mutex poisoned");
    }
}
