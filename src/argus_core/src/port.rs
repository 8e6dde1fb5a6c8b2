//! The boundary between the portable kernel and the CPU/board it runs on.
//!
//! Everything in this module is a collaborator, never implemented by this
//! crate: stack preparation, the context-switch exception, the tick
//! interrupt, and the interrupt-mask gate are all chip- and toolchain-
//! specific and are supplied by a `Port` implementation (see `argus_port_std`
//! for a hosted one used in tests).
//!
//! Two entry points run in the other direction, from the port *into* the
//! kernel, and are exposed by `argus_kernel` rather than by this trait:
//! a context-switch-exception handler calls `argus_kernel::yield_isr`, and
//! the tick interrupt handler calls `argus_kernel::tick_isr`.

/// Whether the CPU is currently executing an interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqState {
    ThreadContext,
    InterruptContext,
}

impl IrqState {
    #[inline]
    pub fn is_interrupt(self) -> bool {
        matches!(self, IrqState::InterruptContext)
    }
}

/// The interface a CPU/board port must provide.
///
/// A `Port` implementation is installed once, before [`argus_kernel::init`]
/// is called, via [`argus_kernel::set_port`].
///
/// Atomic add/compare-and-swap, listed as a port responsibility in systems
/// with no portable atomics, are not part of this trait: every target this
/// kernel runs on has native `core::sync::atomic` support, so the kernel uses
/// that directly instead of routing through the port.
pub trait Port: Send + Sync + 'static {
    /// Opaque per-thread state the port attaches to every thread. On real
    /// hardware this holds the saved stack pointer; [`argus_port_std`]'s
    /// implementation holds an OS thread handle and a run-gate condvar.
    type ThreadContext: Send + Sync;

    /// One-time setup: configure the context-switch exception's priority and
    /// the privileged stack pointer used while no thread is running.
    fn init_system(&self);

    /// Start the periodic tick interrupt at the given quantum.
    fn init_tick_timer(&self, ms_per_tick: u32);

    /// Synthesize a thread's initial saved context on `stack` such that the
    /// first dispatch to this thread enters `entry(arg)`.
    ///
    /// `entry` must never return to its caller in the usual sense: the
    /// kernel's entry wrapper calls it and, on return, marks the thread Done
    /// and reschedules instead of unwinding the synthesized frame.
    fn prepare_stack(&self, stack: &mut [u8], entry: fn(usize), arg: usize) -> Self::ThreadContext;

    /// Perform the actual transfer of control from `outgoing` (`None` if the
    /// kernel had no Running thread yet, e.g. at boot) to `incoming`. Returns
    /// once `outgoing` is resumed again, from the dispatcher's point of view
    /// (on real hardware this never "returns" in the C sense; it is an
    /// exception return into a different context).
    fn dispatch(&self, outgoing: Option<&Self::ThreadContext>, incoming: &Self::ThreadContext);

    /// Raise the context-switch exception ("service call") so that
    /// `argus_kernel::yield_isr` runs at the next opportunity.
    fn request_context_switch(&self);

    /// Whether the CPU is currently executing an interrupt handler.
    fn irq_state(&self) -> IrqState;

    /// Enter the kernel's critical section by masking the scheduler-relevant
    /// interrupt(s). Returns whether interrupts were already masked (so the
    /// kernel can support nested acquisition as a no-op).
    fn enter_critical(&self) -> bool;

    /// Leave the critical section, restoring the mask state observed by the
    /// matching [`Port::enter_critical`] call.
    fn leave_critical(&self, was_already_masked: bool);

    /// Halt on an unrecoverable kernel assertion failure (e.g. a stack
    /// sentinel corruption detected at context switch). Never returns.
    fn halt(&self) -> !;

    /// Put the CPU to sleep until the next interrupt. Called by the idle
    /// thread when the `idle_sleep` feature is enabled.
    fn wait_for_interrupt(&self) {}
}
