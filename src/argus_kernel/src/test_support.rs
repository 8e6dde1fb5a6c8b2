//! A `Port` that does nothing: stack prep and dispatch are no-ops, so
//! `Kernel::init`/`resume`/`suspend` all run synchronously and return to the
//! caller instead of transferring control to another stack.
//!
//! This only models the non-blocking paths of the scheduler faithfully (a
//! real dispatch that parks the caller never happens here), so tests built on
//! it stick to property checks that do not require an actual second thread of
//! execution to make progress: ring-buffer/ownership bookkeeping, idempotence
//! laws, and boundary behavior that short-circuits before a block would
//! occur. The end-to-end scenarios that need a thread to actually run
//! concurrently live in `argus_port_std`'s integration tests instead.
#![cfg(test)]

use argus_core::port::IrqState;
use argus_core::Port;

pub struct FakePort;

impl Port for FakePort {
    type ThreadContext = ();

    fn init_system(&self) {}
    fn init_tick_timer(&self, _ms_per_tick: u32) {}

    fn prepare_stack(&self, _stack: &mut [u8], _entry: fn(usize), _arg: usize) -> Self::ThreadContext {}

    fn dispatch(&self, _outgoing: Option<&Self::ThreadContext>, _incoming: &Self::ThreadContext) {}

    fn request_context_switch(&self) {}

    fn irq_state(&self) -> IrqState {
        IrqState::ThreadContext
    }

    fn enter_critical(&self) -> bool {
        false
    }

    fn leave_critical(&self, _was_already_masked: bool) {}

    fn halt(&self) -> ! {
        panic!("FakePort::halt")
    }
}
